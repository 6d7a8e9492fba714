//! Integration tests for the cross-process scoreboard

use tally::{Scoreboard, ScoreboardConfig};
use tempfile::TempDir;

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &TempDir) -> ScoreboardConfig {
        ScoreboardConfig::new(dir.path().join("scoreboard"))
            .with_slot_size(160)
            .with_slot_count(8)
    }

    #[test]
    fn test_slot_binding_is_permanent() {
        let dir = TempDir::new().unwrap();
        let board = Scoreboard::attach(&config(&dir)).unwrap();

        let index = board.create_slot("worker-A").unwrap();
        for _ in 0..10 {
            assert_eq!(board.create_slot("worker-A").unwrap(), index);
        }
        board.create_slot("worker-B").unwrap();
        board.create_slot("worker-C").unwrap();
        assert_eq!(board.create_slot("worker-A").unwrap(), index);
        assert_eq!(board.write_slot("worker-A", b"state").unwrap(), index);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let board = Scoreboard::attach(&config(&dir)).unwrap();

        let payload = b"worker-A: healthy, 12 connections";
        let index = board.write_slot("worker-A", payload).unwrap();

        let slot = board.slot(index.get()).unwrap();
        assert_eq!(slot.name(), "worker-A");
        assert_eq!(slot.version(), 1);
        assert_eq!(slot.payload(), payload);

        // A shorter rewrite must not leave trailing bytes of the old payload.
        board.write_slot("worker-A", b"ok").unwrap();
        let slot = board.slot(index.get()).unwrap();
        assert_eq!(slot.version(), 2);
        assert_eq!(slot.payload(), b"ok");
    }

    #[test]
    fn test_generation_counter_tracks_writes() {
        let dir = TempDir::new().unwrap();
        let board = Scoreboard::attach(&config(&dir)).unwrap();
        assert_eq!(board.generation(), 0);

        board.write_slot("a", b"1").unwrap();
        board.write_slot("b", b"2").unwrap();
        board.write_slot("a", b"3").unwrap();
        assert_eq!(board.generation(), 3);
    }

    #[test]
    fn test_independent_mappings_observe_writes() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);

        // Two attachments of the same backing file stand in for two
        // processes: each has its own mapping of the shared bytes.
        let writer = Scoreboard::attach(&config).unwrap();
        let reader = Scoreboard::attach(&config).unwrap();

        let before = reader.generation();
        let index = writer.write_slot("worker-A", b"published").unwrap();

        assert_eq!(reader.generation(), before + 1);
        let slot = reader.slot(index.get()).unwrap();
        assert_eq!(slot.name(), "worker-A");
        assert_eq!(slot.version(), 1);
        assert_eq!(slot.payload(), b"published");

        // Bindings created by one side resolve identically on the other.
        assert_eq!(reader.create_slot("worker-A").unwrap(), index);
    }

    #[test]
    fn test_state_survives_reattach() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let index = {
            let board = Scoreboard::attach(&config).unwrap();
            board.write_slot("worker-A", b"before restart").unwrap()
        };

        // Dropping the board unmaps but keeps the backing file.
        let board = Scoreboard::attach(&config).unwrap();
        assert_eq!(board.find_slot("worker-A"), Some(index));
        let slot = board.slot(index.get()).unwrap();
        assert_eq!(slot.payload(), b"before restart");
        assert_eq!(board.generation(), 1);
    }

    #[test]
    fn test_existing_geometry_is_adopted() {
        let dir = TempDir::new().unwrap();
        {
            Scoreboard::attach(&config(&dir)).unwrap();
        }
        // Attach with a different configured geometry: the header wins.
        let other = ScoreboardConfig::new(dir.path().join("scoreboard"))
            .with_slot_size(160)
            .with_slot_count(4);
        let board = Scoreboard::attach(&other).unwrap();
        assert_eq!(board.slot_max_count(), 8);
    }

    #[test]
    fn test_reset_clears_all_state() {
        let dir = TempDir::new().unwrap();
        let board = Scoreboard::attach(&config(&dir)).unwrap();

        let a = board.write_slot("worker-A", b"payload-a").unwrap();
        board.write_slot("worker-B", b"payload-b").unwrap();
        assert_eq!(board.last_slot(), 3);

        board.reset();
        assert_eq!(board.last_slot(), 1);
        assert_eq!(board.generation(), 0);
        assert_eq!(board.find_slot("worker-A"), None);

        let slot = board.slot(a.get()).unwrap();
        assert!(!slot.is_bound());
        assert_eq!(slot.version(), 0);
        assert!(slot.payload().is_empty());

        // The geometry survives and the board is immediately usable.
        assert_eq!(board.write_slot("worker-A", b"again").unwrap().get(), 1);
    }

    #[test]
    fn test_corrupt_header_rejected_until_reset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scoreboard");
        {
            Scoreboard::attach(&config(&dir)).unwrap();
        }

        // Scribble a nonsensical slot count into the header on disk.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[4..8].copy_from_slice(&u32::MAX.to_ne_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let err = Scoreboard::attach(&config(&dir)).unwrap_err();
        assert!(matches!(err, tally::TallyError::Corrupted { .. }));
    }

    #[test]
    fn test_dump_appends_raw_region() {
        let dir = TempDir::new().unwrap();
        let board = Scoreboard::attach(&config(&dir)).unwrap();
        let payload = b"dump me";
        board.write_slot("worker-A", payload).unwrap();

        let dump_path = dir.path().join("dump.bin");
        board.dump(Some(&dump_path)).unwrap();

        let dumped = std::fs::read(&dump_path).unwrap();
        assert_eq!(dumped.len(), board.slot_size() * board.slot_max_count() as usize);

        // The written payload round-trips through the dump byte-for-byte.
        let slot = board.slot(1).unwrap();
        let slot_offset = board.slot_size();
        let name_bytes = &dumped[slot_offset..slot_offset + "worker-A".len()];
        assert_eq!(name_bytes, b"worker-A");
        let data_offset = slot_offset + tally::scoreboard::layout::SLOT_DATA_OFFSET;
        assert_eq!(&dumped[data_offset..data_offset + payload.len()], payload);
        assert_eq!(slot.payload(), payload);

        // Dumping again appends a second snapshot.
        board.dump(Some(&dump_path)).unwrap();
        assert_eq!(std::fs::read(&dump_path).unwrap().len(), dumped.len() * 2);
    }

    #[test]
    fn test_slot_exhaustion() {
        let dir = TempDir::new().unwrap();
        let board = Scoreboard::attach(&config(&dir)).unwrap();
        for i in 1..8 {
            board.write_slot(&format!("w{}", i), b"x").unwrap();
        }
        let err = board.write_slot("overflow", b"x").unwrap_err();
        assert!(matches!(err, tally::TallyError::InsufficientSpace { .. }));
    }
}
