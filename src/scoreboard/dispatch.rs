//! Remote dispatch: the management-channel seam
//!
//! An out-of-process controller manages the scoreboard without direct memory
//! access by sending single-opcode messages: one opcode byte followed by
//! opcode-specific fields. Strings are `u16` big-endian length plus UTF-8
//! bytes; payloads are `u32` big-endian length plus raw bytes; an optional
//! string is a present/absent marker byte followed by the string when present.

use std::path::PathBuf;

use log::debug;

use super::{board::Scoreboard, config::ScoreboardConfig};
use crate::error::{Result, TallyError};

/// Opcode bytes of the management wire format
pub mod opcode {
    pub const SET_ATTRIBUTE: u8 = 0x01;
    pub const ATTACH: u8 = 0x02;
    pub const DETACH: u8 = 0x03;
    pub const WRITE_SLOT: u8 = 0x04;
    pub const RESET: u8 = 0x05;
    pub const DUMP: u8 = 0x06;
}

/// A decoded management command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set a pre-attach configuration attribute by name
    SetAttribute { name: String, value: String },
    /// Create or attach the scoreboard region from the current attributes
    Attach,
    /// Drop the current attachment; the backing file persists
    Detach,
    /// Publish a payload into the named slot
    WriteSlot { name: String, payload: Vec<u8> },
    /// Zero the region and reinitialize the header
    Reset,
    /// Log a slot summary, optionally appending raw region bytes to a file
    Dump { file: Option<String> },
}

impl Command {
    /// Decode a command from its wire form. Truncated fields, unknown opcodes
    /// and trailing bytes are all protocol errors.
    pub fn decode(buf: &[u8]) -> Result<Command> {
        let mut reader = Reader { buf, pos: 0 };
        let op = reader.read_u8()?;
        let command = match op {
            opcode::SET_ATTRIBUTE => Command::SetAttribute {
                name: reader.read_string()?,
                value: reader.read_string()?,
            },
            opcode::ATTACH => Command::Attach,
            opcode::DETACH => Command::Detach,
            opcode::WRITE_SLOT => Command::WriteSlot {
                name: reader.read_string()?,
                payload: reader.read_payload()?,
            },
            opcode::RESET => Command::Reset,
            opcode::DUMP => Command::Dump {
                file: reader.read_optional_string()?,
            },
            other => {
                return Err(TallyError::protocol(format!(
                    "unknown opcode {:#04x}",
                    other
                )))
            }
        };
        reader.finish()?;
        Ok(command)
    }

    /// Encode this command into its wire form
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Command::SetAttribute { name, value } => {
                out.push(opcode::SET_ATTRIBUTE);
                write_string(&mut out, name);
                write_string(&mut out, value);
            }
            Command::Attach => out.push(opcode::ATTACH),
            Command::Detach => out.push(opcode::DETACH),
            Command::WriteSlot { name, payload } => {
                out.push(opcode::WRITE_SLOT);
                write_string(&mut out, name);
                out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
                out.extend_from_slice(payload);
            }
            Command::Reset => out.push(opcode::RESET),
            Command::Dump { file } => {
                out.push(opcode::DUMP);
                match file {
                    None => out.push(0),
                    Some(name) => {
                        out.push(1);
                        write_string(&mut out, name);
                    }
                }
            }
        }
        out
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(TallyError::protocol("message truncated"));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| TallyError::protocol("string field is not valid UTF-8"))
    }

    fn read_optional_string(&mut self) -> Result<Option<String>> {
        match self.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.read_string()?)),
            other => Err(TallyError::protocol(format!(
                "invalid optional-string marker {:#04x}",
                other
            ))),
        }
    }

    fn read_payload(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.buf.len() {
            return Err(TallyError::protocol(format!(
                "{} trailing bytes after message",
                self.buf.len() - self.pos
            )));
        }
        Ok(())
    }
}

/// Attribute names accepted by [`ScoreboardService::set_attribute`]
pub mod attribute {
    pub const FILE: &str = "file";
    pub const SLOTS: &str = "size.slots";
    pub const SLOT_SIZE: &str = "size.slotSize";
}

/// Scoreboard managed through the remote-dispatch seam
///
/// Holds the mutable attribute set and an optional attached board. Slot
/// operations against a detached service fail fast; the controller decides
/// whether and when to retry.
#[derive(Debug)]
pub struct ScoreboardService {
    config: ScoreboardConfig,
    board: Option<Scoreboard>,
}

impl ScoreboardService {
    /// Create a detached service with the given starting configuration
    pub fn new(config: ScoreboardConfig) -> Self {
        Self {
            config,
            board: None,
        }
    }

    /// Current configuration (as amended by set-attribute commands)
    pub fn config(&self) -> &ScoreboardConfig {
        &self.config
    }

    /// True once `Attach` has succeeded
    pub fn is_attached(&self) -> bool {
        self.board.is_some()
    }

    /// The attached board, if any
    pub fn board(&self) -> Option<&Scoreboard> {
        self.board.as_ref()
    }

    /// Update one configuration attribute. Only valid before attach takes
    /// effect; the running board keeps the geometry it attached with.
    pub fn set_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            attribute::FILE => {
                self.config.path = PathBuf::from(value);
            }
            attribute::SLOTS => {
                self.config.slot_max_count = value.parse().map_err(|_| {
                    TallyError::invalid_parameter(name, "expected an unsigned slot count")
                })?;
            }
            attribute::SLOT_SIZE => {
                self.config.slot_size = value.parse().map_err(|_| {
                    TallyError::invalid_parameter(name, "expected an unsigned slot size")
                })?;
            }
            other => {
                return Err(TallyError::invalid_parameter(
                    other,
                    "unknown scoreboard attribute",
                ));
            }
        }
        debug!("scoreboard attribute {} = {}", name, value);
        Ok(())
    }

    /// Attach using the current attributes. A no-op when already attached.
    pub fn attach(&mut self) -> Result<()> {
        if self.board.is_none() {
            self.board = Some(Scoreboard::attach(&self.config)?);
        }
        Ok(())
    }

    /// Drop the attachment; the backing file and its contents persist
    pub fn detach(&mut self) {
        self.board = None;
    }

    fn attached(&self) -> Result<&Scoreboard> {
        self.board.as_ref().ok_or(TallyError::Detached)
    }

    /// Route a decoded command to the matching operation
    pub fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::SetAttribute { name, value } => self.set_attribute(&name, &value),
            Command::Attach => self.attach(),
            Command::Detach => {
                self.detach();
                Ok(())
            }
            Command::WriteSlot { name, payload } => {
                self.attached()?.write_slot(&name, &payload)?;
                Ok(())
            }
            Command::Reset => {
                self.attached()?.reset();
                Ok(())
            }
            Command::Dump { file } => self
                .attached()?
                .dump(file.as_deref().map(std::path::Path::new)),
        }
    }

    /// Decode a wire message and dispatch it
    pub fn dispatch_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.dispatch(Command::decode(buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_all_commands() {
        let commands = vec![
            Command::SetAttribute {
                name: "file".into(),
                value: "/tmp/sb".into(),
            },
            Command::Attach,
            Command::Detach,
            Command::WriteSlot {
                name: "worker-A".into(),
                payload: vec![1, 2, 3, 4, 5],
            },
            Command::Reset,
            Command::Dump { file: None },
            Command::Dump {
                file: Some("dump.bin".into()),
            },
        ];
        for command in commands {
            let wire = command.encode();
            assert_eq!(Command::decode(&wire).unwrap(), command);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Command::decode(&[]).is_err());
        assert!(Command::decode(&[0xFF]).is_err());
        // Truncated string length prefix.
        assert!(Command::decode(&[opcode::SET_ATTRIBUTE, 0x00]).is_err());
        // Trailing bytes after a complete message.
        assert!(Command::decode(&[opcode::RESET, 0x00]).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_marker() {
        assert!(Command::decode(&[opcode::DUMP, 2]).is_err());
    }
}
