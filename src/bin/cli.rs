use clap::{App, Arg, SubCommand};
use tally::{Result, Scoreboard, ScoreboardConfig, TallyError};
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("tallyctl")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Scoreboard management tool")
        .arg(
            Arg::with_name("file")
                .short("f")
                .long("file")
                .value_name("FILE")
                .help("Path of the scoreboard backing file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("slots")
                .long("slots")
                .value_name("COUNT")
                .help("Maximum slot count (used when creating the region)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("slot_size")
                .long("slot-size")
                .value_name("BYTES")
                .help("Per-slot size in bytes (used when creating the region)")
                .takes_value(true),
        )
        .subcommand(SubCommand::with_name("info").about("Print scoreboard header and slot summary"))
        .subcommand(
            SubCommand::with_name("write")
                .about("Publish a payload into a named slot")
                .arg(
                    Arg::with_name("name")
                        .short("n")
                        .long("name")
                        .value_name("NAME")
                        .help("Slot name")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("data")
                        .short("d")
                        .long("data")
                        .value_name("DATA")
                        .help("Payload string")
                        .required(true)
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("reset")
                .about("Zero the region and reinitialize the header (destructive)"),
        )
        .subcommand(
            SubCommand::with_name("dump")
                .about("Log a slot summary, optionally appending raw region bytes to a file")
                .arg(
                    Arg::with_name("out")
                        .short("o")
                        .long("out")
                        .value_name("FILE")
                        .help("File to append the raw region bytes to")
                        .takes_value(true),
                ),
        )
        .get_matches();

    let mut config = ScoreboardConfig::new(matches.value_of("file").unwrap());
    if let Some(slots) = matches.value_of("slots") {
        config.slot_max_count = slots
            .parse()
            .map_err(|_| TallyError::invalid_parameter("slots", "expected an unsigned count"))?;
    }
    if let Some(slot_size) = matches.value_of("slot_size") {
        config.slot_size = slot_size
            .parse()
            .map_err(|_| TallyError::invalid_parameter("slot-size", "expected a byte count"))?;
    }

    let board = Scoreboard::attach(&config)?;

    match matches.subcommand() {
        ("info", _) => print_info(&board),
        ("write", Some(sub)) => {
            let name = sub.value_of("name").unwrap();
            let data = sub.value_of("data").unwrap();
            let index = board.write_slot(name, data.as_bytes())?;
            println!("wrote {} bytes to slot {} ({})", data.len(), index, name);
        }
        ("reset", _) => {
            board.reset();
            println!("scoreboard {} reset", board.path().display());
        }
        ("dump", Some(sub)) => {
            board.dump(sub.value_of("out").map(Path::new))?;
            print_info(&board);
        }
        _ => print_info(&board),
    }

    Ok(())
}

fn print_info(board: &Scoreboard) {
    println!("scoreboard:  {}", board.path().display());
    println!("slot size:   {} bytes", board.slot_size());
    println!("slot count:  {}", board.slot_max_count());
    println!("cursor:      {}", board.last_slot());
    println!("generation:  {}", board.generation());
    for raw in 1..board.last_slot() {
        if let Some(slot) = board.slot(raw) {
            if slot.is_bound() {
                println!(
                    "  slot {:>3}  {}  v{}  {} bytes",
                    raw,
                    slot.name(),
                    slot.version(),
                    slot.payload().len()
                );
            }
        }
    }
}
