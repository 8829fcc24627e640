//! ColonySim host binary
//!
//! Reads save files for inspection and runs the headless scenario harness.
//! Everything runs in-process with no rendering.
//!
//! Usage:
//!   colonysim --inspect colony.sav --mover 0
//!   colonysim --inspect colony.sav.gz --stuck --reserved
//!   colonysim --write-demo colony.sav --ticks 600
//!   colonysim --scenarios --verbose

mod inspect;
mod scenarios;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use colonysim_core::common::CellPos;
use colonysim_core::engine::Sim;
use colonysim_core::persistence::SaveError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SAVE: &str = "colony.sav";

#[derive(Parser, Debug)]
#[command(author, version, about = "Colony simulation save inspector and scenario harness", long_about = None)]
struct Args {
    /// Read a save file (plain or .gz) and report on it
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = DEFAULT_SAVE)]
    inspect: Option<PathBuf>,

    /// Mover by slot index
    #[arg(long, value_name = "N")]
    mover: Option<u32>,

    /// Item by slot index
    #[arg(long, value_name = "N")]
    item: Option<u32>,

    /// Job by slot index
    #[arg(long, value_name = "N")]
    job: Option<u32>,

    /// Stockpile by slot index
    #[arg(long, value_name = "N")]
    stockpile: Option<u32>,

    /// Everything at one cell
    #[arg(long, value_name = "X,Y,Z", value_parser = parse_cell)]
    cell: Option<CellPos>,

    /// Movers that are not making progress
    #[arg(long)]
    stuck: bool,

    /// Reserved items and their holders
    #[arg(long)]
    reserved: bool,

    /// Every active job
    #[arg(long)]
    jobs_active: bool,

    /// Run the end-to-end scenarios and exit 1 if any fails
    #[arg(long)]
    scenarios: bool,

    /// Build a demo colony, run it, and save it to PATH
    #[arg(long, value_name = "PATH")]
    write_demo: Option<PathBuf>,

    /// Ticks to run before writing the demo save
    #[arg(long, default_value_t = 600)]
    ticks: u64,

    /// Seed for the demo colony
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Show passing checks too
    #[arg(short, long)]
    verbose: bool,
}

fn parse_cell(s: &str) -> Result<CellPos, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected X,Y,Z, got '{}'", s));
    }
    let mut v = [0i32; 3];
    for (slot, part) in v.iter_mut().zip(&parts) {
        *slot = part.parse().map_err(|e| format!("bad coordinate '{}': {}", part, e))?;
    }
    Ok(CellPos::new(v[0], v[1], v[2]))
}

fn is_gz(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

fn read_save(path: &Path) -> Result<Sim, SaveError> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if is_gz(path) {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Sim::load(reader)
}

fn write_save(path: &Path, sim: &Sim) -> Result<(), SaveError> {
    let file = File::create(path)?;
    if is_gz(path) {
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        sim.save(&mut encoder)?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = BufWriter::new(file);
        sim.save(&mut writer)?;
        writer.flush()?;
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if args.scenarios {
        return if scenarios::run_all(args.verbose) { ExitCode::SUCCESS } else { ExitCode::from(1) };
    }

    if let Some(path) = &args.write_demo {
        let mut sim = scenarios::demo_colony(args.seed);
        sim.run_ticks(args.ticks);
        return match write_save(path, &sim) {
            Ok(()) => {
                println!("wrote {} after {} ticks", path.display(), sim.clock.tick);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: could not write {}: {}", path.display(), e);
                ExitCode::from(1)
            }
        };
    }

    let path = args.inspect.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE));
    let sim = match read_save(&path) {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("error: {}: {}", path.display(), e);
            return ExitCode::from(1);
        }
    };
    log::info!("loaded {} at tick {}", path.display(), sim.clock.tick);

    let query = inspect::Query {
        mover: args.mover,
        item: args.item,
        job: args.job,
        stockpile: args.stockpile,
        cell: args.cell,
        stuck: args.stuck,
        reserved: args.reserved,
        jobs_active: args.jobs_active,
    };
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match inspect::report(&sim, &query, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell("3,4,1"), Ok(CellPos::new(3, 4, 1)));
        assert_eq!(parse_cell(" 3, 4 ,0"), Ok(CellPos::new(3, 4, 0)));
        assert!(parse_cell("3,4").is_err());
        assert!(parse_cell("a,b,c").is_err());
    }

    #[test]
    fn test_gz_roundtrip() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("colonysim-test-{}.sav.gz", std::process::id()));
        let mut sim = scenarios::demo_colony(9);
        sim.run_ticks(30);
        write_save(&path, &sim).unwrap();
        let loaded = read_save(&path).unwrap();
        assert_eq!(loaded.clock, sim.clock);
        assert_eq!(loaded.movers.len(), sim.movers.len());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(matches!(read_save(Path::new("/nonexistent/colony.sav")), Err(SaveError::Io(_))));
    }
}
