//! Geocoding backfill for directory entries without coordinates.
//!
//! Each run selects up to `batch_size` entries whose main address still has
//! no coordinates, resolves them one at a time through the configured
//! geocoder, and writes the result back. Failed lookups are retried on the
//! next run.
//!
//! ## Usage
//!
//! ```bash
//! veterimap-geocode                  # Process one batch and exit
//! veterimap-geocode --interval 3600  # Process a batch every hour
//! ```
//!
//! Do not run two instances against the same database.

use anyhow::Result;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::info;

use veterimap::config::Config;
use veterimap::db::Database;
use veterimap::geocode::{Backfill, NominatimClient};
use veterimap::logging;

#[derive(Default)]
struct JobArgs {
    /// Seconds between batches. `None` runs a single batch.
    interval: Option<u64>,
    batch_size: Option<u32>,
    config_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = parse_args();

    let mut config = Config::load(args.config_path.as_deref())?;
    if let Some(batch_size) = args.batch_size {
        config.backfill.batch_size = batch_size;
    }

    logging::init(config.logging.log_dir.clone(), "veterimap-geocode.log")?;
    info!("Geocoding backfill starting...");

    let db = Database::open(&config.database)?;
    db.initialize()?;
    info!("Database opened ({} backend)", db.backend_name());

    let geocoder = NominatimClient::new(&config.geocoder);

    match args.interval {
        None => {
            Backfill::new(&db, &geocoder, config.backfill.clone()).run();
        }
        Some(interval) => {
            info!("Running in daemon mode, one batch every {} seconds", interval);
            loop {
                Backfill::new(&db, &geocoder, config.backfill.clone()).run();
                thread::sleep(Duration::from_secs(interval));
            }
        }
    }

    info!("Geocoding backfill stopped");
    Ok(())
}

fn parse_args() -> JobArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = JobArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" | "-1" => {
                parsed.interval = None;
            }
            "--interval" | "-i" => {
                if i + 1 < args.len() {
                    match args[i + 1].parse() {
                        Ok(interval) => parsed.interval = Some(interval),
                        Err(_) => fail(&format!("invalid interval: {}", args[i + 1])),
                    }
                    i += 1;
                } else {
                    fail("--interval requires a number of seconds");
                }
            }
            "--batch-size" | "-b" => {
                if i + 1 < args.len() {
                    match args[i + 1].parse() {
                        Ok(size) => parsed.batch_size = Some(size),
                        Err(_) => fail(&format!("invalid batch size: {}", args[i + 1])),
                    }
                    i += 1;
                } else {
                    fail("--batch-size requires a number");
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    fail("--config requires a path argument");
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn print_help() {
    println!(
        r#"veterimap-geocode - Fill in coordinates for directory entries

USAGE:
    veterimap-geocode [OPTIONS]

OPTIONS:
    --once, -1            Process one batch and exit (default)
    --interval, -i N      Process a batch every N seconds
    --batch-size, -b N    Entries per batch (default: 100)
    --config, -c PATH     Path to config file
    --help, -h            Show this help message

ENVIRONMENT:
    VETERIMAP_CONFIG      Path to config file (overrides default location)
    VETERIMAP_LOG         Log filter (trace, debug, info, warn, error)
    DB_URL                PostgreSQL connection URL (selects the PostgreSQL backend)

Lookups are spaced by backfill.request_interval_ms (default 1200 ms) to
respect the public Nominatim usage policy.
"#
    );
}
