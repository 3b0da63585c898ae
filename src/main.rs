use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use veterimap::config::Config;
use veterimap::db::{Database, DirectoryStore};
use veterimap::directory::import;
use veterimap::http::{self, AppState};
use veterimap::logging;
use veterimap::search::SearchEngine;

#[derive(Default)]
struct Args {
    config_path: Option<PathBuf>,
    import_path: Option<PathBuf>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("veterimap {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" | "--import" => {
                let flag = args[i].clone();
                if i + 1 < args.len() {
                    let path = PathBuf::from(&args[i + 1]);
                    if flag == "--import" {
                        parsed.import_path = Some(path);
                    } else {
                        parsed.config_path = Some(path);
                    }
                    i += 1;
                } else {
                    eprintln!("Error: {} requires a path argument", flag);
                    std::process::exit(1);
                }
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

fn print_help() {
    println!(
        r#"veterimap - Veterinary directory search service

USAGE:
    veterimap [OPTIONS]

OPTIONS:
    --config, -c PATH   Path to config file
    --import FILE       Import a JSON dataset of clinics and exit
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    VETERIMAP_CONFIG    Path to config file (overrides default location)
    VETERIMAP_LOG       Log filter (trace, debug, info, warn, error)
    DB_URL              PostgreSQL connection URL (selects the PostgreSQL backend)
    PORT                Listening port (overrides server.bind)

ENDPOINTS:
    GET /health
    GET /api/profiles/?name=&city=&tag=&page=
    GET /api/profiles/map?city=&type=&specialty=
    GET /api/profiles/detail?id=
"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    let config = Config::load(args.config_path.as_deref())?;
    logging::init(config.logging.log_dir.clone(), "veterimap.log")?;

    let db = Database::open(&config.database)?;
    db.initialize().context("Failed to initialize database schema")?;
    info!("Database opened ({} backend)", db.backend_name());

    if let Some(path) = args.import_path {
        let report = import::import_file(&db, &path)?;
        println!(
            "Imported {} of {} records ({} failed)",
            report.imported, report.total, report.failed
        );
        return Ok(());
    }

    info!("{} active directory entries", db.count_active()?);

    let state = AppState::new(SearchEngine::new(Arc::new(db)));
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(state, &config.server.bind))
}

async fn serve(state: AppState, bind: &str) -> Result<()> {
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on {}", bind);

    axum::serve(listener, app).await?;
    Ok(())
}
