use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use dsr_scraper::charts::suburbs::check_extension;
use dsr_scraper::charts::{combine_images, fetch_all, read_suburbs};
use dsr_scraper::config::{Config, CHART_PADDING};
use dsr_scraper::error::Result;
use dsr_scraper::fetcher::Pacer;
use dsr_scraper::session::{load_cookies, Session};

/// Combine property charts from a CSV/XLSX/XLS file.
#[derive(Parser, Debug)]
#[command(name = "charts")]
struct Args {
    /// Input file (csv, xlsx, or xls)
    #[arg(short, long, default_value = "suburbs.csv")]
    input: PathBuf,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = dsr_scraper::logging::init(&cfg.log_level, &cfg.error_log_path) {
        eprintln!("Logging setup error: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(cfg, args.input).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config, input: PathBuf) -> Result<()> {
    check_extension(&input)?;
    let cookies = load_cookies(&cfg.cookies_path)?;
    let session = Session::login(&cfg, &cookies).await?;

    let suburbs = read_suburbs(&input)?;
    info!("Loaded {} suburbs from {}", suburbs.len(), input.display());

    let pacer = Pacer::new(cfg.request_delay_min_ms, cfg.request_delay_max_ms);
    let saved = fetch_all(&session, &suburbs, &cfg.chart_temp_dir, &pacer).await?;
    info!("Retrieved {saved} of {} charts", suburbs.len());

    combine_images(&cfg.chart_temp_dir, &cfg.chart_output_dir, CHART_PADDING)?;
    Ok(())
}
