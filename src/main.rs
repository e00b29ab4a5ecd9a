use std::io::{self, BufRead, Write};

use tracing::{error, info};

use dsr_scraper::config::Config;
use dsr_scraper::driver::{output_filename, Driver};
use dsr_scraper::error::Result;
use dsr_scraper::fetcher::HttpMarketSource;
use dsr_scraper::session::{load_cookies, Session};
use dsr_scraper::sink::GoogleSheets;

#[tokio::main]
async fn main() {
    // SHEET_ID persisted by an earlier run lives in .env
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

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let use_sheets = ask_yes_no("Do you want to log data to Google Sheets? (y/n): ")?;

    // --- Session: cookies + landing page token ---
    let cookies = load_cookies(&cfg.cookies_path)?;
    let session = Session::login(&cfg, &cookies).await?;

    // --- Optional spreadsheet mirror ---
    let sheets = if use_sheets {
        GoogleSheets::connect(&cfg).await
    } else {
        info!("Google Sheets logging is disabled.");
        None
    };

    // --- Walk the DSR range ---
    let source = HttpMarketSource::new(&session, &cfg);
    let output = output_filename(&cfg.output_dir);
    info!("Writing records to {}", output.display());
    let mut driver = Driver::new(&source, &cfg, output, sheets);
    let summary = driver.run().await?;

    if let Some(dedup) = &summary.dedup {
        info!(
            "Run complete: {} records ({} unique) from {} queries, clean file {}",
            summary.total_records,
            dedup.after,
            summary.queries,
            dedup.output.display()
        );
    } else {
        info!(
            "Run complete: no records written to {} ({} queries)",
            driver.output().display(),
            summary.queries
        );
    }
    Ok(())
}

fn ask_yes_no(prompt: &str) -> Result<bool> {
    let mut stdout = io::stdout();
    stdout.write_all(prompt.as_bytes())?;
    stdout.flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}
