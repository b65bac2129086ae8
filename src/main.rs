mod app;
mod cli;
mod config;
mod db;
mod http;
mod logging;
mod paths;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let config = config::Config::load()?;

    // Logging is best effort; the commands still work without a log file.
    match paths::log_file_path() {
        Ok(log_path) => {
            if let Err(err) = logging::init(&log_path) {
                eprintln!("warning: logging disabled: {err:#}");
            }
        }
        Err(err) => eprintln!("warning: logging disabled: {err:#}"),
    }

    app::run(cli, config)
}
