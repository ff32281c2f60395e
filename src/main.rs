//! Entry point for the precip_clim application.
//! Parses the command line, runs the climatology pipeline and reports the outcome.

use clap::Parser;
use precip_clim::cli::{init_logging, Args};
use precip_clim::pipeline::Pipeline;
use std::process::ExitCode;

fn main() -> ExitCode {
    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match args.into_config(command_line) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    match Pipeline::netcdf().run(&config) {
        Ok(report) => {
            for path in &report.written {
                println!("✅ Saved {}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
