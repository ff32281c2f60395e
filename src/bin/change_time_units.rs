//! Re-encode the time axis of a NetCDF variable and chain its history.

use clap::Parser;
use precip_clim::cli::{init_logging, TimeUnitsArgs};
use precip_clim::pipeline::change_time_units;
use std::process::ExitCode;

fn main() -> ExitCode {
    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    let args = TimeUnitsArgs::parse();
    init_logging(args.verbose);

    match change_time_units(
        &args.infile,
        &args.variable,
        &args.new_time_units,
        &args.outfile,
        &command_line,
        None,
    ) {
        Ok(_) => {
            println!("✅ Saved result to {}", args.outfile.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: time unit conversion failed: {err}");
            ExitCode::FAILURE
        }
    }
}
