mod args;
mod tally;

use clap::Parser;
use log::info;
use snafu::ErrorCompat;

use crate::args::Args;

fn main() {
    let args = Args::parse();
    if args.verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
    info!("arguments: {:?}", args);

    if let Err(e) = tally::run_tally(&args) {
        eprintln!("An error occured {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
