//! Mosa CLI — compile `.ms` manifests into an execution plan.

use clap::Parser;

fn main() {
    let args = mosa::cli::Args::parse();
    if let Err(e) = mosa::cli::dispatch(&args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
