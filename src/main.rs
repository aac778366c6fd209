use std::process::ExitCode;

use clap::Parser;

use tabular_explorer::cli::{run, Args};

fn main() -> ExitCode {
    env_logger::init();

    let args = Args::parse();
    let stdout = std::io::stdout();
    match run(args, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
