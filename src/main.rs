use clap::Parser;
use dailyquant::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
