use clap::Parser;
use stockbt::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    stockbt::logging::init(cli.verbose);
    run(cli)
}
