use std::process::ExitCode;

fn main() -> ExitCode {
    tradeflow_cli::run()
}
