use std::process::ExitCode;

fn main() -> ExitCode {
    henhouse_cli::run()
}
