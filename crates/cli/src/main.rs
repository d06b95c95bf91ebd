use std::process::ExitCode;

fn main() -> ExitCode {
    cutplan_cli::run()
}
