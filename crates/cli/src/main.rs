use std::process::ExitCode;

fn main() -> ExitCode {
    kodbook_cli::run()
}
