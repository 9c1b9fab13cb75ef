use std::process::ExitCode;

fn main() -> ExitCode {
    edara_cli::run()
}
