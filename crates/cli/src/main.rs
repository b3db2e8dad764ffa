use std::process::ExitCode;

fn main() -> ExitCode {
    wagewiz_cli::run()
}
