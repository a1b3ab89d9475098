use std::process::ExitCode;

fn main() -> ExitCode {
    tether_cli::run()
}
