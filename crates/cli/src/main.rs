use std::process::ExitCode;

fn main() -> ExitCode {
    rigquote_cli::run()
}
