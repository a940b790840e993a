use std::io::{stderr, stdout};
use std::process::ExitCode;

fn main() -> ExitCode {
    let code = mirror_daemon::cli::run(std::env::args_os(), &mut stdout(), &mut stderr());
    ExitCode::from(code.clamp(0, i32::from(u8::MAX)) as u8)
}
