//! `aria-msg`: send one command to a running aria-shell.
//!
//! ```text
//! aria-msg ping
//! aria-msg show launcher
//! aria-msg --socket /run/user/1000/aria-shell/cmd.sock show terminal
//! ```
//!
//! Prints the response and exits with status 1 when the daemon cannot be
//! reached or answers with an error.

use aria_shell::config::Config;
use aria_shell::ipc::client::{is_error_response, send_command};
use std::path::PathBuf;

const USAGE: &str = "usage: aria-msg [--socket <path>] <command> [args...]";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut socket: Option<PathBuf> = None;
    let mut words: Vec<String> = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if words.is_empty() && arg == "--socket" {
            match args.next() {
                Some(path) => socket = Some(path.into()),
                None => fail(USAGE),
            }
        } else if words.is_empty() && (arg == "--help" || arg == "-h") {
            println!("{}", USAGE);
            return;
        } else {
            words.push(arg);
        }
    }
    if words.is_empty() {
        fail(USAGE);
    }

    let path = match socket {
        Some(path) => path,
        None => match Config::discover(None) {
            Ok(config) => config.socket().path(),
            Err(e) => fail(&e.to_string()),
        },
    };

    match send_command(&path, &words.join(" ")) {
        Ok(response) => {
            println!("{}", response);
            if is_error_response(&response) {
                std::process::exit(1);
            }
        }
        Err(e) => fail(&format!("cannot reach aria-shell at {}: {}", path.display(), e)),
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}
