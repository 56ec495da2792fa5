//! Entry point for the **aria-shell** daemon.
//!
//! Loads the configuration, starts the command server and the compositor
//! backend on background threads and processes their messages on the main
//! thread until every source is gone.

use aria_shell::app::App;
use aria_shell::components::build_components;
use aria_shell::config::Config;
use aria_shell::ipc::CommandServer;
use aria_shell::message::Message;
use aria_shell::wm::backend::select_backend;
use aria_shell::wm::WorkspaceService;
use log::{debug, error};
use std::path::PathBuf;
use std::sync::mpsc;

const USAGE: &str = "usage: aria-shell [--config <path>] [--log-level <level>]";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    log_level: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                args.config = Some(it.next().ok_or("--config needs a path")?.into());
            }
            "--log-level" | "-l" => {
                args.log_level = Some(it.next().ok_or("--log-level needs a level")?);
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {}", other)),
        }
    }
    Ok(args)
}

fn init_logging(level: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.init();
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    init_logging(args.log_level.as_deref());

    let config = match Config::discover(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let (tx, rx) = mpsc::channel::<Message>();

    spawn_command_server(&config, tx.clone());
    let workspaces = start_workspaces(&config, tx);

    let components = build_components(&config.general());
    let mut app = App::new(components, workspaces);
    debug!("registered commands: {:?}", app.registry().commands());
    app.run(rx);
}

/// Bind the command socket and serve it on a background thread.
fn spawn_command_server(config: &Config, tx: mpsc::Sender<Message>) {
    let server = CommandServer::new(config.socket().path());
    let listener = match server.bind() {
        Ok(listener) => listener,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    std::thread::spawn(move || server.serve(listener, tx));
}

/// Pick a compositor backend and start mirroring its state.
fn start_workspaces(config: &Config, tx: mpsc::Sender<Message>) -> Option<WorkspaceService> {
    let backends = config.workspaces().backends;
    let backend = select_backend(backends.into_iter().map(|kind| move || kind.connect()))?;

    let mut service = WorkspaceService::new(backend);
    service.watch_events(|event, state| {
        debug!(
            "{} ({} monitors, {} workspaces, {} windows)",
            event,
            state.monitors().len(),
            state.workspaces().len(),
            state.windows().len()
        );
    });
    if let Err(e) = service.start(tx) {
        error!("cannot start workspace service: {}", e);
        return None;
    }
    Some(service)
}
