//! Unix-socket command server.
//!
//! Binds a Unix stream socket and serves every accepted connection on its
//! own session thread.  A session reads one line at a time, hands it to a
//! [`Dispatch`] implementation and writes the single-line answer back, until
//! the client hangs up.
//!
//! # Wire format
//!
//! UTF-8 text, one command per line, one response per line:
//!
//! ```text
//! > ping
//! < pong
//! > show launcher
//! < OK
//! > show bogus
//! < ERROR: unknown component: bogus
//! ```
//!
//! In the daemon the dispatcher is the main loop's message channel, so
//! commands run on the main thread in the order they arrive.

use crate::message::{CommandRequest, Message};
use crate::socket::{read_frame, CancelToken, ReadMode, SocketError};
use crate::traits::MessageSource;
use log::{debug, error, info, warn};
use std::io::{self, BufReader, Write};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

/// Errors produced by the command server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("cannot bind {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Turns a command line into a response line.
///
/// `None` means no response will ever come (the daemon is shutting down);
/// the session closes its connection.
pub trait Dispatch {
    fn dispatch(&self, line: String) -> Option<String>;
}

impl Dispatch for mpsc::Sender<Message> {
    fn dispatch(&self, line: String) -> Option<String> {
        let (request, response) = CommandRequest::new(line);
        self.send(request.into()).ok()?;
        response.recv().ok()
    }
}

//  Session state machine

/// Where a session is in its read → dispatch → write cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Reading,
    Dispatching(String),
    Writing(String),
    Closed,
}

/// One accepted client connection.
pub struct Session {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
    cancel: CancelToken,
    id: u64,
    state: SessionState,
}

impl Session {
    /// Wrap an accepted stream.  The stream is registered with `cancel` so a
    /// server shutdown aborts a pending read.
    pub fn new(stream: UnixStream, cancel: &CancelToken) -> Result<Self, SocketError> {
        let id = cancel.register(&stream)?;
        let writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(e) => {
                cancel.release(id);
                return Err(e.into());
            }
        };
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            cancel: cancel.clone(),
            id,
            state: SessionState::Reading,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Advance by one transition.
    pub fn step<D: Dispatch + ?Sized>(&mut self, dispatcher: &D) {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);
        self.state = match state {
            SessionState::Reading => self.read_line(),
            SessionState::Dispatching(line) => match dispatcher.dispatch(line) {
                Some(response) => SessionState::Writing(response),
                None => {
                    debug!("no dispatcher left, closing session");
                    SessionState::Closed
                }
            },
            SessionState::Writing(response) => self.write_response(response),
            SessionState::Closed => SessionState::Closed,
        };
    }

    /// Step until the connection is closed.
    pub fn run<D: Dispatch + ?Sized>(mut self, dispatcher: &D) {
        while self.state != SessionState::Closed {
            self.step(dispatcher);
        }
    }

    fn read_line(&mut self) -> SessionState {
        match read_frame(&mut self.reader, ReadMode::Line) {
            Ok(Some(_)) if self.cancel.is_cancelled() => SessionState::Closed,
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(line) => SessionState::Dispatching(line),
                Err(e) => {
                    warn!("invalid utf-8 from client: {}", e);
                    SessionState::Closed
                }
            },
            Ok(None) => {
                debug!("client closed connection");
                SessionState::Closed
            }
            Err(e) => {
                if !self.cancel.is_cancelled() {
                    error!("error reading from socket: {}", e);
                }
                SessionState::Closed
            }
        }
    }

    fn write_response(&mut self, response: String) -> SessionState {
        let mut data = response.into_bytes();
        data.push(b'\n');
        match self.writer.write_all(&data).and_then(|_| self.writer.flush()) {
            Ok(()) => SessionState::Reading,
            Err(e) => {
                error!("error writing on socket: {}", e);
                SessionState::Closed
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.release(self.id);
        let _ = self.writer.shutdown(Shutdown::Both);
    }
}

//  Server

/// Pause after the `failures`-th accept error in a row: 10ms doubling up
/// to one second, so a persistent error (`EMFILE`) does not spin.
pub fn accept_backoff(failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(7);
    Duration::from_millis(10 << exp).min(Duration::from_secs(1))
}

/// Stops a running [`CommandServer`] from another thread.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    path: PathBuf,
    cancel: CancelToken,
}

impl ServerHandle {
    /// Abort every pending session read and stop accepting.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        // Wake the accept loop so it notices.
        let _ = UnixStream::connect(&self.path);
    }
}

/// A [`MessageSource`] that forwards command lines received on a Unix
/// socket to the main loop and writes back its answers.
pub struct CommandServer {
    path: PathBuf,
    cancel: CancelToken,
}

impl CommandServer {
    /// Create a server for `path`.
    ///
    /// The socket file is created when [`bind`](Self::bind) (or
    /// [`run`](MessageSource::run)) is called and removed when the server
    /// stops.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cancel: CancelToken::new(),
        }
    }

    /// The filesystem path of the socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            path: self.path.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Remove any stale socket file and bind a fresh listener.
    pub fn bind(&self) -> Result<UnixListener, ServerError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed stale socket {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let listener = UnixListener::bind(&self.path).map_err(|source| ServerError::Bind {
            path: self.path.clone(),
            source,
        })?;
        info!("listening for commands on {}", self.path.display());
        Ok(listener)
    }

    /// Accept connections on `listener` until shut down.
    ///
    /// This method **blocks**.  Each connection gets its own session thread
    /// with a clone of `dispatcher`.
    pub fn serve<D>(&self, listener: UnixListener, dispatcher: D)
    where
        D: Dispatch + Clone + Send + 'static,
    {
        let mut failures = 0u32;
        for stream in listener.incoming() {
            if self.cancel.is_cancelled() {
                break;
            }
            let stream = match stream {
                Ok(stream) => {
                    failures = 0;
                    stream
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = accept_backoff(failures);
                    error!("accept error: {} (retrying in {:?})", e, delay);
                    std::thread::sleep(delay);
                    continue;
                }
            };
            debug!("client connected");
            let session = match Session::new(stream, &self.cancel) {
                Ok(session) => session,
                Err(e) => {
                    error!("cannot start session: {}", e);
                    continue;
                }
            };
            let dispatcher = dispatcher.clone();
            let spawned = std::thread::Builder::new()
                .name("aria-cmd-session".into())
                .spawn(move || session.run(&dispatcher));
            if let Err(e) = spawned {
                error!("cannot spawn session thread: {}", e);
            }
        }
        let _ = std::fs::remove_file(&self.path);
        info!("command server stopped");
    }
}

impl MessageSource for CommandServer {
    type Error = ServerError;

    /// Bind the socket and serve until shut down.
    ///
    /// This method **blocks** indefinitely.  Run it on a dedicated thread.
    fn run(&mut self, sink: mpsc::Sender<Message>) -> Result<(), Self::Error> {
        let listener = self.bind()?;
        self.serve(listener, sink);
        Ok(())
    }
}

//  Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::registry::tests::FakeSurface;
    use crate::ipc::registry::{CommandRegistry, Components};
    use crate::socket::is_socket;
    use crate::socket::tests::tmp_socket_path;
    use std::cell::RefCell;
    use std::io::{BufRead, Read};
    use std::rc::Rc;
    use std::thread::JoinHandle;

    /// Run a server plus a main loop that answers with a real registry.
    fn start_daemon(path: &Path) -> (ServerHandle, JoinHandle<()>, JoinHandle<()>) {
        let server = CommandServer::new(path);
        let handle = server.handle();
        let listener = server.bind().expect("bind");
        let (tx, rx) = mpsc::channel::<Message>();

        let server_thread = std::thread::spawn(move || server.serve(listener, tx));
        let main_thread = std::thread::spawn(move || {
            let (launcher, _) = FakeSurface::new();
            let components = Rc::new(RefCell::new(Components {
                launcher: Some(Box::new(launcher)),
                terminal: None,
            }));
            let registry = CommandRegistry::new(components);
            for msg in rx {
                if let Message::Command(request) = msg {
                    let response = registry.run(&request.line);
                    request.respond(response);
                }
            }
        });
        (handle, server_thread, main_thread)
    }

    /// Answers every line with its uppercase form.
    struct Upper;

    impl Dispatch for Upper {
        fn dispatch(&self, line: String) -> Option<String> {
            Some(line.to_uppercase())
        }
    }

    fn expected(line: &str) -> String {
        let (launcher, _) = FakeSurface::new();
        let components = Rc::new(RefCell::new(Components {
            launcher: Some(Box::new(launcher)),
            terminal: None,
        }));
        format!("{}\n", CommandRegistry::new(components).run(line))
    }

    #[test]
    fn responses_match_registry_in_order() {
        let path = tmp_socket_path("server-roundtrip");
        let (handle, server_thread, main_thread) = start_daemon(&path);

        let mut stream = UnixStream::connect(&path).expect("connect");
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let requests = ["ping", "frobnicate", "show bogus", "show launcher", "", "show"];
        for request in requests {
            writeln!(stream, "{}", request).unwrap();
            let mut response = String::new();
            reader.read_line(&mut response).unwrap();
            assert_eq!(response, expected(request), "request {:?}", request);
        }

        drop(stream);
        handle.shutdown();
        server_thread.join().unwrap();
        main_thread.join().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn pipelined_requests_keep_order() {
        let path = tmp_socket_path("server-pipelined");
        let (handle, server_thread, main_thread) = start_daemon(&path);

        let mut stream = UnixStream::connect(&path).expect("connect");
        stream.write_all(b"ping\nnope\nping\n").unwrap();
        stream.shutdown(Shutdown::Write).unwrap();
        let mut all = String::new();
        stream.read_to_string(&mut all).unwrap();
        assert_eq!(all, "pong\nUnknown command: nope\npong\n");

        handle.shutdown();
        server_thread.join().unwrap();
        main_thread.join().unwrap();
    }

    #[test]
    fn partial_line_gets_no_response() {
        let path = tmp_socket_path("server-partial");
        let (handle, server_thread, main_thread) = start_daemon(&path);

        let mut stream = UnixStream::connect(&path).expect("connect");
        stream.write_all(b"ping").unwrap();
        stream.shutdown(Shutdown::Write).unwrap();
        let mut all = String::new();
        stream.read_to_string(&mut all).unwrap();
        assert_eq!(all, "");

        handle.shutdown();
        server_thread.join().unwrap();
        main_thread.join().unwrap();
    }

    #[test]
    fn stale_socket_file_is_replaced() {
        let path = tmp_socket_path("server-stale");
        // Leave a dead socket file behind, as a crashed daemon would.
        drop(UnixListener::bind(&path).unwrap());
        assert!(is_socket(&path));

        let (handle, server_thread, main_thread) = start_daemon(&path);
        let mut stream = UnixStream::connect(&path).expect("connect to fresh listener");
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        writeln!(stream, "ping").unwrap();
        let mut response = String::new();
        reader.read_line(&mut response).unwrap();
        assert_eq!(response, "pong\n");
        assert!(is_socket(&path));

        drop(stream);
        handle.shutdown();
        server_thread.join().unwrap();
        main_thread.join().unwrap();
    }

    #[test]
    fn shutdown_aborts_idle_sessions() {
        let path = tmp_socket_path("server-shutdown");
        let (handle, server_thread, main_thread) = start_daemon(&path);

        // Connected but silent: the session sits in a blocking read.
        let mut idle = UnixStream::connect(&path).expect("connect");
        std::thread::sleep(std::time::Duration::from_millis(100));

        handle.shutdown();
        server_thread.join().unwrap();
        main_thread.join().unwrap();

        let mut rest = Vec::new();
        assert_eq!(idle.read_to_end(&mut rest).unwrap_or(0), 0);
    }

    #[test]
    fn session_steps_through_states() {
        let (client, server_side) = UnixStream::pair().unwrap();
        let cancel = CancelToken::new();
        let mut session = Session::new(server_side, &cancel).unwrap();
        let echo = Upper;

        let mut client_writer = client.try_clone().unwrap();
        client_writer.write_all(b"hello\n").unwrap();

        assert_eq!(session.state(), &SessionState::Reading);
        session.step(&echo);
        assert_eq!(session.state(), &SessionState::Dispatching("hello".into()));
        session.step(&echo);
        assert_eq!(session.state(), &SessionState::Writing("HELLO".into()));
        session.step(&echo);
        assert_eq!(session.state(), &SessionState::Reading);

        let mut reader = BufReader::new(client);
        let mut response = String::new();
        reader.read_line(&mut response).unwrap();
        assert_eq!(response, "HELLO\n");

        client_writer.shutdown(Shutdown::Write).unwrap();
        session.step(&echo);
        assert_eq!(session.state(), &SessionState::Closed);
        drop(session);
        assert_eq!(cancel.pending(), 0);
    }

    #[test]
    fn session_closes_when_dispatcher_is_gone() {
        let (mut client, server_side) = UnixStream::pair().unwrap();
        let cancel = CancelToken::new();
        let mut session = Session::new(server_side, &cancel).unwrap();
        let (tx, rx) = mpsc::channel::<Message>();
        drop(rx);

        client.write_all(b"ping\n").unwrap();
        session.step(&tx);
        session.step(&tx);
        assert_eq!(session.state(), &SessionState::Closed);
    }

    #[test]
    fn invalid_utf8_closes_session() {
        let (mut client, server_side) = UnixStream::pair().unwrap();
        let cancel = CancelToken::new();
        let mut session = Session::new(server_side, &cancel).unwrap();
        client.write_all(&[0xff, 0xfe, b'\n']).unwrap();
        session.step(&Upper);
        assert_eq!(session.state(), &SessionState::Closed);
    }

    #[test]
    fn run_as_message_source() {
        let path = tmp_socket_path("server-source");
        let mut server = CommandServer::new(&path);
        let handle = server.handle();
        let (tx, rx) = mpsc::channel::<Message>();
        let server_thread = std::thread::spawn(move || server.run(tx));
        for _ in 0..50 {
            if is_socket(&path) {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        let client_path = path.clone();
        let client = std::thread::spawn(move || {
            crate::ipc::client::send_command(&client_path, "hello").unwrap()
        });
        match rx.recv().unwrap() {
            Message::Command(request) => {
                assert_eq!(request.line, "hello");
                request.respond("world".into());
            }
            Message::Wm(_) => panic!("unexpected wm update"),
        }
        assert_eq!(client.join().unwrap(), "world");

        handle.shutdown();
        assert!(server_thread.join().unwrap().is_ok());
    }

    #[test]
    fn accept_backoff_grows_and_caps() {
        assert_eq!(accept_backoff(1), Duration::from_millis(10));
        assert_eq!(accept_backoff(2), Duration::from_millis(20));
        assert_eq!(accept_backoff(4), Duration::from_millis(80));
        assert_eq!(accept_backoff(8), Duration::from_secs(1));
        assert_eq!(accept_backoff(u32::MAX), Duration::from_secs(1));
    }
}
