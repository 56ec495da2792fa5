//! Client side of a Unix stream socket speaking a line protocol.
//!
//! [`LineSocket`] holds the path of an **existing** socket and opens one
//! short-lived connection per operation.  Connecting and writing happen on
//! the caller's thread so a missing or refusing peer is reported right away;
//! reading happens on a dedicated reader thread that hands every received
//! frame to a callback, one frame at a time.
//!
//! There is no retry and no timeout anywhere in this module.  A peer that
//! never answers keeps its reader thread parked until the socket is
//! cancelled through its [`CancelToken`].

use log::{debug, error};
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

/// Read buffer size, and the upper bound of a frame in [`ReadMode::Chunk`].
pub const CHUNK_SIZE: usize = 64 * 1024;

/// How a reader splits the incoming byte stream into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Whatever is available in one read, up to [`CHUNK_SIZE`] bytes.
    Chunk,
    /// One `\n`-terminated line, delivered without the terminator.
    ///
    /// A trailing fragment without `\n` at end of stream is discarded: the
    /// peer closed before sending a full line.
    Line,
    /// Everything until the peer closes, delivered as a single frame.
    ToEnd,
}

/// Errors produced by [`LineSocket`].
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("not a unix socket: {}", .0.display())]
    NotASocket(PathBuf),
    #[error("connect to {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("socket cancelled")]
    Cancelled,
}

/// `true` if `path` exists and is a Unix socket.
pub fn is_socket(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.file_type().is_socket())
        .unwrap_or(false)
}

/// Read the next frame from `reader`.
///
/// Returns `Ok(None)` once the peer has closed the stream.
pub fn read_frame<R: BufRead>(reader: &mut R, mode: ReadMode) -> io::Result<Option<Vec<u8>>> {
    match mode {
        ReadMode::Chunk => loop {
            let data = match reader.fill_buf() {
                Ok(data) => data,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if data.is_empty() {
                return Ok(None);
            }
            let len = data.len().min(CHUNK_SIZE);
            let frame = data[..len].to_vec();
            reader.consume(len);
            return Ok(Some(frame));
        },
        ReadMode::Line => {
            let mut line = Vec::new();
            reader.read_until(b'\n', &mut line)?;
            if line.pop() != Some(b'\n') {
                return Ok(None);
            }
            Ok(Some(line))
        }
        ReadMode::ToEnd => {
            let mut all = Vec::new();
            reader.read_to_end(&mut all)?;
            Ok(if all.is_empty() { None } else { Some(all) })
        }
    }
}

/// Read frames until the stream ends, an error occurs, or `cancel` fires.
///
/// Reads are strictly sequential: the next read is only issued after
/// `on_frame` has returned.  Cancelled reads never reach `on_frame` and are
/// not reported as errors.
pub fn read_loop<R, F>(mut reader: R, mode: ReadMode, cancel: &CancelToken, mut on_frame: F)
where
    R: BufRead,
    F: FnMut(Vec<u8>),
{
    loop {
        match read_frame(&mut reader, mode) {
            Ok(Some(frame)) => {
                if cancel.is_cancelled() {
                    break;
                }
                on_frame(frame);
                if mode == ReadMode::ToEnd {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                if !cancel.is_cancelled() {
                    error!("socket read error: {}", e);
                }
                break;
            }
        }
    }
}

//  Cancellation

#[derive(Debug, Default)]
struct CancelState {
    cancelled: bool,
    next_id: u64,
    streams: HashMap<u64, UnixStream>,
}

/// Shared cancellation flag for a group of connections.
///
/// Every connection with a pending read registers a clone of its stream.
/// [`cancel`](CancelToken::cancel) shuts all of them down, which wakes the
/// blocked readers; later registrations are refused.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Mutex<CancelState>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CancelState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Abort every registered read.  Idempotent.
    pub fn cancel(&self) {
        let mut state = self.lock();
        state.cancelled = true;
        for (_, stream) in state.streams.drain() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Number of connections currently registered.
    pub fn pending(&self) -> usize {
        self.lock().streams.len()
    }

    pub(crate) fn register(&self, stream: &UnixStream) -> Result<u64, SocketError> {
        let mut state = self.lock();
        if state.cancelled {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(SocketError::Cancelled);
        }
        let clone = stream.try_clone()?;
        let id = state.next_id;
        state.next_id += 1;
        state.streams.insert(id, clone);
        Ok(id)
    }

    pub(crate) fn release(&self, id: u64) {
        self.lock().streams.remove(&id);
    }
}

//  Socket client

/// Handle to a running reader thread.
///
/// Dropping the handle detaches the thread; it still stops when the peer
/// closes or the owning socket is cancelled.
#[derive(Debug)]
pub struct ReadLoop {
    handle: JoinHandle<()>,
}

impl ReadLoop {
    /// Block until the reader thread has finished.
    pub fn join(self) {
        if self.handle.join().is_err() {
            error!("socket reader thread panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// A client for an existing Unix stream socket.
///
/// Cloning is cheap and clones share the same [`CancelToken`].
#[derive(Debug, Clone)]
pub struct LineSocket {
    path: PathBuf,
    cancel: CancelToken,
}

impl LineSocket {
    /// Fails with [`SocketError::NotASocket`] unless `path` is an existing
    /// Unix socket.  No connection is opened yet.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SocketError> {
        let path = path.as_ref().to_path_buf();
        if !is_socket(&path) {
            return Err(SocketError::NotASocket(path));
        }
        Ok(Self {
            path,
            cancel: CancelToken::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn connect(&self) -> Result<UnixStream, SocketError> {
        if self.cancel.is_cancelled() {
            return Err(SocketError::Cancelled);
        }
        UnixStream::connect(&self.path).map_err(|source| SocketError::Connect {
            path: self.path.clone(),
            source,
        })
    }

    fn connect_and_write(&self, data: &[u8]) -> Result<UnixStream, SocketError> {
        let mut stream = self.connect()?;
        stream.write_all(data)?;
        stream.flush()?;
        Ok(stream)
    }

    /// Write `data` on a fresh connection and close it.  No response is read.
    pub fn send(&self, data: impl AsRef<[u8]>) -> Result<(), SocketError> {
        let stream = self.connect_and_write(data.as_ref())?;
        let _ = stream.shutdown(Shutdown::Write);
        Ok(())
    }

    /// Write `data`, then call `on_response` for every frame the peer sends
    /// back until it closes the connection.
    pub fn send_and_recv<F>(
        &self,
        data: impl AsRef<[u8]>,
        mode: ReadMode,
        on_response: F,
    ) -> Result<ReadLoop, SocketError>
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        let stream = self.connect_and_write(data.as_ref())?;
        self.spawn_reader(stream, mode, on_response)
    }

    /// Connect and call `on_line` for every line received, for as long as
    /// the peer keeps the connection open.
    pub fn watch<F>(&self, on_line: F) -> Result<ReadLoop, SocketError>
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        let stream = self.connect()?;
        self.spawn_reader(stream, ReadMode::Line, on_line)
    }

    fn spawn_reader<F>(
        &self,
        stream: UnixStream,
        mode: ReadMode,
        on_frame: F,
    ) -> Result<ReadLoop, SocketError>
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        let id = self.cancel.register(&stream)?;
        let cancel = self.cancel.clone();
        let path = self.path.clone();
        let spawned = std::thread::Builder::new()
            .name("aria-socket-reader".into())
            .spawn(move || {
                let reader = BufReader::with_capacity(CHUNK_SIZE, stream);
                read_loop(reader, mode, &cancel, on_frame);
                cancel.release(id);
                debug!("reader for {} finished", path.display());
            });
        match spawned {
            Ok(handle) => Ok(ReadLoop { handle }),
            Err(e) => {
                self.cancel.release(id);
                Err(e.into())
            }
        }
    }
}

//  Tests
