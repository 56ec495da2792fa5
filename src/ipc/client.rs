//! Client side of the command socket, used by `aria-msg`.

use crate::socket::{is_socket, read_frame, ReadMode, SocketError};
use log::debug;
use std::io::{BufReader, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Unreachable(#[from] SocketError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed without a response")]
    NoResponse,
}

/// `true` for the two failure shapes the registry produces.
pub fn is_error_response(response: &str) -> bool {
    response.starts_with("ERROR:") || response.starts_with("Unknown command:")
}

/// Send one command line to the server at `path` and return its answer.
pub fn send_command(path: &Path, line: &str) -> Result<String, ClientError> {
    if !is_socket(path) {
        return Err(SocketError::NotASocket(path.to_path_buf()).into());
    }
    let mut stream = UnixStream::connect(path).map_err(|source| SocketError::Connect {
        path: PathBuf::from(path),
        source,
    })?;
    debug!("sending {:?} to {}", line, path.display());
    stream.write_all(line.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    stream.shutdown(Shutdown::Write)?;

    let mut reader = BufReader::new(stream);
    let frame = read_frame(&mut reader, ReadMode::Line)?.ok_or(ClientError::NoResponse)?;
    Ok(String::from_utf8_lossy(&frame).into_owned())
}
