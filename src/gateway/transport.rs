// Privacy Guard — Client Transport
//
// Blocking request/response transport over a Unix domain stream socket.
// A transport carries at most one call per connection: connect, call once,
// disconnect. The interface and method names travel as the first two string
// frames, followed by the arguments; the reply is read shape by shape.

use std::io::{BufReader, BufWriter, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::error::ResultCode;

use super::codec::{CodecError, Shape, Value};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid transport state: {0}")]
    InvalidState(&'static str),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub fn code(&self) -> ResultCode {
        match self {
            Self::InvalidState(_) => ResultCode::InvalidState,
            Self::Connect { .. } | Self::Codec(_) | Self::Io(_) => ResultCode::IpcError,
        }
    }

    /// True when no daemon could be reached at all.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Connected,
    Called,
}

/// One client-side connection to an RPC interface.
pub struct SocketTransport {
    path: PathBuf,
    interface: String,
    timeout: Option<Duration>,
    stream: Option<UnixStream>,
    state: TransportState,
}

impl SocketTransport {
    pub fn new(path: impl Into<PathBuf>, interface: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            interface: interface.into(),
            timeout: None,
            stream: None,
            state: TransportState::Idle,
        }
    }

    /// Apply read/write timeouts to every connection opened afterwards.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn connect(&mut self) -> Result<(), TransportError> {
        if self.state != TransportState::Idle {
            return Err(TransportError::InvalidState("already connected"));
        }
        let stream = UnixStream::connect(&self.path).map_err(|source| TransportError::Connect {
            path: self.path.clone(),
            source,
        })?;
        if let Some(timeout) = self.timeout {
            stream.set_read_timeout(Some(timeout))?;
            stream.set_write_timeout(Some(timeout))?;
        }
        self.stream = Some(stream);
        self.state = TransportState::Connected;
        Ok(())
    }

    /// Send `method` with `inputs` and read back one value per output shape.
    ///
    /// Only one call is permitted per connection. The connection is marked
    /// used before any bytes are written, so a failed call cannot be retried
    /// on the same socket either.
    pub fn call(
        &mut self,
        method: &str,
        inputs: &[Value],
        outputs: &[Shape],
    ) -> Result<Vec<Value>, TransportError> {
        match self.state {
            TransportState::Idle => return Err(TransportError::InvalidState("not connected")),
            TransportState::Called => {
                return Err(TransportError::InvalidState(
                    "a call was already made on this connection",
                ))
            }
            TransportState::Connected => {}
        }
        self.state = TransportState::Called;

        let stream = self
            .stream
            .as_ref()
            .ok_or(TransportError::InvalidState("socket released"))?;

        {
            let mut writer = BufWriter::new(stream);
            Value::from(self.interface.as_str()).encode(&mut writer)?;
            Value::from(method).encode(&mut writer)?;
            for input in inputs {
                input.encode(&mut writer)?;
            }
            writer.flush()?;
        }

        let mut reader = BufReader::new(stream);
        let mut results = Vec::with_capacity(outputs.len());
        for shape in outputs {
            results.push(Value::decode(shape, &mut reader)?);
        }
        Ok(results)
    }

    /// Release the socket. Safe to call in any state, any number of times.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.state = TransportState::Idle;
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
