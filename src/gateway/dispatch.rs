// Privacy Guard — Request Dispatch
//
// Server-side connection wrapper and the two-level registration table
// (interface name → method name → handler). A handler receives the raw
// connection, reads its own arguments and writes its own results.

use std::collections::HashMap;
use std::io::{BufReader, BufWriter, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use crate::error::{GuardError, ResultCode};

use super::caller::PeerInfo;
use super::codec::{CodecError, Shape, Value};

/// One accepted connection, as seen by a method handler.
pub struct Connection {
    reader: BufReader<UnixStream>,
    writer: BufWriter<UnixStream>,
    peer: Option<PeerInfo>,
}

impl Connection {
    pub fn new(stream: UnixStream, peer: Option<PeerInfo>) -> std::io::Result<Self> {
        let writer = BufWriter::new(stream.try_clone()?);
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            peer,
        })
    }

    pub fn peer(&self) -> Option<&PeerInfo> {
        self.peer.as_ref()
    }

    pub fn read(&mut self, shape: &Shape) -> Result<Value, CodecError> {
        Value::decode(shape, &mut self.reader)
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.read(&Shape::I32)?.into_i32()
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        self.read(&Shape::Bool)?.into_bool()
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        self.read(&Shape::Str)?.into_string()
    }

    /// Write a reply and flush it to the socket.
    pub fn write(&mut self, values: &[Value]) -> Result<(), CodecError> {
        for value in values {
            value.encode(&mut self.writer)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Close both directions. Errors are ignored; the peer may already be gone.
    pub fn close(mut self) {
        let _ = self.writer.flush();
        let _ = self.reader.get_ref().shutdown(std::net::Shutdown::Both);
    }
}

/// A registered method.
pub type Handler = Arc<dyn Fn(&mut Connection) -> Result<(), CodecError> + Send + Sync>;

/// Interface → method → handler table.
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    services: HashMap<String, HashMap<String, Handler>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `interface`/`method`. Re-registering a name
    /// replaces the previous handler.
    pub fn register<F>(&mut self, interface: &str, method: &str, handler: F) -> Result<(), GuardError>
    where
        F: Fn(&mut Connection) -> Result<(), CodecError> + Send + Sync + 'static,
    {
        if interface.is_empty() || method.is_empty() {
            return Err(GuardError::InvalidParameter(
                "interface and method names must not be empty".to_string(),
            ));
        }
        self.services
            .entry(interface.to_string())
            .or_default()
            .insert(method.to_string(), Arc::new(handler));
        tracing::debug!(interface, method, "Registered method");
        Ok(())
    }

    pub fn lookup(&self, interface: &str, method: &str) -> Option<Handler> {
        self.services.get(interface)?.get(method).cloned()
    }

    pub fn method_count(&self) -> usize {
        self.services.values().map(HashMap::len).sum()
    }

    /// Read the interface and method names from `conn` and run the handler.
    /// Unknown names are answered with a single `NoData` result code.
    pub fn dispatch(&self, conn: &mut Connection) -> Result<(), CodecError> {
        let interface = conn.read_string()?;
        let method = conn.read_string()?;

        match self.lookup(&interface, &method) {
            Some(handler) => {
                tracing::debug!(%interface, %method, "Dispatching request");
                handler(conn)
            }
            None => {
                tracing::warn!(%interface, %method, "No such method");
                conn.write(&[Value::I32(ResultCode::NoData.as_i32())])
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
