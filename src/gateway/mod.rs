// Privacy Guard — Gateway Module
//
// Binary RPC over Unix domain sockets: the length-prefixed wire codec, the
// blocking client transport, the server-side dispatch table and the
// listening server.

mod caller;
mod codec;
mod dispatch;
mod transport;
mod uds;

pub use caller::PeerInfo;
pub use codec::{CodecError, Shape, Value, MAX_FRAME_SIZE};
pub use dispatch::{Connection, Handler, ServiceRegistry};
pub use transport::{SocketTransport, TransportError, TransportState};
pub use uds::{ConnectionGuard, ConnectionRegistry, UdsServer, DEFAULT_SOCKET_PATH};
