//! Room networking: wire codec, connection lifecycle, reconnection policy

pub mod backoff;
pub mod connector;
pub mod protocol;
pub mod transport;

pub use backoff::{Backoff, ReconnectConfig};
pub use connector::{Connector, Link, WsConnector};
pub use protocol::{ClientMsg, ProtocolError, ServerMsg};
pub use transport::{ConnectionState, RoomTransport, TransportError};
