mod client;
#[cfg(any(test, feature = "testing"))]
mod memory;
mod propfind;
mod transport;

pub use client::{WebDavClient, WebDavConnector};
#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryRemote;
pub use transport::{Connector, RemoteEntry, RemoteTransport, TransportError};
