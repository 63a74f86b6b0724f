//! Line-delimited JSON between the monitor and its page contexts.

pub mod client;
mod framing;
pub mod protocol;
pub mod server;

pub use client::{IpcClient, IpcReader, IpcWriter};
pub use protocol::{ClientMessage, PROTOCOL_VERSION, ServerMessage};
pub use server::{IpcConnection, IpcServer, PeerReplies, PeerRequest, PeerRequests};
