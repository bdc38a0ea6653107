mod connect;
mod ring;

pub use connect::{accept_predecessor, dial, introduce, join_successor, welcome};
pub use ring::Ring;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// A ring whose links are TCP connections.
pub type TcpRing = Ring<OwnedReadHalf, OwnedWriteHalf>;
