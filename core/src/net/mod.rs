//! Network endpoints: the listening socket a bridge owns and the
//! transport capability its client connection is driven through.

mod listener;
mod transport;

pub use listener::{accept_tcp, bind_tcp, Accepted, Listener, PlainListener};
pub use transport::{wait_ready, PlainTransport, Received, Transport, SEND_TIMEOUT};
