//! Chat delivery: the transport seam, a Slack Web API client, an in-memory
//! transport, and the retrying sender the engine delivers through.

pub mod memory;
pub mod retry;
pub mod sender;
pub mod slack;
pub mod transport;

pub use sender::ResilientSender;
pub use transport::ChatTransport;
