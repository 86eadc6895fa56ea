//! Gateway server implementation

mod router;
pub mod rpc;
mod server;
mod stdio_front;
pub mod streaming;

pub use server::Gateway;
pub use streaming::{NotificationMultiplexer, TaggedNotification};
