//! Transfer-queue builder for releases on remote listing services.
//!
//! The core pipeline takes a raw remote listing and a per-site rule chain
//! and produces a deterministic transfer queue: classification, optional
//! merging with already-downloaded copies, priority-ranked deduplication,
//! and an existence guard. Queues serialize either to a transfer script for
//! the listing client or to JSON for inspection and post-commands.

pub mod config;
pub mod logging;
pub mod parser;
pub mod queue;
pub mod template;
pub mod transport;

pub use config::Config;
pub use queue::{Item, Queue};
pub use transport::{LftpClient, RemoteEntry};

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
