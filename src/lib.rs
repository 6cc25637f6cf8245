//! A Redis command-line client: RESP reply decoding, `redis-cli` compatible rendering and a
//! single connection session with AUTH, SELECT, repeat and SCAN support.

pub mod codec;
pub mod config;
pub mod connection;
pub mod format;
pub mod frame;
pub mod session;
pub mod tls;

pub use config::{Config, OutputMode, Target, TlsConfig};
pub use frame::Frame;
pub use session::Session;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
