pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod history;
pub mod pipeline;
pub mod protocol;
pub mod retry;
pub mod server;
pub mod service;
pub mod transport;

#[cfg(test)]
mod tests;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5005;
pub const DEFAULT_ADDRESS: &str = const_format::concatcp!(DEFAULT_HOST, ":", DEFAULT_PORT);
