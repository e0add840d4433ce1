pub mod completion;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod server;
pub mod session;
