mod config;
mod repeated;
mod server;

pub use config::ServerConfig;
pub use repeated::{CallbackId, CallbackScheduler};
pub use server::Server;
