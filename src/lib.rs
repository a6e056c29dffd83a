// Kagemusha caching reverse proxy library

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod server;
