// Public API for integration tests and embedding UIs

pub mod api;
pub mod clock;
pub mod config;
pub mod monitor;
pub mod protocol;
pub mod session;
pub mod types;
