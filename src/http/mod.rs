//! HTTP server plumbing: startup, graceful shutdown and static files.
//!
//! TLS is left to a fronting reverse proxy; the server speaks plain HTTP.

mod server;
mod shutdown;
pub mod static_files;

pub use server::{start_server, ServerError};
pub use shutdown::shutdown_signal;
