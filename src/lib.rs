//! ponymail-view: a server-rendered thread viewer for Pony Mail archives.
//!
//! Fetches threads and emails from a Pony Mail backend, rebuilds the reply
//! tree, segments every body into quotes, diffs, links and trailers, and
//! renders the result as HTML.

pub mod api;
pub mod config;
pub mod error;
pub mod fixup;
pub mod http;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod templates;
pub mod thread;
pub mod view;
