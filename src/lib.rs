//! OneWiki - a file-backed wiki server
//!
//! Every URL path maps to a file or directory under the data root. GET
//! serves or renders it, POST writes or deletes it, and editing sits behind
//! HTTP Digest authentication.

pub mod auth;
pub mod config;
pub mod http;
pub mod server;
pub mod wiki;
