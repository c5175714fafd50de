//! The wiki itself: path resolution, views and request routing over a data
//! root that mirrors the URL space.

pub mod error;
pub mod handler;
pub mod path;
pub mod template;

pub use error::WikiError;
pub use handler::Wiki;
pub use path::{EntryKind, PathResolver, RequestPath};
