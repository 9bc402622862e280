//! Linked Data Platform view of a directory tree.
//!
//! A request travels [`path::PathResolver`] → [`adapter::ProtocolAdapter`] →
//! [`filter::ResponseFilter`]. Only the adapter touches the filesystem.

pub mod adapter;
pub mod filter;
pub mod path;
pub mod turtle;

pub use adapter::ProtocolAdapter;
pub use filter::ResponseFilter;
pub use path::{PathResolver, ResolvedPath};
