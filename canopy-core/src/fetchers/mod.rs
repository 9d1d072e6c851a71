//! Built-in fetchers that need no cloud credentials.

mod filesystem;

pub use filesystem::{FileResource, FileSystemFetcher};
