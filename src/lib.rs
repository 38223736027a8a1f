pub mod blog;
pub mod content;
pub mod database;
pub mod error;
pub mod ingest;
pub mod media;
pub mod utils;

pub use blog::Blog;
pub use error::{BlogError, Result};
