use std::path::PathBuf;
use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlogError>;

#[derive(Debug, Error)]
pub enum BlogError {
    /// Rejected input. Reported to the caller against a single field.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("managed image directory does not exist: {0:?}")]
    MissingMediaDir(PathBuf),

    #[error("upload is not an image ({0})")]
    NotAnImage(String),

    /// A stored upload failed to downsample and has been removed again.
    #[error("image {name} could not be processed: {source}")]
    Unprocessable {
        name: String,
        #[source]
        source: Box<BlogError>,
    },

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl BlogError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BlogError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        BlogError::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, BlogError::Validation { .. })
    }
}

impl From<rusqlite::Error> for BlogError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, Some(msg)) = &err {
            if code.code == ErrorCode::ConstraintViolation {
                if let Some(column) = unique_column(msg) {
                    return BlogError::validation(column, "is already in use");
                }
            }
        }
        BlogError::Database(err)
    }
}

// "UNIQUE constraint failed: posts.slug" -> "slug"
fn unique_column(msg: &str) -> Option<String> {
    let cols = msg.strip_prefix("UNIQUE constraint failed: ")?;
    let first = cols.split(',').next()?.trim();
    let column = first.rsplit('.').next()?;
    Some(column.to_string())
}
