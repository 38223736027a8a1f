use serde::Serialize;
use tracing::{info, warn};

use crate::error::{BlogError, Result};
use crate::media::mimetype;
use crate::media::normalizer::{normalize_in_place, Normalized};
use crate::media::storage::FileStorage;

/// Body returned to the rich-text editor after an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub uploaded: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UploadFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    pub message: String,
}

impl UploadResponse {
    pub fn success(url: String, file_name: String) -> Self {
        Self {
            uploaded: 1,
            url: Some(url),
            file_name: Some(file_name),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            uploaded: 0,
            url: None,
            file_name: None,
            error: Some(UploadFailure { message: message.into() }),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"uploaded":0}"#.to_string())
    }
}

/// Stores `data` under `dir` and downsamples it if it is too large.
/// Returns the stored name. Non-images never reach the disk; an image that
/// fails to re-encode is removed again and reported as
/// [`BlogError::Unprocessable`].
pub fn store_image(storage: &FileStorage, dir: &str, file_name: &str, data: &[u8]) -> Result<String> {
    if !mimetype::is_image(data) {
        return Err(BlogError::NotAnImage(mimetype::detect_mimetype(data)));
    }

    let name = storage.save(dir, file_name, data)?;
    let outcome = normalize_in_place(&storage.path(&name)?).map_err(|e| BlogError::Unprocessable {
        name: name.clone(),
        source: Box::new(e),
    })?;
    match outcome {
        Normalized::Untouched { bytes } => info!("Stored image {} ({} bytes)", name, bytes),
        Normalized::Rewritten { after, width, height, .. } => {
            info!("Stored image {} ({} bytes, {}x{})", name, after, width, height)
        }
    }
    Ok(name)
}

/// Editor upload endpoint. Never fails; problems are reported in the body.
pub fn handle_editor_upload(storage: &FileStorage, dir: &str, file_name: &str, data: &[u8]) -> UploadResponse {
    match store_image(storage, dir, file_name, data) {
        Ok(name) => {
            let base = name.rsplit('/').next().unwrap_or(&name).to_string();
            UploadResponse::success(storage.url(&name), base)
        }
        Err(e) => {
            warn!("Upload of {:?} failed: {}", file_name, e);
            UploadResponse::failure(e.to_string())
        }
    }
}
