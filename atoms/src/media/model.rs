use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{AtomError, Result};

pub const RESOLUTION_BUCKET: &str = "resolution-images";
pub const MAX_IMAGE_BYTES: usize = 2 * 1024 * 1024; // 2 MiB
pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

/// Creation options of a storage bucket; enforced by the storage layer on
/// every upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketPolicy {
    pub public: bool,
    pub file_size_limit: usize,
    pub allowed_mime_types: Vec<String>,
}

impl BucketPolicy {
    pub fn resolution_images() -> Self {
        Self {
            public: true,
            file_size_limit: MAX_IMAGE_BYTES,
            allowed_mime_types: ALLOWED_IMAGE_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn check(&self, file: &UploadFile) -> Result<()> {
        if file.bytes.len() > self.file_size_limit {
            return Err(AtomError::StoragePolicy(format!(
                "{} is {} bytes, limit is {} bytes",
                file.file_name,
                file.bytes.len(),
                self.file_size_limit
            )));
        }
        if !self
            .allowed_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&file.content_type))
        {
            return Err(AtomError::StoragePolicy(format!(
                "content type '{}' is not allowed",
                file.content_type
            )));
        }
        Ok(())
    }
}

/// A resolution image as received from the administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Lower-cased text after the last `.` of the file name, falling back to
    /// the MIME type when the name has none.
    pub fn extension(&self) -> String {
        if let Some((stem, ext)) = self.file_name.rsplit_once('.') {
            if !stem.is_empty() && !ext.is_empty() {
                return ext.to_ascii_lowercase();
            }
        }
        match self.content_type.to_ascii_lowercase().as_str() {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            _ => "bin",
        }
        .to_string()
    }
}

/// POST /complaints/{id}/image body; `data` is base64.
#[derive(Debug, Deserialize)]
pub struct UploadImagePayload {
    pub file_name: String,
    pub content_type: String,
    pub data: String,
}

impl UploadImagePayload {
    pub fn decode(self) -> Result<UploadFile> {
        let bytes = STANDARD
            .decode(self.data.trim())
            .map_err(|e| AtomError::Validation(format!("image data is not valid base64: {}", e)))?;
        Ok(UploadFile::new(self.file_name, self.content_type, bytes))
    }
}
