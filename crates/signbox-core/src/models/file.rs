use serde::{Deserialize, Serialize};

use crate::utils::format_size;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileItem {
    #[serde(alias = "_id")]
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub is_signed: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl FileItem {
    /// Name the user uploaded the file under, falling back to the stored name
    pub fn display_name(&self) -> &str {
        self.original_name.as_deref().unwrap_or(&self.filename)
    }

    pub fn display_size(&self) -> String {
        match self.size {
            Some(bytes) => format_size(bytes),
            None => "-".to_string(),
        }
    }

    pub fn signed_label(&self) -> &'static str {
        if self.is_signed {
            "signed"
        } else {
            "unsigned"
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUploadResponse {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    pub filename: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub is_signed: bool,
}

/// Bytes of a downloaded file plus the name to save it under.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}
