//! Data models for the file-storage service.
//!
//! - Auth wire types: `LoginRequest`, `RegisterRequest`, `AuthResponse`,
//!   `RefreshRequest`, `RefreshResponse`, `User`
//! - File types: `FileItem`, `FileUploadResponse`, `DownloadedFile`

pub mod auth;
pub mod file;

pub use auth::{AuthResponse, LoginRequest, RefreshRequest, RefreshResponse, RegisterRequest, User};
pub use file::{DownloadedFile, FileItem, FileUploadResponse};
