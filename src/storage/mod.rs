//! File storage for the file server.
//!
//! This module provides the naming and placement rules shared by every
//! upload path:
//! - Filename sanitization and identity-prefixed stored names
//! - Directory normalization and resolution under the upload root
//! - Directory listings that hide in-progress upload artifacts

mod files;
mod naming;

pub use files::{FileStorage, StoredFileInfo};
pub use naming::{
    is_upload_artifact, normalize_directory, original_name, sanitize_filename, stored_name,
    MAX_NAME_BYTES, META_SUFFIX, META_TMP_SUFFIX, TEMP_SUFFIX,
};
