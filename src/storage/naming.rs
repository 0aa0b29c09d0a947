//! Stored-file naming conventions.
//!
//! Both single-request uploads and completed chunked uploads end up under
//! a name of the form `{uuid}_{sanitized original name}`, so the two are
//! indistinguishable in a directory listing.

use uuid::Uuid;

use crate::{FileServerError, Result};

/// Suffix of an in-progress chunked upload's data file.
pub const TEMP_SUFFIX: &str = ".temp";

/// Suffix of an in-progress chunked upload's sidecar record.
pub const META_SUFFIX: &str = ".meta";

/// Suffix of a sidecar record that is being rewritten.
pub const META_TMP_SUFFIX: &str = ".meta.tmp";

/// Longest sanitized name in bytes. A `{uuid}_` prefix plus the longest
/// artifact suffix must still fit in a 255-byte file name.
pub const MAX_NAME_BYTES: usize = 255 - 37 - META_TMP_SUFFIX.len();

/// Extensions longer than this are not preserved when shortening a name.
const MAX_EXTENSION_BYTES: usize = 16;

/// Reduce an untrusted filename to a single safe path component.
///
/// Only the last component of the name is kept, traversal sequences and
/// separators are replaced with `_` and control characters are dropped.
/// Names longer than [`MAX_NAME_BYTES`] are shortened on a character
/// boundary, keeping the extension. Returns an empty string when nothing
/// usable remains.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    if base.is_empty() || base == "." || base == ".." {
        return String::new();
    }

    let cleaned: String = base
        .replace("..", "_")
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    truncate_name(cleaned)
}

fn truncate_name(name: String) -> String {
    if name.len() <= MAX_NAME_BYTES {
        return name;
    }

    let (stem, extension) = match name.rfind('.') {
        Some(i) if i > 0 && name.len() - i <= MAX_EXTENSION_BYTES => name.split_at(i),
        _ => (name.as_str(), ""),
    };
    let mut end = MAX_NAME_BYTES - extension.len();
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &stem[..end], extension)
}

/// Generate a collision-resistant stored name for an uploaded file.
pub fn stored_name(original: &str) -> String {
    format!("{}_{}", Uuid::new_v4(), sanitize_filename(original))
}

/// Recover the original filename from a stored name.
///
/// Names without an identity prefix are returned unchanged.
pub fn original_name(stored: &str) -> &str {
    stored.split_once('_').map_or(stored, |(_, rest)| rest)
}

/// Normalize a client-supplied directory into a relative `a/b` form.
///
/// Empty and `.` components are dropped; `..` components, absolute paths
/// and names that normalize to nothing are rejected.
pub fn normalize_directory(directory: &str) -> Result<String> {
    let directory = directory.trim().replace('\\', "/");
    if directory.starts_with('/') {
        return Err(FileServerError::Validation(format!(
            "directory must be relative: {directory}"
        )));
    }

    let mut parts = Vec::new();
    for part in directory.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(FileServerError::Validation(format!(
                    "directory must not contain '..': {directory}"
                )))
            }
            p if p.chars().any(char::is_control) => {
                return Err(FileServerError::Validation(
                    "directory contains control characters".to_string(),
                ))
            }
            p => parts.push(p),
        }
    }

    if parts.is_empty() {
        return Err(FileServerError::Validation("directory is empty".to_string()));
    }

    Ok(parts.join("/"))
}

/// Whether a file name belongs to an in-progress chunked upload.
pub fn is_upload_artifact(name: &str) -> bool {
    name.ends_with(TEMP_SUFFIX) || name.ends_with(META_SUFFIX) || name.ends_with(META_TMP_SUFFIX)
}
