//! Positional chunk writes into the temporary upload file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Writes chunk bytes at their offsets in a temporary file.
///
/// Chunks may arrive in any order; writing past the current end of the
/// file extends it, leaving a gap that a later chunk fills.
pub struct ChunkWriter<'a> {
    path: &'a Path,
}

impl<'a> ChunkWriter<'a> {
    /// Create a writer for the given temporary file.
    pub fn new(path: &'a Path) -> Self {
        Self { path }
    }

    /// Create an empty temporary file, creating parent directories as needed.
    pub fn create(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(self.path)?;
        Ok(())
    }

    /// Write `data` starting at `offset`.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).open(self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }
}

/// Compute the hex-encoded SHA-256 of a file.
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
