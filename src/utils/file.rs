//! Input and hashing helpers.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// Largest record file accepted by the CLI.
pub const MAX_INPUT_SIZE: u64 = 64 * 1024 * 1024;

/// Calculate SHA-256 checksum of content.
pub fn calculate_checksum(content: &str) -> String {
    let hash = Sha256::digest(content.as_bytes());
    hex::encode(hash)
}

/// Read from a file, or from stdin when the path is absent or `-`.
pub fn read_input(path: Option<&Path>) -> io::Result<String> {
    match path {
        Some(path) if path.as_os_str() != "-" => read_file_content(path, MAX_INPUT_SIZE),
        _ => read_limited(io::stdin().lock(), MAX_INPUT_SIZE),
    }
}

/// Read a stream to a string, failing once it exceeds `max_size` bytes.
pub fn read_limited<R: Read>(reader: R, max_size: u64) -> io::Result<String> {
    let mut input = String::new();
    reader.take(max_size.saturating_add(1)).read_to_string(&mut input)?;
    if input.len() as u64 > max_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("input exceeds maximum size: {} bytes", max_size),
        ));
    }
    Ok(input)
}

/// Read file content with size limit.
pub fn read_file_content(path: &Path, max_size: u64) -> io::Result<String> {
    let metadata = fs::metadata(path)?;

    if metadata.len() > max_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "file exceeds maximum size: {} > {}",
                metadata.len(),
                max_size
            ),
        ));
    }

    fs::read_to_string(path)
}
