//! Artifact checksum computation and comparison.
//!
//! SHA-256 is the fixed content-hash algorithm; a release is skipped
//! when the freshly computed digest equals the one recorded in the
//! latest published manifest.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of a file as lowercase hex.
pub fn sha256sum<P: AsRef<Path>>(path: P) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();

    let mut buffer = [0u8; 65536];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether the computed digest matches the latest published one.
///
/// An absent or empty recorded digest never matches, so a repository
/// with no release history always proceeds to publish.
pub fn matches_latest(computed: &str, latest: Option<&str>) -> bool {
    matches!(latest, Some(known) if !known.is_empty() && known == computed)
}
