//! SHA-256 records kept next to downloaded weights
//!
//! `<weights>.chk` holds one line in sha256sum format:
//! `<hex-digest>  <file-name>`.

use crate::error::RunnerResult;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// Path of the checksum record for a file
pub fn record_path(file: &Path) -> PathBuf {
    let mut name = file.file_name().unwrap_or_default().to_os_string();
    name.push(".chk");
    file.with_file_name(name)
}

/// Lowercase hex of the digest accumulated in `hasher`
pub fn hex_digest(hasher: Sha256) -> String {
    format!("{:x}", hasher.finalize())
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Feed the contents of `path` into `hasher`, returning the bytes read
pub async fn hash_file_into(hasher: &mut Sha256, path: &Path) -> RunnerResult<u64> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; 1 << 20];
    let mut total = 0;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok(total)
}

/// Compute the SHA-256 of a file
pub async fn sha256_file(path: &Path) -> RunnerResult<String> {
    let mut hasher = Sha256::new();
    hash_file_into(&mut hasher, path).await?;
    Ok(hex_digest(hasher))
}

/// Read the digest stored for `file`, if a well-formed record exists
pub async fn read_record(file: &Path) -> Option<String> {
    let content = tokio::fs::read_to_string(record_path(file)).await.ok()?;
    let digest = content.split_whitespace().next()?.to_lowercase();
    is_sha256_hex(&digest).then_some(digest)
}

/// Store the digest of `file`
pub async fn write_record(file: &Path, digest: &str) -> RunnerResult<()> {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tokio::fs::write(record_path(file), format!("{}  {}\n", digest, name)).await?;
    Ok(())
}
