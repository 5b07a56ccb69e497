//! Tarball extraction
//!
//! Unpacks `.tar.gz` release assets. A single top-level directory shared by
//! every entry is stripped so the content lands directly in the destination.

use crate::error::{RunnerError, RunnerResult};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

fn open(archive: &Path) -> RunnerResult<tar::Archive<GzDecoder<File>>> {
    Ok(tar::Archive::new(GzDecoder::new(File::open(archive)?)))
}

/// Reject absolute paths and `..` components
fn sanitize(path: &Path) -> RunnerResult<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(RunnerError::InvalidInput(format!(
                    "archive entry escapes the destination: {:?}",
                    path
                )));
            }
        }
    }
    Ok(clean)
}

/// Top-level directory shared by all entries, if there is exactly one
fn common_prefix(archive: &Path) -> RunnerResult<Option<PathBuf>> {
    let mut prefix: Option<PathBuf> = None;
    let mut has_nested = false;

    for entry in open(archive)?.entries()? {
        let entry = entry?;
        let path = sanitize(&entry.path()?)?;
        let mut components = path.components();
        let Some(first) = components.next() else {
            continue;
        };
        let first = PathBuf::from(first.as_os_str());

        if components.next().is_some() {
            has_nested = true;
        } else if !entry.header().entry_type().is_dir() {
            // A plain file at the top level
            return Ok(None);
        }

        match &prefix {
            Some(existing) if *existing != first => return Ok(None),
            Some(_) => {}
            None => prefix = Some(first),
        }
    }

    Ok(prefix.filter(|_| has_nested))
}

/// Extract `archive` into `dest_dir`, returning the number of files written
pub fn extract_tar_gz(archive: &Path, dest_dir: &Path) -> RunnerResult<usize> {
    fs::create_dir_all(dest_dir)?;

    let strip = common_prefix(archive)?;
    if let Some(prefix) = &strip {
        tracing::debug!(prefix = ?prefix, "Stripping top-level directory");
    }

    let mut files = 0;
    for entry in open(archive)?.entries()? {
        let mut entry = entry?;
        let path = sanitize(&entry.path()?)?;

        let relative = match &strip {
            Some(prefix) => match path.strip_prefix(prefix) {
                Ok(rest) => rest.to_path_buf(),
                Err(_) => path,
            },
            None => path,
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dest_dir.join(&relative);
        let kind = entry.header().entry_type();
        if kind.is_dir() {
            fs::create_dir_all(&target)?;
        } else if kind.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            entry.unpack(&target)?;
            files += 1;
        } else {
            tracing::debug!(entry = ?relative, "Skipping non-regular archive entry");
        }
    }

    Ok(files)
}
