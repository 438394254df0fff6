use std::path::{Path, PathBuf};

use crate::error::{Result, SiteError};

/// a summary of the local content tree that gets pushed to the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    pub root: PathBuf,
    pub files: usize,
    pub bytes: u64,
    /// adler32 over every relative path and file content, in sorted path order.
    pub checksum: u32,
}

impl AssetManifest {
    pub fn fingerprint_hex(&self) -> String {
        format!("{:08x}", self.checksum)
    }
}

/// follows symlinks the way `aws s3 sync` does. A link back into a
/// directory that is already being walked is skipped.
fn iter_files_recursively(
    start_dir: &Path,
    visited: &mut Vec<PathBuf>,
    callback: &mut impl FnMut(PathBuf) -> Result<()>,
) -> Result<()> {
    let real = std::fs::canonicalize(start_dir).map_err(|e| SiteError::io(start_dir, e))?;
    if visited.contains(&real) {
        tracing::warn!(path = ?start_dir, "skipping symlink loop in asset directory");
        return Ok(());
    }
    visited.push(real);
    let readdir = std::fs::read_dir(start_dir).map_err(|e| SiteError::io(start_dir, e))?;
    for entry in readdir {
        let direntry = entry.map_err(|e| SiteError::io(start_dir, e))?;
        let path = direntry.path();
        let meta = std::fs::metadata(&path)
            .map_err(|e| SiteError::Assets(format!("Cannot read {:?}: {}", path, e)))?;
        if meta.is_dir() {
            iter_files_recursively(&path, visited, callback)?;
        } else {
            callback(path)?;
        }
    }
    visited.pop();
    Ok(())
}

/// the relative path with forward slashes, so the checksum doesn't
/// change between platforms.
fn relative_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn fingerprint<P: AsRef<Path>>(dir: P) -> Result<AssetManifest> {
    let root = dir.as_ref();
    if !root.exists() {
        return Err(SiteError::Assets(format!("Asset directory {:?} does not exist", root)));
    }
    if !root.is_dir() {
        return Err(SiteError::Assets(format!("Asset path {:?} is not a directory", root)));
    }
    let mut files = vec![];
    iter_files_recursively(root, &mut vec![], &mut |p| {
        files.push(p);
        Ok(())
    })?;
    let mut keyed: Vec<(String, PathBuf)> = files
        .into_iter()
        .map(|p| (relative_key(root, &p), p))
        .collect();
    keyed.sort();

    let mut hasher = adler::Adler32::new();
    let mut bytes = 0u64;
    for (key, path) in &keyed {
        let contents = std::fs::read(path).map_err(|e| SiteError::io(path, e))?;
        hasher.write_slice(key.as_bytes());
        hasher.write_slice(&[0]);
        hasher.write_slice(&contents);
        bytes += contents.len() as u64;
    }
    let manifest = AssetManifest {
        root: root.to_path_buf(),
        files: keyed.len(),
        bytes,
        checksum: hasher.checksum(),
    };
    tracing::debug!(
        root = ?manifest.root,
        files = manifest.files,
        bytes = manifest.bytes,
        "fingerprinted assets"
    );
    Ok(manifest)
}
