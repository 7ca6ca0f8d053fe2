use anyhow::{anyhow, Context, Result};
use std::{fs, io::Write, path::Path};

/// Reads a file after verifying it is not a symlink and is within `max_bytes`.
///
/// Every untrusted input file the pipeline consumes (scanner output, policy
/// JSON) goes through this function rather than `fs::read` directly.
///
/// NOTE: narrow TOCTOU window between `symlink_metadata()` and `fs::read()`.
/// The check still catches accidental symlinks and raises the bar for
/// exploitation; closing it fully would require `O_NOFOLLOW`.
pub fn read_validated(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let meta = fs::symlink_metadata(path).with_context(|| format!("stat {}", path.display()))?;
    if meta.file_type().is_symlink() {
        return Err(anyhow!("Refusing to read symlink: {}", path.display()));
    }
    if meta.len() > max_bytes {
        return Err(anyhow!(
            "File too large: {} ({} bytes, max {max_bytes} bytes)",
            path.display(),
            meta.len(),
        ));
    }
    fs::read(path).with_context(|| format!("read {}", path.display()))
}

/// Creates `path` and writes `contents` in one shot, failing if the file
/// already exists. Artifact files are write-once; a pre-existing file means
/// a previous run's output would be silently clobbered.
pub fn write_once(path: &Path, contents: &[u8]) -> Result<()> {
    let mut f = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("create {} (artifact files are write-once)", path.display()))?;
    f.write_all(contents)
        .with_context(|| format!("write {}", path.display()))
}
