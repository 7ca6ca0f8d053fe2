//! Artifact integrity: streaming SHA-2 digests, checksum sidecars, and the
//! artifact-directory manifest embedded in the certificate.
//!
//! Two digests are produced per exported archive (SHA-256 and SHA-512) so
//! consumers can verify integrity with either algorithm by simple equality
//! comparison. Sidecar files use the coreutils `<digest>  <filename>` format
//! and are accepted by `sha256sum -c` / `sha512sum -c` directly.

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256, Sha512};
use std::{fs, io::Read, path::Path};
use walkdir::WalkDir;

use crate::{config, fs_guard};

/// Maximum size of a single hashed artifact (the compressed image export).
const MAX_ARTIFACT_BYTES: u64 = 2 * 1024 * 1024 * 1024; // 2GB
/// Caps for the artifact-directory manifest walk.
const MAX_MANIFEST_FILES: usize = 1_000;

/// Both digests of one artifact file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDigests {
    pub sha256: String,
    pub sha512: String,
    pub bytes: u64,
}

fn digest_file<D: Digest>(path: &Path, max_size: u64) -> Result<(String, u64)> {
    let meta = fs::symlink_metadata(path).with_context(|| format!("stat {}", path.display()))?;
    if meta.file_type().is_symlink() {
        return Err(anyhow!("Refusing to hash symlink: {}", path.display()));
    }
    let len = meta.len();
    if len > max_size {
        return Err(anyhow!(
            "Artifact too large: {} ({len} bytes, max {max_size} bytes)",
            path.display()
        ));
    }

    let mut f = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut h = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        h.update(&buf[..n]);
    }
    Ok((hex::encode(h.finalize()), len))
}

/// Computes both digests of `path`.
pub fn digest_artifact(path: &Path) -> Result<ArtifactDigests> {
    let (sha256, bytes) = digest_file::<Sha256>(path, MAX_ARTIFACT_BYTES)?;
    let (sha512, _) = digest_file::<Sha512>(path, MAX_ARTIFACT_BYTES)?;
    Ok(ArtifactDigests {
        sha256,
        sha512,
        bytes,
    })
}

/// Computes both digests of `artifact` and writes the two sidecar files
/// next to it. Sidecars are write-once like every artifact.
pub fn write_sidecars(artifact: &Path) -> Result<ArtifactDigests> {
    let digests = digest_artifact(artifact)?;
    let name = artifact
        .file_name()
        .ok_or_else(|| anyhow!("Artifact has no file name: {}", artifact.display()))?
        .to_string_lossy();

    fs_guard::write_once(
        &config::sidecar_path(artifact, "sha256"),
        format!("{}  {}\n", digests.sha256, name).as_bytes(),
    )?;
    fs_guard::write_once(
        &config::sidecar_path(artifact, "sha512"),
        format!("{}  {}\n", digests.sha512, name).as_bytes(),
    )?;
    Ok(digests)
}

/// One file in the artifact-directory manifest.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// Walks `dir` and produces a sorted per-file digest listing for the
/// certificate. Symlinks are refused; the walk is bounded so a polluted
/// output directory cannot stall the pipeline.
pub fn manifest_dir(dir: &Path) -> Result<Vec<ManifestEntry>> {
    let mut files = Vec::new();
    for e in WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(std::result::Result::ok)
    {
        if !e.file_type().is_file() {
            continue;
        }
        let meta = fs::symlink_metadata(e.path())?;
        if meta.file_type().is_symlink() {
            return Err(anyhow!(
                "Refusing to include symlink in manifest: {}",
                e.path().display()
            ));
        }
        if files.len() >= MAX_MANIFEST_FILES {
            return Err(anyhow!(
                "Too many files in artifact directory (max {MAX_MANIFEST_FILES})"
            ));
        }
        files.push(e.path().to_path_buf());
    }
    files.sort();

    let mut entries = Vec::new();
    for p in &files {
        let (sha256, bytes) = digest_file::<Sha256>(p, MAX_ARTIFACT_BYTES)?;
        let relative = p.strip_prefix(dir).with_context(|| {
            format!("{} should be under {}", p.display(), dir.display())
        })?;
        entries.push(ManifestEntry {
            path: relative.display().to_string(),
            sha256,
            bytes,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_digest_artifact_lengths_and_size() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("app.tar.gz");
        fs::write(&p, b"archive bytes").unwrap();

        let d = digest_artifact(&p).unwrap();
        assert_eq!(d.sha256.len(), 64);
        assert_eq!(d.sha512.len(), 128);
        assert_eq!(d.bytes, 13);
    }

    #[test]
    fn test_digest_artifact_deterministic() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("app.tar.gz");
        fs::write(&p, b"same content").unwrap();
        assert_eq!(digest_artifact(&p).unwrap(), digest_artifact(&p).unwrap());
    }

    #[test]
    fn test_write_sidecars_coreutils_format() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("app-latest.tar.gz");
        fs::write(&p, b"archive").unwrap();

        let d = write_sidecars(&p).unwrap();
        let sha256_line =
            fs::read_to_string(config::sidecar_path(&p, "sha256")).unwrap();
        let sha512_line =
            fs::read_to_string(config::sidecar_path(&p, "sha512")).unwrap();
        assert_eq!(sha256_line, format!("{}  app-latest.tar.gz\n", d.sha256));
        assert_eq!(sha512_line, format!("{}  app-latest.tar.gz\n", d.sha512));
    }

    #[test]
    fn test_write_sidecars_is_write_once() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("app.tar.gz");
        fs::write(&p, b"archive").unwrap();
        write_sidecars(&p).unwrap();
        assert!(write_sidecars(&p).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_digest_refuses_symlink() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real.tar.gz");
        fs::write(&real, b"x").unwrap();
        let link = dir.path().join("link.tar.gz");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        assert!(digest_artifact(&link).is_err());
    }

    #[test]
    fn test_manifest_dir_sorted_relative_paths() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.log"), b"bb").unwrap();
        fs::write(dir.path().join("a.json"), b"a").unwrap();

        let entries = manifest_dir(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "a.json");
        assert_eq!(entries[1].path, "b.log");
        assert_eq!(entries[0].bytes, 1);
        assert_eq!(entries[0].sha256.len(), 64);
    }

    #[test]
    fn test_manifest_dir_empty() {
        let dir = TempDir::new().unwrap();
        assert!(manifest_dir(dir.path()).unwrap().is_empty());
    }
}
