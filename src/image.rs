//! Container image builder integration: build, export, and removal.
//!
//! The builder (`docker`) is an opaque external tool. Commands are executed
//! via `std::process::Command` -- no shell is invoked. The full builder
//! transcript is captured and written once to `build.log` on success; on
//! failure the stderr tail is surfaced and no artifacts are produced.

use anyhow::{anyhow, Context, Result};
use std::{
    path::Path,
    process::Command,
};

use crate::fs_guard;

/// Builder binary probed by `toolcheck` and invoked here.
pub const BUILDER_BIN: &str = "docker";
/// Compression binary used for the exported archive.
pub const GZIP_BIN: &str = "gzip";

/// Builds `image_ref` from `containerfile`, writing the builder transcript
/// to `log_path`. A non-zero builder exit is fatal and writes no log.
pub fn build_image(containerfile: &Path, image_ref: &str, log_path: &Path) -> Result<()> {
    build_with(BUILDER_BIN, containerfile, image_ref, log_path)
}

fn build_with(bin: &str, containerfile: &Path, image_ref: &str, log_path: &Path) -> Result<()> {
    let out = Command::new(bin)
        .arg("build")
        .arg("-f")
        .arg(containerfile)
        .args(["-t", image_ref, "."])
        .output()
        .with_context(|| format!("running {bin} build"))?;

    if !out.status.success() {
        // Surface the tail of stderr so the failure is diagnosable without
        // a log file (none is written for failed builds).
        let stderr = String::from_utf8_lossy(&out.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(20)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("\n");
        eprintln!("{tail}");
        return Err(anyhow!(
            "Image build failed with exit code {}",
            out.status.code().unwrap_or(-1)
        ));
    }

    let mut transcript = out.stdout;
    transcript.extend_from_slice(&out.stderr);
    fs_guard::write_once(log_path, &transcript)?;
    Ok(())
}

/// Exports `image_ref` to `tar_path` and compresses it in place, producing
/// `<tar_path>.gz`. The uncompressed tar is consumed by the compressor.
pub fn export_image(image_ref: &str, tar_path: &Path) -> Result<()> {
    export_with(BUILDER_BIN, GZIP_BIN, image_ref, tar_path)
}

fn export_with(builder: &str, gzip: &str, image_ref: &str, tar_path: &Path) -> Result<()> {
    let out = Command::new(builder)
        .arg("save")
        .arg("-o")
        .arg(tar_path)
        .arg(image_ref)
        .output()
        .with_context(|| format!("running {builder} save"))?;
    if !out.status.success() {
        return Err(anyhow!(
            "Image export failed with exit code {}",
            out.status.code().unwrap_or(-1)
        ));
    }
    if !tar_path.exists() {
        return Err(anyhow!(
            "Exporter reported success but {} was not created",
            tar_path.display()
        ));
    }

    // gzip without -f: refuses to clobber an existing .gz, which keeps the
    // archive write-once like every other artifact.
    let out = Command::new(gzip)
        .arg(tar_path)
        .output()
        .with_context(|| format!("running {gzip}"))?;
    if !out.status.success() {
        return Err(anyhow!(
            "Compression failed with exit code {}",
            out.status.code().unwrap_or(-1)
        ));
    }

    let gz_path = gz_sibling(tar_path);
    if !gz_path.exists() {
        return Err(anyhow!(
            "Compressor reported success but {} was not created",
            gz_path.display()
        ));
    }
    Ok(())
}

/// `foo.tar` -> `foo.tar.gz`, matching what the compressor produces.
pub fn gz_sibling(tar_path: &Path) -> std::path::PathBuf {
    let mut name = tar_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".gz");
    tar_path.with_file_name(name)
}

/// Removes `image_ref` from the builder's local store. Invoked by the
/// pipeline as the post-condition of a rejected gate verdict.
pub fn remove_image(image_ref: &str) -> Result<()> {
    remove_with(BUILDER_BIN, image_ref)
}

fn remove_with(bin: &str, image_ref: &str) -> Result<()> {
    let out = Command::new(bin)
        .args(["rmi", image_ref])
        .output()
        .with_context(|| format!("running {bin} rmi"))?;
    if !out.status.success() {
        return Err(anyhow!(
            "Failed to remove rejected image {image_ref} (exit code {})",
            out.status.code().unwrap_or(-1)
        ));
    }
    Ok(())
}
