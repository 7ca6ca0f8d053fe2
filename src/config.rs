use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

use crate::policy::GatePolicy;

/// Environment variable naming the image repository.
pub const ENV_IMAGE: &str = "CIB_IMAGE";
/// Environment variable naming the image definition file.
pub const ENV_CONTAINERFILE: &str = "CIB_CONTAINERFILE";
/// Environment variable naming the artifact output directory.
pub const ENV_OUTPUT_DIR: &str = "CIB_OUTPUT_DIR";

const DEFAULT_IMAGE: &str = "app";
const DEFAULT_CONTAINERFILE: &str = "Dockerfile";
const DEFAULT_OUTPUT_DIR: &str = "cib-out";

/// Immutable pipeline configuration, resolved once at startup.
///
/// CLI flags win over environment variables, environment over built-in
/// defaults. After construction nothing in the pipeline consults the
/// environment again.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Image repository name (`CIB_IMAGE`, default `app`).
    pub image: String,
    /// Image tag (positional CLI argument, default `latest`).
    pub tag: String,
    /// Image definition file passed to the builder.
    pub containerfile: PathBuf,
    /// Directory all artifacts are written into.
    pub output_dir: PathBuf,
    /// Security gate policy flags.
    pub policy: GatePolicy,
}

impl PipelineConfig {
    /// Resolves the configuration from an environment lookup plus CLI values.
    pub fn resolve(
        lookup: impl Fn(&str) -> Option<String>,
        tag: String,
        cli_containerfile: Option<PathBuf>,
        cli_output_dir: Option<PathBuf>,
        policy: GatePolicy,
    ) -> Result<Self> {
        if tag.is_empty() || tag.contains(char::is_whitespace) {
            return Err(anyhow!("Invalid image tag: {tag:?}"));
        }
        let image = lookup(ENV_IMAGE).unwrap_or_else(|| DEFAULT_IMAGE.to_string());
        if image.is_empty() || image.contains(char::is_whitespace) {
            return Err(anyhow!("Invalid image name from {ENV_IMAGE}: {image:?}"));
        }
        let containerfile = cli_containerfile
            .or_else(|| lookup(ENV_CONTAINERFILE).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTAINERFILE));
        let output_dir = cli_output_dir
            .or_else(|| lookup(ENV_OUTPUT_DIR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        Ok(Self {
            image,
            tag,
            containerfile,
            output_dir,
            policy,
        })
    }

    /// Resolves against the real process environment.
    pub fn from_env(
        tag: String,
        cli_containerfile: Option<PathBuf>,
        cli_output_dir: Option<PathBuf>,
        policy: GatePolicy,
    ) -> Result<Self> {
        Self::resolve(
            |k| std::env::var(k).ok(),
            tag,
            cli_containerfile,
            cli_output_dir,
            policy,
        )
    }

    /// Full image reference passed to the builder and scanner.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    /// Base name for the exported archive and its checksum sidecars.
    /// Registry slashes and the tag separator are flattened so the reference
    /// maps onto a single file name.
    pub fn artifact_stem(&self) -> String {
        format!("{}-{}", self.image.replace('/', "-"), self.tag)
    }

    pub fn build_log_path(&self) -> PathBuf {
        self.output_dir.join("build.log")
    }

    pub fn scan_report_json_path(&self) -> PathBuf {
        self.output_dir.join("scan-report.json")
    }

    pub fn scan_report_text_path(&self) -> PathBuf {
        self.output_dir.join("scan-report.txt")
    }

    pub fn sbom_path(&self) -> PathBuf {
        self.output_dir.join("sbom.cdx.json")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.tar.gz", self.artifact_stem()))
    }

    pub fn certificate_path(&self) -> PathBuf {
        self.output_dir.join("certificate.txt")
    }
}

/// Appends a digest-algorithm suffix to an artifact path, e.g.
/// `app-latest.tar.gz` -> `app-latest.tar.gz.sha256`.
pub fn sidecar_path(artifact: &Path, algo: &str) -> PathBuf {
    let mut name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push('.');
    name.push_str(algo);
    artifact.with_file_name(name)
}
