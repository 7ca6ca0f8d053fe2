//! Build certificate generation.
//!
//! The certificate is the final artifact of an accepted run: a plain-text,
//! write-once document binding the image reference to its gate verdict,
//! severity counts, archive digests, SBOM inventory size, timestamps, and a
//! per-file digest manifest of the artifact directory. A certificate is only
//! ever produced for an accepted build; rejected runs terminate at the gate.

use anyhow::Result;
use std::path::Path;

use crate::checksum::{ArtifactDigests, ManifestEntry};
use crate::fs_guard;
use crate::gate::SeverityCounts;
use crate::policy::GatePolicy;

/// Everything the certificate embeds. Collected by the pipeline after the
/// final artifact lands so the document can be rendered in one pass and
/// written exactly once.
#[derive(Debug)]
pub struct CertificateData<'a> {
    pub image_ref: &'a str,
    pub containerfile: &'a str,
    pub policy: GatePolicy,
    pub counts: SeverityCounts,
    pub archive_name: &'a str,
    pub digests: &'a ArtifactDigests,
    pub sbom_components: usize,
    pub started: &'a str,
    pub completed: &'a str,
    pub tool_versions: &'a [(String, String)],
    pub manifest: &'a [ManifestEntry],
}

pub fn render(data: &CertificateData) -> String {
    let mut out = String::new();
    out.push_str("CERTIFIED IMAGE BUILD CERTIFICATE\n");
    out.push_str("=================================\n\n");
    out.push_str(&format!("Image:          {}\n", data.image_ref));
    out.push_str(&format!("Containerfile:  {}\n", data.containerfile));
    out.push_str(&format!("Pipeline:       cib v{}\n", env!("CARGO_PKG_VERSION")));
    out.push_str(&format!("Started:        {}\n", data.started));
    out.push_str(&format!("Certified:      {}\n\n", data.completed));

    out.push_str("SECURITY GATE\n");
    out.push_str(&format!(
        "  Policy:   fail on CRITICAL = {}, fail on HIGH = {}\n",
        data.policy.fail_on_critical, data.policy.fail_on_high
    ));
    out.push_str(&format!(
        "  Findings: {} CRITICAL / {} HIGH / {} MEDIUM / {} other\n",
        data.counts.critical, data.counts.high, data.counts.medium, data.counts.other
    ));
    out.push_str("  Verdict:  ACCEPTED\n\n");

    out.push_str("ARTIFACT\n");
    out.push_str(&format!("  File:     {}\n", data.archive_name));
    out.push_str(&format!("  Size:     {} bytes\n", data.digests.bytes));
    out.push_str(&format!("  SHA-256:  {}\n", data.digests.sha256));
    out.push_str(&format!("  SHA-512:  {}\n\n", data.digests.sha512));

    out.push_str("INVENTORY\n");
    out.push_str(&format!(
        "  SBOM: sbom.cdx.json ({} components)\n\n",
        data.sbom_components
    ));

    if !data.tool_versions.is_empty() {
        out.push_str("TOOLS\n");
        for (name, version) in data.tool_versions {
            out.push_str(&format!("  {name}: {version}\n"));
        }
        out.push('\n');
    }

    out.push_str("FILES\n");
    for entry in data.manifest {
        out.push_str(&format!(
            "  {}  {:>10}  {}\n",
            entry.sha256, entry.bytes, entry.path
        ));
    }
    out
}

/// Renders and writes the certificate. A pre-existing certificate at `path`
/// is an error: certificates are write-once and never updated in place.
pub fn write(path: &Path, data: &CertificateData) -> Result<()> {
    fs_guard::write_once(path, render(data).as_bytes())
}
