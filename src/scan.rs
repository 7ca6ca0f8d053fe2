//! Vulnerability scanner integration.
//!
//! The scanner (`trivy`) is delegated to as an opaque tool: it is invoked
//! with JSON output on stdout, and findings presence is determined solely by
//! parsing that JSON. A non-zero scanner exit is a *tool failure*
//! ([`ScanOutcome::Failed`]), never "findings present" -- the two are
//! distinct outcomes and the pipeline treats them differently.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;

use std::process::Command;

use crate::gate::SeverityCounts;

/// Scanner binary probed by `toolcheck` and invoked here.
pub const SCANNER_BIN: &str = "trivy";

/// Maximum accepted scanner/SBOM output size.
const MAX_REPORT_BYTES: usize = 50 * 1024 * 1024; // 50MB

/// One reported vulnerability from the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub id: String,
    pub package: String,
    pub installed: String,
    pub fixed: Option<String>,
    /// Raw severity label as the scanner emitted it. Bucketing into known
    /// severity classes happens in the gate tally, so malformed labels
    /// survive parsing.
    pub severity: String,
}

/// Result of invoking the scanner.
#[derive(Debug)]
pub enum ScanOutcome {
    /// The scanner ran to completion; `raw` is its machine-readable report
    /// (findings may be empty -- the clean case).
    Completed { raw: Vec<u8> },
    /// The scanner process itself failed. Must never be conflated with a
    /// clean scan or with findings being present.
    Failed {
        exit_code: Option<i32>,
        stderr: Vec<u8>,
    },
}

/// Runs the vulnerability scan against `image_ref`.
///
/// Returns `Err` only when the scanner cannot be spawned or produces an
/// oversized report; a scanner that runs and exits non-zero is reported as
/// [`ScanOutcome::Failed`].
pub fn run_scanner(image_ref: &str) -> Result<ScanOutcome> {
    scan_with(SCANNER_BIN, image_ref)
}

fn scan_with(bin: &str, image_ref: &str) -> Result<ScanOutcome> {
    let out = Command::new(bin)
        .args(["image", "--quiet", "--format", "json", image_ref])
        .output()
        .with_context(|| format!("running {bin}"))?;
    if !out.status.success() {
        return Ok(ScanOutcome::Failed {
            exit_code: out.status.code(),
            stderr: out.stderr,
        });
    }
    if out.stdout.len() > MAX_REPORT_BYTES {
        return Err(anyhow!(
            "Scan report too large: {} bytes (max {MAX_REPORT_BYTES})",
            out.stdout.len()
        ));
    }
    Ok(ScanOutcome::Completed { raw: out.stdout })
}

/// Wire shape of the scanner's JSON report. Only the fields the pipeline
/// consumes are modeled; a missing `Results` key or missing vulnerability
/// arrays mean zero findings, not an error.
#[derive(Debug, Deserialize)]
struct WireReport {
    #[serde(rename = "Results", default)]
    results: Vec<WireResult>,
}

#[derive(Debug, Deserialize)]
struct WireResult {
    #[serde(rename = "Vulnerabilities", default)]
    vulnerabilities: Vec<WireVulnerability>,
}

#[derive(Debug, Deserialize)]
struct WireVulnerability {
    #[serde(rename = "VulnerabilityID", default)]
    id: String,
    #[serde(rename = "PkgName", default)]
    pkg_name: String,
    #[serde(rename = "InstalledVersion", default)]
    installed_version: String,
    #[serde(rename = "FixedVersion")]
    fixed_version: Option<String>,
    #[serde(rename = "Severity", default)]
    severity: String,
}

/// Parses the machine-readable scan report into findings.
pub fn parse_findings(raw: &[u8]) -> Result<Vec<Finding>> {
    let report: WireReport =
        serde_json::from_slice(raw).context("parsing scan report JSON")?;
    Ok(report
        .results
        .into_iter()
        .flat_map(|r| r.vulnerabilities)
        .map(|v| Finding {
            id: v.id,
            package: v.pkg_name,
            installed: v.installed_version,
            fixed: v.fixed_version,
            severity: v.severity,
        })
        .collect())
}

/// Renders the human-readable scan report: severity totals followed by one
/// line per finding.
pub fn render_text_report(image_ref: &str, findings: &[Finding]) -> String {
    let counts = SeverityCounts::tally(findings);
    let mut out = String::new();
    out.push_str(&format!("Vulnerability scan: {image_ref}\n"));
    out.push_str(&format!(
        "Totals: {} CRITICAL / {} HIGH / {} MEDIUM / {} other\n",
        counts.critical, counts.high, counts.medium, counts.other
    ));
    out.push('\n');
    if findings.is_empty() {
        out.push_str("No vulnerabilities found.\n");
        return out;
    }
    out.push_str(&format!(
        "{:<20} {:<10} {:<28} {}\n",
        "ID", "SEVERITY", "PACKAGE", "VERSION"
    ));
    for f in findings {
        let version = match &f.fixed {
            Some(fixed) => format!("{} -> {}", f.installed, fixed),
            None => format!("{} (no fix)", f.installed),
        };
        out.push_str(&format!(
            "{:<20} {:<10} {:<28} {}\n",
            f.id, f.severity, f.package, version
        ));
    }
    out
}

/// Software inventory produced by the scanner's SBOM mode.
#[derive(Debug)]
pub struct Sbom {
    pub raw: Vec<u8>,
    pub component_count: usize,
}

/// Generates a CycloneDX SBOM for `image_ref`.
///
/// Unlike the vulnerability scan there is no findings/tool-failure ambiguity
/// here, so any non-zero exit is surfaced as an error directly.
pub fn generate_sbom(image_ref: &str) -> Result<Sbom> {
    sbom_with(SCANNER_BIN, image_ref)
}

fn sbom_with(bin: &str, image_ref: &str) -> Result<Sbom> {
    let out = Command::new(bin)
        .args(["image", "--quiet", "--format", "cyclonedx", image_ref])
        .output()
        .with_context(|| format!("running {bin} (sbom)"))?;
    if !out.status.success() {
        return Err(anyhow!(
            "SBOM generation failed with exit code {}",
            out.status.code().unwrap_or(-1)
        ));
    }
    if out.stdout.len() > MAX_REPORT_BYTES {
        return Err(anyhow!(
            "SBOM too large: {} bytes (max {MAX_REPORT_BYTES})",
            out.stdout.len()
        ));
    }
    let component_count = count_components(&out.stdout)?;
    Ok(Sbom {
        raw: out.stdout,
        component_count,
    })
}

/// Counts `components` entries in a CycloneDX document.
fn count_components(raw: &[u8]) -> Result<usize> {
    let doc: Value = serde_json::from_slice(raw).context("parsing SBOM JSON")?;
    Ok(doc
        .get("components")
        .and_then(Value::as_array)
        .map_or(0, Vec::len))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_REPORT: &str = r#"{
        "SchemaVersion": 2,
        "ArtifactName": "app:latest",
        "Results": [
            {
                "Target": "app:latest (alpine 3.19)",
                "Vulnerabilities": [
                    {
                        "VulnerabilityID": "CVE-2024-1111",
                        "PkgName": "openssl",
                        "InstalledVersion": "3.1.4-r0",
                        "FixedVersion": "3.1.4-r5",
                        "Severity": "CRITICAL"
                    },
                    {
                        "VulnerabilityID": "CVE-2024-2222",
                        "PkgName": "busybox",
                        "InstalledVersion": "1.36.1-r0",
                        "Severity": "MEDIUM"
                    }
                ]
            },
            {
                "Target": "usr/local/bin/app"
            }
        ]
    }"#;

    #[test]
    fn test_parse_findings_from_scanner_report() {
        let findings = parse_findings(SAMPLE_REPORT.as_bytes()).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].id, "CVE-2024-1111");
        assert_eq!(findings[0].fixed.as_deref(), Some("3.1.4-r5"));
        assert_eq!(findings[1].severity, "MEDIUM");
        assert_eq!(findings[1].fixed, None);
    }

    #[test]
    fn test_parse_findings_missing_results_is_clean() {
        let findings = parse_findings(br#"{"SchemaVersion": 2}"#).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_parse_findings_preserves_unknown_severity() {
        let raw = br#"{"Results":[{"Vulnerabilities":[
            {"VulnerabilityID":"X","PkgName":"p","InstalledVersion":"1","Severity":"WEIRD"}
        ]}]}"#;
        let findings = parse_findings(raw).unwrap();
        assert_eq!(findings[0].severity, "WEIRD");
    }

    #[test]
    fn test_parse_findings_rejects_malformed_json() {
        assert!(parse_findings(b"not json").is_err());
    }

    #[test]
    fn test_scan_with_nonzero_exit_is_tool_failure() {
        // `false` exits 1 without emitting a report: that is a scanner
        // failure, not "findings present".
        let outcome = scan_with("false", "app:latest").unwrap();
        match outcome {
            ScanOutcome::Failed { exit_code, .. } => assert_eq!(exit_code, Some(1)),
            ScanOutcome::Completed { .. } => panic!("expected tool failure"),
        }
    }

    #[test]
    fn test_scan_with_missing_binary_is_error() {
        assert!(scan_with("cib-no-such-scanner-binary", "app:latest").is_err());
    }

    #[test]
    fn test_scan_with_zero_exit_is_completed() {
        let outcome = scan_with("true", "app:latest").unwrap();
        assert!(matches!(outcome, ScanOutcome::Completed { .. }));
    }

    #[test]
    fn test_render_text_report_clean() {
        let text = render_text_report("app:latest", &[]);
        assert!(text.contains("0 CRITICAL / 0 HIGH / 0 MEDIUM"));
        assert!(text.contains("No vulnerabilities found."));
    }

    #[test]
    fn test_render_text_report_lists_findings() {
        let findings = parse_findings(SAMPLE_REPORT.as_bytes()).unwrap();
        let text = render_text_report("app:latest", &findings);
        assert!(text.contains("1 CRITICAL / 0 HIGH / 1 MEDIUM"));
        assert!(text.contains("CVE-2024-1111"));
        assert!(text.contains("3.1.4-r0 -> 3.1.4-r5"));
        assert!(text.contains("1.36.1-r0 (no fix)"));
    }

    #[test]
    fn test_count_components() {
        let raw = br#"{"bomFormat":"CycloneDX","components":[{"name":"a"},{"name":"b"}]}"#;
        assert_eq!(count_components(raw).unwrap(), 2);
        assert_eq!(count_components(br#"{"bomFormat":"CycloneDX"}"#).unwrap(), 0);
    }
}
