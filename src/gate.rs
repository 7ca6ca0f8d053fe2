//! Security gate: the pass/fail decision over scanner findings.
//!
//! The gate is a pure function from `(findings, policy)` to a verdict. It
//! performs no I/O and triggers no side effects; discarding a rejected image
//! is the pipeline's job, executed after the verdict is returned. Keeping the
//! decision pure makes it independently testable and trivially idempotent.

use crate::policy::GatePolicy;
use crate::scan::Finding;

/// Severity classes the gate recognizes. Labels outside these buckets are
/// tallied as `other` and can never reject a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    High,
    Medium,
}

impl Severity {
    /// Maps a scanner severity label onto a known bucket. Unknown or
    /// malformed labels return `None` rather than failing the tally.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Some(Self::Critical),
            "HIGH" => Some(Self::High),
            "MEDIUM" => Some(Self::Medium),
            _ => None,
        }
    }
}

/// Findings per severity bucket. `medium` and `other` are informational;
/// only `critical` and `high` can reject under the policy flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub other: usize,
}

impl SeverityCounts {
    pub fn tally(findings: &[Finding]) -> Self {
        let mut counts = Self::default();
        for f in findings {
            match Severity::parse(&f.severity) {
                Some(Severity::Critical) => counts.critical += 1,
                Some(Severity::High) => counts.high += 1,
                Some(Severity::Medium) => counts.medium += 1,
                None => counts.other += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.other
    }
}

/// Severity class that triggered a rejection. CRITICAL takes precedence over
/// HIGH when both apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionClass {
    Critical,
    High,
}

impl RejectionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
        }
    }
}

/// Gate outcome. Both variants carry the full counts so reports and the
/// certificate can embed them regardless of the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Accepted { counts: SeverityCounts },
    Rejected {
        counts: SeverityCounts,
        reason: RejectionClass,
    },
}

impl GateVerdict {
    pub fn counts(&self) -> SeverityCounts {
        match self {
            Self::Accepted { counts } | Self::Rejected { counts, .. } => *counts,
        }
    }

    #[allow(dead_code)]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Applies the gate policy to a set of findings.
///
/// Rejects iff `critical > 0 && fail_on_critical` or
/// `high > 0 && fail_on_high`; MEDIUM and unrecognized severities never
/// gate. Zero findings is the common clean accept.
pub fn evaluate(findings: &[Finding], policy: &GatePolicy) -> GateVerdict {
    let counts = SeverityCounts::tally(findings);
    if counts.critical > 0 && policy.fail_on_critical {
        return GateVerdict::Rejected {
            counts,
            reason: RejectionClass::Critical,
        };
    }
    if counts.high > 0 && policy.fail_on_high {
        return GateVerdict::Rejected {
            counts,
            reason: RejectionClass::High,
        };
    }
    GateVerdict::Accepted { counts }
}
