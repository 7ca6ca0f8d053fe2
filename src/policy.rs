use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Security gate policy: which severity classes block the build.
///
/// The policy is resolved once at startup (defaults, then environment, then
/// CLI flags) and passed into the gate as an immutable value. Nothing reads
/// the environment after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePolicy {
    pub fail_on_critical: bool,
    pub fail_on_high: bool,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            fail_on_critical: true,
            fail_on_high: false,
        }
    }
}

/// Environment variable naming the gate's CRITICAL flag.
pub const ENV_FAIL_ON_CRITICAL: &str = "CIB_FAIL_ON_CRITICAL";
/// Environment variable naming the gate's HIGH flag.
pub const ENV_FAIL_ON_HIGH: &str = "CIB_FAIL_ON_HIGH";

impl GatePolicy {
    /// Resolves the policy from an environment lookup plus optional CLI
    /// overrides. CLI flags win over environment, environment over defaults.
    ///
    /// The lookup is injected so the resolution is testable without mutating
    /// process-global environment state.
    pub fn resolve(
        lookup: impl Fn(&str) -> Option<String>,
        cli_fail_on_critical: Option<bool>,
        cli_fail_on_high: Option<bool>,
    ) -> Result<Self> {
        let defaults = Self::default();
        let fail_on_critical = match cli_fail_on_critical {
            Some(v) => v,
            None => env_bool(&lookup, ENV_FAIL_ON_CRITICAL)?.unwrap_or(defaults.fail_on_critical),
        };
        let fail_on_high = match cli_fail_on_high {
            Some(v) => v,
            None => env_bool(&lookup, ENV_FAIL_ON_HIGH)?.unwrap_or(defaults.fail_on_high),
        };
        Ok(Self {
            fail_on_critical,
            fail_on_high,
        })
    }

    /// Resolves against the real process environment.
    pub fn from_env(
        cli_fail_on_critical: Option<bool>,
        cli_fail_on_high: Option<bool>,
    ) -> Result<Self> {
        Self::resolve(
            |k| std::env::var(k).ok(),
            cli_fail_on_critical,
            cli_fail_on_high,
        )
    }
}

/// Parses a boolean environment value. Accepts `1/true/yes` and `0/false/no`
/// (case-insensitive). Anything else is a configuration error rather than a
/// silent default.
fn env_bool(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(Some(true)),
        "0" | "false" | "no" => Ok(Some(false)),
        other => Err(anyhow!(
            "Invalid boolean for {key}: {other:?} (expected 1/true/yes or 0/false/no)"
        )),
    }
}
