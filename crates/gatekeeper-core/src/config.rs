//! Runtime settings layer: CLI/env overrides the `Setting` rows in the
//! store, which override the compiled defaults in `constants`.
//!
//! Mirrors the precedence chronx-node's binaries apply between
//! `clap` arguments and `--env`-backed flags, extended here with a third,
//! lowest-priority tier (the store) because the operator surface is allowed
//! to change these values at runtime without a redeploy.

use serde::{Deserialize, Serialize};

use crate::constants::*;

/// The tunables named in spec.md §6, resolved once at startup and threaded
/// explicitly rather than read from a global — consistent with passing
/// `now: Timestamp` explicitly through the entitlement pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub verification_period_hours: u32,
    pub file_access_limit: u32,
    pub verification_token_ttl_seconds: i64,
    pub auto_delete_seconds: i64,
    pub min_traversal_seconds: i64,
    pub min_dwell_seconds: i64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            verification_period_hours: DEFAULT_VERIFICATION_PERIOD_HOURS,
            file_access_limit: DEFAULT_FILE_ACCESS_LIMIT,
            verification_token_ttl_seconds: DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS,
            auto_delete_seconds: DEFAULT_AUTO_DELETE_SECONDS,
            min_traversal_seconds: DEFAULT_MIN_TRAVERSAL_SECONDS,
            min_dwell_seconds: DEFAULT_MIN_DWELL_SECONDS,
        }
    }
}

impl RuntimeConfig {
    /// Clamp `verification_period_hours` to the documented valid range
    /// (spec.md §6) rather than rejecting out-of-range operator input.
    pub fn with_verification_period_hours(mut self, hours: u32) -> Self {
        self.verification_period_hours =
            hours.clamp(MIN_VERIFICATION_PERIOD_HOURS, MAX_VERIFICATION_PERIOD_HOURS);
        self
    }

    /// Clamp `file_access_limit` to a minimum of 1.
    pub fn with_file_access_limit(mut self, limit: u32) -> Self {
        self.file_access_limit = limit.max(MIN_FILE_ACCESS_LIMIT);
        self
    }

    pub fn verification_period_seconds(&self) -> i64 {
        i64::from(self.verification_period_hours) * 3600
    }

    /// Apply a single `Setting` row, parsed at the read site per spec.md §3.
    /// Unknown keys and unparsable values are ignored — the store is not the
    /// place settings validation happens, `with_*` is.
    pub fn apply_setting(&mut self, key: &str, value: &str) {
        match key {
            "verification_period_hours" => {
                if let Ok(v) = value.parse() {
                    *self = self.clone().with_verification_period_hours(v);
                }
            }
            "file_access_limit" => {
                if let Ok(v) = value.parse() {
                    *self = self.clone().with_file_access_limit(v);
                }
            }
            "verification_token_ttl_seconds" => {
                if let Ok(v) = value.parse() {
                    self.verification_token_ttl_seconds = v;
                }
            }
            "auto_delete_seconds" => {
                if let Ok(v) = value.parse() {
                    self.auto_delete_seconds = v;
                }
            }
            "min_traversal_seconds" => {
                if let Ok(v) = value.parse() {
                    self.min_traversal_seconds = v;
                }
            }
            "min_dwell_seconds" => {
                if let Ok(v) = value.parse() {
                    self.min_dwell_seconds = v;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_period() {
        let cfg = RuntimeConfig::default().with_verification_period_hours(999_999);
        assert_eq!(cfg.verification_period_hours, MAX_VERIFICATION_PERIOD_HOURS);
    }

    #[test]
    fn applies_known_setting() {
        let mut cfg = RuntimeConfig::default();
        cfg.apply_setting("file_access_limit", "7");
        assert_eq!(cfg.file_access_limit, 7);
    }

    #[test]
    fn ignores_unknown_setting() {
        let mut cfg = RuntimeConfig::default();
        cfg.apply_setting("not_a_real_key", "123");
        assert_eq!(cfg.file_access_limit, DEFAULT_FILE_ACCESS_LIMIT);
    }
}
