use std::path::{Path, PathBuf};

use gatekeeper_core::RuntimeConfig;
use gatekeeper_store::StateDb;

/// Shared by all three binaries — same `EnvFilter` convention as the
/// teacher's node binary (`info` by default, `gatekeeper=debug` unless
/// overridden by `RUST_LOG`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gatekeeper=debug".parse().unwrap()),
        )
        .init();
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

/// Layer the `settings` tree stored in `db` on top of the compiled defaults
/// (spec.md §6's precedence: store overrides defaults; CLI/env flags, if
/// passed, are applied by the caller on top of this).
pub fn load_runtime_config(db: &StateDb) -> Result<RuntimeConfig, gatekeeper_core::GatekeeperError> {
    let mut cfg = RuntimeConfig::default();
    for setting in db.list_settings()? {
        cfg.apply_setting(&setting.key, &setting.value);
    }
    Ok(cfg)
}
