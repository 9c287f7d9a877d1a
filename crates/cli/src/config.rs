//! CLI configuration file (`provost.toml`).
//!
//! ```toml
//! store = "registry/records.json"
//!
//! [term]
//! academic_year = "2025/2026"
//! semester = "first"
//! ```
//!
//! The term, when configured, is stamped into submitted payloads that do
//! not already carry one. It is read here once and passed down as a
//! value -- nothing resolves it ambiently.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use provost_core::Term;

/// Default config file name, looked up in the working directory.
const DEFAULT_CONFIG_FILE: &str = "provost.toml";

/// Default store file when neither flag nor config names one.
pub const DEFAULT_STORE_FILE: &str = "provost-store.json";

#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    /// Default record store path, overridden by `--store`.
    pub store: Option<PathBuf>,
    /// Current academic term, stamped into submitted payloads.
    pub term: Option<Term>,
}

/// Load configuration.
///
/// An explicitly passed path must exist and parse; the implicit
/// `provost.toml` is optional and silently skipped when absent.
pub fn load(explicit: Option<&Path>) -> Result<CliConfig, String> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let p = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !p.exists() {
                return Ok(CliConfig::default());
            }
            p
        }
    };
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| format!("error reading '{}': {}", path.display(), e))?;
    toml::from_str(&raw).map_err(|e| format!("error parsing '{}': {}", path.display(), e))
}
