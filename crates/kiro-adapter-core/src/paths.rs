use crate::error::{AdapterError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const KIRO_DIR: &str = ".kiro";
pub const CONFIG_FILE: &str = ".kiro/adapter.yaml";
pub const AGENTS_OUTPUT_DIR: &str = ".kiro/agents";
pub const STEERING_DIR: &str = ".kiro/steering";
pub const HOOKS_DIR: &str = ".kiro/hooks";
pub const STATE_DIR: &str = ".kiro/state";
pub const METRICS_FILE: &str = ".kiro/state/activation-metrics.json";

pub const CORE_DIR: &str = ".bmad-core";
pub const CORE_AGENTS_DIR: &str = ".bmad-core/agents";
pub const EXPANSION_PACKS_DIR: &str = "expansion-packs";
pub const COMMON_DIR: &str = "common";
pub const PACK_AGENTS_SUBDIR: &str = "agents";

pub const HOOK_EXTENSION: &str = "kiro.hook";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn kiro_dir(root: &Path) -> PathBuf {
    root.join(KIRO_DIR)
}

/// Join `path` onto `root` unless it is already absolute.
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

pub fn hook_file_name(name: &str) -> String {
    format!("{}.{HOOK_EXTENSION}", slugify(name))
}

/// Lowercase, hyphen-separated form of `text` suitable for file names.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_dash = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

// ---------------------------------------------------------------------------
// Agent id validation
// ---------------------------------------------------------------------------

static AGENT_ID_RE: OnceLock<Regex> = OnceLock::new();

fn agent_id_re() -> &'static Regex {
    AGENT_ID_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9_\-]*[a-z0-9]$|^[a-z0-9]$").expect("static regex")
    })
}

pub fn validate_agent_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 || !agent_id_re().is_match(id) {
        return Err(AdapterError::Validation(format!(
            "invalid agent id '{id}': must be lowercase alphanumeric with hyphens or underscores"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
