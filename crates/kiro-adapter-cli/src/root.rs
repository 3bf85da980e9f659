use kiro_adapter_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `KIRO_ADAPTER_ROOT` env var (passed in as `explicit`)
/// 2. Nearest ancestor of `cwd` containing `.kiro/` or `.bmad-core/`
/// 3. Nearest ancestor containing `.git/`
/// 4. `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_root(&cwd).unwrap_or(cwd)
}

fn find_root(start: &Path) -> Option<PathBuf> {
    let has = |markers: &[&str]| {
        start
            .ancestors()
            .find(|dir| markers.iter().any(|m| dir.join(m).is_dir()))
            .map(Path::to_path_buf)
    };
    has(&[paths::KIRO_DIR, paths::CORE_DIR]).or_else(|| has(&[".git"]))
}
