use crate::constants::{LEGACY_SLOT_PREFIX, SLOT_INDEX_WIDTH, WORKTREES_DIR};
use crate::slot_name::{parse_slot_index, slot_name};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlotDir {
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) path: PathBuf,
}

pub(crate) fn worktrees_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(WORKTREES_DIR)
}

pub(crate) fn ensure_worktrees_dir(worktrees_dir: &Path) -> Result<()> {
    if !worktrees_dir.exists() {
        fs::create_dir_all(worktrees_dir)
            .with_context(|| format!("failed to create {}", worktrees_dir.display()))?;
    }
    Ok(())
}

/// Where slot `index` lives on disk. A directory left behind under the legacy
/// prefix is reused rather than shadowed by a fresh canonical one.
pub(crate) fn slot_path(worktrees_dir: &Path, index: usize) -> PathBuf {
    let canonical = worktrees_dir.join(slot_name(index));
    if canonical.exists() {
        return canonical;
    }
    let legacy = worktrees_dir.join(format!(
        "{LEGACY_SLOT_PREFIX}-{index:0width$}",
        width = SLOT_INDEX_WIDTH
    ));
    if legacy.is_dir() {
        return legacy;
    }
    canonical
}

/// Directories directly under `worktrees_dir` whose names parse as slots,
/// ordered by index. Anything else in there is ignored.
pub(crate) fn list_slot_dirs(worktrees_dir: &Path) -> Result<Vec<SlotDir>> {
    if !worktrees_dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(worktrees_dir)
        .with_context(|| format!("failed to read {}", worktrees_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(index) = parse_slot_index(&name) else {
            continue;
        };
        entries.push(SlotDir {
            index,
            name,
            path: entry.path(),
        });
    }

    entries.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

pub(crate) fn path_is_within_dir(path: &Path, dir: &Path) -> bool {
    if path.starts_with(dir) {
        return true;
    }
    match (path.canonicalize(), dir.canonicalize()) {
        (Ok(canonical_path), Ok(canonical_dir)) => canonical_path.starts_with(canonical_dir),
        _ => false,
    }
}

/// Equal as written, or equal once symlinks are resolved.
pub(crate) fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

pub(crate) fn slot_index_for_path(path: &Path) -> Option<usize> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(parse_slot_index)
}
