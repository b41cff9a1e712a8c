//! Drift detection between pool state, the slot directories on disk, and
//! git's worktree registry. Nothing in here writes.

use crate::constants::REPORT_BRANCH_MAX_CHARS;
use crate::git::{Git, GitWorktreeEntry};
use crate::pool::{PoolState, PoolStore};
use crate::slot_name::{slot_name, slot_names};
use crate::ui::truncate;
use crate::worktrees::{list_slot_dirs, path_is_within_dir, slot_index_for_path};
use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum SyncIssueCode {
    OrphanState,
    OrphanDir,
    MissingBranch,
    BranchMismatch,
    GitRegistryMissing,
    UntrackedWorktree,
}

impl SyncIssueCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::OrphanState => "orphan-state",
            Self::OrphanDir => "orphan-dir",
            Self::MissingBranch => "missing-branch",
            Self::BranchMismatch => "branch-mismatch",
            Self::GitRegistryMissing => "git-registry-missing",
            Self::UntrackedWorktree => "untracked-worktree",
        }
    }
}

impl std::fmt::Display for SyncIssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct SyncIssue {
    pub(crate) code: SyncIssueCode,
    pub(crate) slot_name: String,
    pub(crate) message: String,
}

impl SyncIssue {
    fn new(code: SyncIssueCode, slot_name: impl Into<String>, message: String) -> Self {
        Self {
            code,
            slot_name: slot_name.into(),
            message,
        }
    }
}

pub(crate) fn diagnose(
    git: &dyn Git,
    repo_root: &Path,
    state: &PoolState,
    worktrees_dir: &Path,
) -> Result<Vec<SyncIssue>> {
    let slot_dirs = list_slot_dirs(worktrees_dir)?;
    let registry = registered_slots(git.list_worktrees(repo_root)?, worktrees_dir);
    let mut issues = Vec::new();
    let mut assigned = BTreeSet::new();

    for assignment in &state.assignments {
        let slot = &assignment.slot_name;
        let branch = &assignment.branch_name;
        let index = assignment.slot_index();
        if let Some(index) = index {
            assigned.insert(index);
        }

        if !git.path_exists(&assignment.worktree_path) {
            issues.push(SyncIssue::new(
                SyncIssueCode::OrphanState,
                slot,
                format!(
                    "{slot} is assigned to `{branch}` but {} does not exist",
                    assignment.worktree_path.display()
                ),
            ));
            continue;
        }

        if !git.branch_exists(repo_root, branch) {
            issues.push(SyncIssue::new(
                SyncIssueCode::MissingBranch,
                slot,
                format!("{slot} is assigned to `{branch}` but that branch no longer exists"),
            ));
        }

        match index.and_then(|index| registry.get(&index)) {
            None => issues.push(SyncIssue::new(
                SyncIssueCode::GitRegistryMissing,
                slot,
                format!(
                    "{slot} ({}) is not registered in `git worktree list`",
                    assignment.worktree_path.display()
                ),
            )),
            Some(entry) if entry.branch.as_deref() != Some(branch.as_str()) => {
                let actual = entry.branch.as_deref().unwrap_or("(detached HEAD)");
                issues.push(SyncIssue::new(
                    SyncIssueCode::BranchMismatch,
                    slot,
                    format!("{slot} is assigned to `{branch}` but git has `{actual}` checked out"),
                ));
            }
            Some(_) => {}
        }
    }

    for dir in slot_dirs.iter().filter(|dir| dir.index > state.pool_size) {
        issues.push(SyncIssue::new(
            SyncIssueCode::OrphanDir,
            slot_name(dir.index),
            format!(
                "{} is outside the pool (size {})",
                dir.path.display(),
                state.pool_size
            ),
        ));
    }

    for (index, entry) in &registry {
        if *index > state.pool_size || assigned.contains(index) {
            continue;
        }
        let slot = slot_name(*index);
        let branch = entry.branch.as_deref().unwrap_or("(detached HEAD)");
        issues.push(SyncIssue::new(
            SyncIssueCode::UntrackedWorktree,
            &slot,
            format!(
                "{slot} is a git worktree on `{branch}` at {} but has no pool assignment",
                entry.path.display()
            ),
        ));
    }

    tracing::debug!(issues = issues.len(), "diagnosed pool");
    Ok(issues)
}

fn registered_slots(
    entries: Vec<GitWorktreeEntry>,
    worktrees_dir: &Path,
) -> BTreeMap<usize, GitWorktreeEntry> {
    entries
        .into_iter()
        .filter(|entry| path_is_within_dir(&entry.path, worktrees_dir))
        .filter_map(|entry| slot_index_for_path(&entry.path).map(|index| (index, entry)))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SlotReportRow {
    pub(crate) index: usize,
    pub(crate) slot_name: String,
    pub(crate) branch: Option<String>,
    pub(crate) issues: Vec<SyncIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PoolReport {
    pub(crate) pool_size: usize,
    pub(crate) assignment_count: usize,
    pub(crate) rows: Vec<SlotReportRow>,
    pub(crate) issues: Vec<SyncIssue>,
    pub(crate) ok_count: usize,
    pub(crate) error_count: usize,
}

impl PoolReport {
    pub(crate) fn build(state: &PoolState, issues: Vec<SyncIssue>) -> Self {
        let rows: Vec<SlotReportRow> = slot_names(state.pool_size)
            .map(|(index, name)| SlotReportRow {
                index,
                branch: state
                    .find_by_slot(&name)
                    .map(|assignment| assignment.branch_name.clone()),
                issues: issues
                    .iter()
                    .filter(|issue| issue.slot_name == name)
                    .cloned()
                    .collect(),
                slot_name: name,
            })
            .collect();
        let ok_count = rows.iter().filter(|row| row.issues.is_empty()).count();

        Self {
            pool_size: state.pool_size,
            assignment_count: state.assignments.len(),
            ok_count,
            error_count: issues.len(),
            rows,
            issues,
        }
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Pool: {} slots, {} assignments",
            self.pool_size, self.assignment_count
        );
        let _ = writeln!(out, "{:<16} {:<40} STATUS", "SLOT", "BRANCH");
        for row in &self.rows {
            let branch = row.branch.as_deref().unwrap_or("-");
            let status = if row.issues.is_empty() {
                "ok".to_string()
            } else {
                row.issues
                    .iter()
                    .map(|issue| issue.code.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let _ = writeln!(
                out,
                "{:<16} {:<40} {status}",
                row.slot_name,
                truncate(branch, REPORT_BRANCH_MAX_CHARS)
            );
        }

        if self.issues.is_empty() {
            let _ = writeln!(out, "\nNo issues found.");
        } else {
            let _ = writeln!(out, "\nIssues:");
            for issue in &self.issues {
                let _ = writeln!(out, "  [{}] {}", issue.code, issue.message);
            }
        }
        let _ = write!(
            out,
            "\n{} ok, {} issue(s)",
            self.ok_count, self.error_count
        );
        out
    }
}

#[derive(Debug, Clone)]
pub(crate) enum CheckOutcome {
    NoPool { path: PathBuf },
    Report(PoolReport),
}

pub(crate) fn run_check(
    git: &dyn Git,
    repo_root: &Path,
    store: &PoolStore,
    worktrees_dir: &Path,
) -> Result<CheckOutcome> {
    let Some(state) = store.load()? else {
        return Ok(CheckOutcome::NoPool {
            path: store.path().to_path_buf(),
        });
    };
    let issues = diagnose(git, repo_root, &state, worktrees_dir)?;
    Ok(CheckOutcome::Report(PoolReport::build(&state, issues)))
}
