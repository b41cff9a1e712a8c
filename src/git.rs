use crate::constants::TRUNK_FALLBACKS;
use crate::process::{path_to_str, run_capture, run_git_checked};
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GitWorktreeEntry {
    pub(crate) path: PathBuf,
    pub(crate) branch: Option<String>,
}

/// The git operations the pool needs. Everything else about git stays out of
/// the allocator and reconciler.
pub(crate) trait Git {
    fn list_worktrees(&self, repo_root: &Path) -> Result<Vec<GitWorktreeEntry>>;
    fn branch_exists(&self, repo_root: &Path, branch: &str) -> bool;
    fn create_branch(&self, repo_root: &Path, branch: &str, base: &str) -> Result<()>;
    fn add_worktree(&self, repo_root: &Path, path: &Path, branch: &str) -> Result<()>;
    fn checkout_branch(&self, worktree_path: &Path, branch: &str) -> Result<()>;
    fn remote_default_branch(&self, repo_root: &Path) -> Option<String>;

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SubprocessGit;

impl Git for SubprocessGit {
    fn list_worktrees(&self, repo_root: &Path) -> Result<Vec<GitWorktreeEntry>> {
        let stdout = run_git_checked(&["worktree", "list", "--porcelain"], repo_root)
            .context("failed to list git worktrees")?;
        Ok(parse_git_worktree_porcelain(&stdout))
    }

    fn branch_exists(&self, repo_root: &Path, branch: &str) -> bool {
        run_capture(
            "git",
            &[
                "rev-parse",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}^{{commit}}"),
            ],
            Some(repo_root),
        )
        .map(|output| output.status.success())
        .unwrap_or(false)
    }

    fn create_branch(&self, repo_root: &Path, branch: &str, base: &str) -> Result<()> {
        run_git_checked(&["branch", branch, base], repo_root)
            .with_context(|| format!("failed to create branch `{branch}` from `{base}`"))?;
        Ok(())
    }

    fn add_worktree(&self, repo_root: &Path, path: &Path, branch: &str) -> Result<()> {
        let path_str = path_to_str(path)?;
        run_git_checked(&["worktree", "add", path_str, branch], repo_root).with_context(|| {
            format!(
                "failed to add worktree for `{branch}` at {}",
                path.display()
            )
        })?;
        Ok(())
    }

    fn checkout_branch(&self, worktree_path: &Path, branch: &str) -> Result<()> {
        run_git_checked(&["checkout", branch], worktree_path).with_context(|| {
            format!(
                "failed to check out `{branch}` in {}",
                worktree_path.display()
            )
        })?;
        Ok(())
    }

    fn remote_default_branch(&self, repo_root: &Path) -> Option<String> {
        let output = run_capture(
            "git",
            &[
                "symbolic-ref",
                "--quiet",
                "--short",
                "refs/remotes/origin/HEAD",
            ],
            Some(repo_root),
        )
        .ok()?;
        if !output.status.success() {
            return None;
        }
        let short = output.stdout.trim();
        let branch = short.strip_prefix("origin/").unwrap_or(short);
        if branch.is_empty() {
            return None;
        }
        Some(branch.to_string())
    }
}

pub(crate) fn repo_root() -> Result<PathBuf> {
    let output = run_capture("git", &["rev-parse", "--show-toplevel"], None)
        .context("failed to run git to detect repo root")?;
    if !output.status.success() {
        bail!("not inside a git repository");
    }
    let root = output.stdout.trim();
    if root.is_empty() {
        bail!("git did not return a repository root");
    }
    Ok(PathBuf::from(root))
}

/// The main checkout's root, even when invoked from inside a slot worktree.
pub(crate) fn repo_common_root() -> Result<PathBuf> {
    let output = run_capture(
        "git",
        &["rev-parse", "--path-format=absolute", "--git-common-dir"],
        None,
    )
    .context("failed to run git to detect common git dir")?;

    if output.status.success() {
        let common_dir = PathBuf::from(output.stdout.trim());
        if let Some(root) = common_root_from_git_common_dir(&common_dir) {
            return Ok(root);
        }
    }

    repo_root()
}

pub(crate) fn common_root_from_git_common_dir(common_dir: &Path) -> Option<PathBuf> {
    if common_dir.file_name()? != ".git" {
        return None;
    }
    common_dir.parent().map(Path::to_path_buf)
}

pub(crate) fn git_branch_name_valid(repo_root: &Path, branch: &str) -> bool {
    run_capture(
        "git",
        &["check-ref-format", "--branch", branch],
        Some(repo_root),
    )
    .map(|output| output.status.success())
    .unwrap_or(false)
}

pub(crate) fn resolve_trunk_branch(
    git: &dyn Git,
    repo_root: &Path,
    configured: Option<&str>,
) -> Result<String> {
    if let Some(trunk) = configured.map(str::trim).filter(|value| !value.is_empty()) {
        return Ok(trunk.to_string());
    }

    if let Some(remote_default) = git.remote_default_branch(repo_root)
        && git.branch_exists(repo_root, &remote_default)
    {
        return Ok(remote_default);
    }

    for candidate in TRUNK_FALLBACKS {
        if git.branch_exists(repo_root, candidate) {
            return Ok((*candidate).to_string());
        }
    }

    bail!(
        "could not determine the trunk branch for {}; set `trunk_branch` in .erk/config.toml",
        repo_root.display()
    )
}

pub(crate) fn parse_git_worktree_porcelain(raw: &str) -> Vec<GitWorktreeEntry> {
    let mut entries = Vec::new();
    let mut current_path: Option<PathBuf> = None;
    let mut current_branch: Option<String> = None;

    let flush_current = |entries: &mut Vec<GitWorktreeEntry>,
                         current_path: &mut Option<PathBuf>,
                         current_branch: &mut Option<String>| {
        if let Some(path) = current_path.take() {
            entries.push(GitWorktreeEntry {
                path,
                branch: current_branch.take(),
            });
        } else {
            current_branch.take();
        }
    };

    for line in raw.lines() {
        if line.is_empty() {
            flush_current(&mut entries, &mut current_path, &mut current_branch);
            continue;
        }

        if let Some(value) = line.strip_prefix("worktree ") {
            flush_current(&mut entries, &mut current_path, &mut current_branch);
            current_path = Some(PathBuf::from(value.trim()));
            continue;
        }

        if let Some(value) = line.strip_prefix("branch ")
            && let Some(short) = value.trim().strip_prefix("refs/heads/")
        {
            current_branch = Some(short.to_string());
        }
    }

    flush_current(&mut entries, &mut current_path, &mut current_branch);
    entries
}
