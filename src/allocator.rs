//! Slot allocation.
//!
//! The pool behaves like a fixed-capacity cache keyed by branch name: slots are
//! the cache lines and `assigned_at` is the recency signal. Eviction is never
//! silent; the caller either forces it, picks a victim, or gets `PoolFull`.

use crate::error::PoolError;
use crate::git::Git;
use crate::pool::{PoolState, PoolStore, SlotAssignment};
use crate::slot_name::{canonical_slot_name, known_slots, slot_names};
use crate::ui::{Prompter, progress};
use crate::worktrees::{ensure_worktrees_dir, same_path, slot_path};
use anyhow::{Context, Result};
use std::path::Path;

/// Everything the allocator touches besides the state itself.
pub(crate) struct PoolContext<'a> {
    pub(crate) git: &'a dyn Git,
    pub(crate) store: &'a PoolStore,
    pub(crate) repo_root: &'a Path,
    pub(crate) worktrees_dir: &'a Path,
    pub(crate) trunk_branch: &'a str,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AssignRequest<'a> {
    pub(crate) branch: &'a str,
    pub(crate) force: bool,
    /// Explicit victim when the pool is full. Implies `force`.
    pub(crate) evict: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorktreeAction {
    Added,
    CheckedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AssignOutcome {
    AlreadyAssigned(SlotAssignment),
    Assigned {
        assignment: SlotAssignment,
        evicted: Option<SlotAssignment>,
        action: WorktreeAction,
        branch_created: bool,
    },
}

impl AssignOutcome {
    pub(crate) fn assignment(&self) -> &SlotAssignment {
        match self {
            Self::AlreadyAssigned(assignment) => assignment,
            Self::Assigned { assignment, .. } => assignment,
        }
    }

    pub(crate) fn worktree_path(&self) -> &Path {
        &self.assignment().worktree_path
    }
}

pub(crate) fn assign_branch(
    ctx: &PoolContext<'_>,
    prompter: &dyn Prompter,
    mut state: PoolState,
    request: AssignRequest<'_>,
) -> Result<(AssignOutcome, PoolState)> {
    let branch = request.branch;
    if let Some(existing) = state.find_by_branch(branch) {
        tracing::debug!(
            branch,
            slot = %existing.slot_name,
            "branch already assigned; reusing slot"
        );
        let existing = existing.clone();
        return Ok((AssignOutcome::AlreadyAssigned(existing), state));
    }

    let (slot_index, slot_name, victim) = match first_free_slot(&state) {
        Some((index, name)) => {
            if let Some(requested) = request.evict {
                tracing::debug!(requested, free = %name, "pool has a free slot; not evicting");
            }
            (index, name, None)
        }
        None => {
            let victim = select_victim(&state, prompter, request)?;
            let index = victim.slot_index().ok_or_else(|| PoolError::UnknownSlot {
                slot: victim.slot_name.clone(),
                pool_size: state.pool_size,
            })?;
            (index, victim.slot_name.clone(), Some(victim))
        }
    };

    let worktree_path = slot_path(ctx.worktrees_dir, slot_index);
    // A directory git does not know about is not a worktree: `git checkout`
    // there would walk up and switch the main checkout instead.
    let reuse_existing = ctx.git.path_exists(&worktree_path);
    if reuse_existing && !is_registered_worktree(ctx, &worktree_path)? {
        return Err(PoolError::UnregisteredSlotDir {
            slot: slot_name,
            path: worktree_path,
        }
        .into());
    }

    let evicted = match victim {
        Some(victim) => {
            state.remove_assignment(&victim.slot_name);
            // Persist the eviction first so a failed checkout cannot bring the
            // old assignment back.
            ctx.store.save(&state).with_context(|| {
                format!(
                    "failed to record eviction of `{}` from {}",
                    victim.branch_name, victim.slot_name
                )
            })?;
            progress(&format!(
                "evicted `{}` from {} to make room for `{branch}`",
                victim.branch_name, victim.slot_name
            ));
            tracing::info!(
                evicted = %victim.branch_name,
                slot = %victim.slot_name,
                branch,
                "evicted assignment"
            );
            Some(victim)
        }
        None => None,
    };

    let branch_created = if ctx.git.branch_exists(ctx.repo_root, branch) {
        false
    } else {
        progress(&format!(
            "creating branch `{branch}` from `{}`",
            ctx.trunk_branch
        ));
        ctx.git
            .create_branch(ctx.repo_root, branch, ctx.trunk_branch)
            .with_context(|| format!("failed to prepare `{branch}` for {slot_name}"))?;
        true
    };

    let action = if reuse_existing {
        progress(&format!(
            "checking out `{branch}` in existing {slot_name} at {}",
            worktree_path.display()
        ));
        ctx.git
            .checkout_branch(&worktree_path, branch)
            .with_context(|| format!("failed to switch {slot_name} to `{branch}`"))?;
        WorktreeAction::CheckedOut
    } else {
        progress(&format!(
            "adding worktree {slot_name} for `{branch}` at {}",
            worktree_path.display()
        ));
        ensure_worktrees_dir(ctx.worktrees_dir)?;
        ctx.git
            .add_worktree(ctx.repo_root, &worktree_path, branch)
            .with_context(|| format!("failed to create {slot_name} for `{branch}`"))?;
        WorktreeAction::Added
    };

    let assignment = SlotAssignment::new(&slot_name, branch, &worktree_path);
    state.assignments.push(assignment.clone());
    ctx.store
        .save(&state)
        .with_context(|| format!("failed to record `{branch}` in {slot_name}"))?;
    tracing::info!(branch, slot = %slot_name, ?action, "assigned branch");

    Ok((
        AssignOutcome::Assigned {
            assignment,
            evicted,
            action,
            branch_created,
        },
        state,
    ))
}

fn is_registered_worktree(ctx: &PoolContext<'_>, worktree_path: &Path) -> Result<bool> {
    let entries = ctx
        .git
        .list_worktrees(ctx.repo_root)
        .context("failed to read the git worktree registry")?;
    Ok(entries
        .iter()
        .any(|entry| same_path(&entry.path, worktree_path)))
}

/// Applies the effective pool size. Assignments whose slot no longer fits are
/// evicted and saved before anything else touches the pool; their directories
/// stay on disk for `check` to report.
pub(crate) fn apply_pool_size(
    store: &PoolStore,
    mut state: PoolState,
    pool_size: usize,
) -> Result<(PoolState, Vec<SlotAssignment>)> {
    if state.pool_size != pool_size {
        tracing::info!(from = state.pool_size, to = pool_size, "resizing pool");
    }
    let dropped = state.resize(pool_size);
    if dropped.is_empty() {
        return Ok((state, dropped));
    }

    store
        .save(&state)
        .with_context(|| format!("failed to record pool resize to {pool_size} slots"))?;
    for assignment in &dropped {
        progress(&format!(
            "evicted `{}` from {}: outside the pool of {pool_size} slot(s)",
            assignment.branch_name, assignment.slot_name
        ));
        tracing::info!(
            evicted = %assignment.branch_name,
            slot = %assignment.slot_name,
            pool_size,
            "evicted assignment outside the pool"
        );
    }
    Ok((state, dropped))
}

pub(crate) fn first_free_slot(state: &PoolState) -> Option<(usize, String)> {
    slot_names(state.pool_size).find(|(_, name)| state.find_by_slot(name).is_none())
}

/// In-pool assignments ordered oldest first; ties go to the lower slot index.
pub(crate) fn eviction_candidates(state: &PoolState) -> Vec<SlotAssignment> {
    let known = known_slots(state.pool_size);
    let mut candidates: Vec<SlotAssignment> = state
        .assignments
        .iter()
        .filter(|assignment| known.contains(&assignment.slot_name))
        .cloned()
        .collect();
    candidates.sort_by(|a, b| {
        a.assigned_at_utc()
            .cmp(&b.assigned_at_utc())
            .then_with(|| a.slot_index().cmp(&b.slot_index()))
    });
    candidates
}

fn select_victim(
    state: &PoolState,
    prompter: &dyn Prompter,
    request: AssignRequest<'_>,
) -> Result<SlotAssignment> {
    let mut candidates = eviction_candidates(state);

    if let Some(requested) = request.evict {
        let slot = canonical_slot_name(requested)
            .filter(|name| known_slots(state.pool_size).contains(name))
            .ok_or_else(|| PoolError::UnknownSlot {
                slot: requested.to_string(),
                pool_size: state.pool_size,
            })?;
        let victim = candidates
            .into_iter()
            .find(|candidate| candidate.slot_name == slot)
            .ok_or(PoolError::SlotNotAssigned { slot })?;
        return Ok(victim);
    }

    let pool_full = || PoolError::PoolFull {
        pool_size: state.pool_size,
        branch: request.branch.to_string(),
    };

    if candidates.is_empty() {
        return Err(pool_full().into());
    }

    if request.force {
        return Ok(candidates.remove(0));
    }

    if prompter.is_interactive() {
        return match prompter.choose_victim(request.branch, &candidates)? {
            Some(offset) if offset < candidates.len() => Ok(candidates.swap_remove(offset)),
            _ => Err(PoolError::EvictionCancelled {
                branch: request.branch.to_string(),
            }
            .into()),
        };
    }

    Err(pool_full().into())
}
