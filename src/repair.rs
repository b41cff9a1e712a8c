//! Clears assignments whose worktree directory is gone. Every other kind of
//! drift needs a human to decide and is left alone.

use crate::error::PoolError;
use crate::pool::{PoolState, PoolStore, SlotAssignment};
use crate::ui::Prompter;
use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RepairOutcome {
    NoPool { path: PathBuf },
    NothingToRepair,
    Declined { stale: Vec<SlotAssignment> },
    Repaired { removed: Vec<SlotAssignment> },
}

pub(crate) fn find_stale_assignments(state: &PoolState) -> Vec<SlotAssignment> {
    state
        .assignments
        .iter()
        .filter(|assignment| !assignment.worktree_path.exists())
        .cloned()
        .collect()
}

pub(crate) fn run_repair(
    store: &PoolStore,
    prompter: &dyn Prompter,
    force: bool,
) -> Result<RepairOutcome> {
    let no_pool = || RepairOutcome::NoPool {
        path: store.path().to_path_buf(),
    };
    if !store.exists() {
        return Ok(no_pool());
    }
    let _lock = store.lock()?;
    let Some(mut state) = store.load()? else {
        return Ok(no_pool());
    };

    let stale = find_stale_assignments(&state);
    if stale.is_empty() {
        tracing::debug!("no stale assignments");
        return Ok(RepairOutcome::NothingToRepair);
    }

    if !force {
        if !prompter.is_interactive() {
            return Err(PoolError::ConfirmationRequired { count: stale.len() }.into());
        }
        for assignment in &stale {
            eprintln!(
                "  {} -> `{}` ({} is missing)",
                assignment.slot_name,
                assignment.branch_name,
                assignment.worktree_path.display()
            );
        }
        let question = format!("Remove {} stale assignment(s)?", stale.len());
        if !prompter.confirm(&question)? {
            return Ok(RepairOutcome::Declined { stale });
        }
    }

    state
        .assignments
        .retain(|assignment| !stale.contains(assignment));
    store.save(&state)?;
    for assignment in &stale {
        tracing::info!(
            slot = %assignment.slot_name,
            branch = %assignment.branch_name,
            "removed stale assignment"
        );
    }
    Ok(RepairOutcome::Repaired { removed: stale })
}
