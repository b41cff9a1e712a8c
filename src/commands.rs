use crate::allocator::{
    AssignOutcome, AssignRequest, PoolContext, WorktreeAction, apply_pool_size, assign_branch,
};
use crate::cli::{BranchCommand, Commands, SlotCommand};
use crate::config::Config;
use crate::constants::REPORT_BRANCH_MAX_CHARS;
use crate::error::PoolError;
use crate::git::{Git, SubprocessGit, git_branch_name_valid, repo_common_root, resolve_trunk_branch};
use crate::pool::{PoolState, PoolStore};
use crate::reconcile::{CheckOutcome, run_check};
use crate::repair::{RepairOutcome, run_repair};
use crate::slot_name::{canonical_slot_name, slot_in_pool, slot_names};
use crate::ui::{TerminalPrompter, progress, truncate};
use crate::worktrees::worktrees_dir;
use anyhow::{Result, bail};
use serde::Serialize;
use std::path::PathBuf;

pub(crate) fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Branch(BranchCommand::Create {
            branch,
            force,
            no_slot,
            evict,
        }) => cmd_branch_create(&branch, force, no_slot, evict.as_deref()),
        Commands::Slot(SlotCommand::Assign {
            branch,
            force,
            evict,
        }) => cmd_slot_assign(&branch, force, evict.as_deref()),
        Commands::Slot(SlotCommand::List { json }) => cmd_slot_list(json),
        Commands::Slot(SlotCommand::Check { json }) => cmd_slot_check(json),
        Commands::Slot(SlotCommand::Repair { force }) => cmd_slot_repair(force),
        Commands::Slot(SlotCommand::Objective { slot, issue }) => cmd_slot_objective(&slot, issue),
    }
}

/// Paths and settings shared by every pool command in one repository.
struct PoolEnv {
    repo_root: PathBuf,
    worktrees_dir: PathBuf,
    store: PoolStore,
    config: Config,
}

impl PoolEnv {
    fn discover() -> Result<Self> {
        let repo_root = repo_common_root()?;
        let config = Config::load(&repo_root)?;
        Ok(Self {
            worktrees_dir: worktrees_dir(&repo_root),
            store: PoolStore::for_repo(&repo_root),
            repo_root,
            config,
        })
    }

    /// Loads the pool, or starts an empty one sized from config, and applies
    /// a configured resize. Call with the pool lock held.
    fn load_or_init(&self) -> Result<PoolState> {
        let persisted = self.store.load()?;
        let pool_size = self
            .config
            .effective_pool_size(persisted.as_ref().map(|state| state.pool_size));
        let state = persisted.unwrap_or_else(|| PoolState::new(pool_size));
        let (state, _) = apply_pool_size(&self.store, state, pool_size)?;
        Ok(state)
    }
}

fn cmd_branch_create(branch: &str, force: bool, no_slot: bool, evict: Option<&str>) -> Result<()> {
    let env = PoolEnv::discover()?;
    let git = SubprocessGit;
    if !git_branch_name_valid(&env.repo_root, branch) {
        bail!("`{branch}` is not a valid branch name");
    }
    if git.branch_exists(&env.repo_root, branch) {
        return Err(PoolError::BranchAlreadyExists {
            branch: branch.to_string(),
        }
        .into());
    }

    if no_slot {
        let trunk = resolve_trunk_branch(&git, &env.repo_root, env.config.trunk_branch.as_deref())?;
        progress(&format!("creating branch `{branch}` from `{trunk}`"));
        git.create_branch(&env.repo_root, branch, &trunk)?;
        println!("Created branch `{branch}` (no slot assigned)");
        return Ok(());
    }

    assign_into_pool(&env, &git, branch, force, evict)
}

fn cmd_slot_assign(branch: &str, force: bool, evict: Option<&str>) -> Result<()> {
    let env = PoolEnv::discover()?;
    let git = SubprocessGit;
    if !git_branch_name_valid(&env.repo_root, branch) {
        bail!("`{branch}` is not a valid branch name");
    }
    assign_into_pool(&env, &git, branch, force, evict)
}

fn assign_into_pool(
    env: &PoolEnv,
    git: &dyn Git,
    branch: &str,
    force: bool,
    evict: Option<&str>,
) -> Result<()> {
    let _lock = env.store.lock()?;
    let state = env.load_or_init()?;
    let trunk = resolve_trunk_branch(git, &env.repo_root, env.config.trunk_branch.as_deref())?;
    let ctx = PoolContext {
        git,
        store: &env.store,
        repo_root: &env.repo_root,
        worktrees_dir: &env.worktrees_dir,
        trunk_branch: &trunk,
    };
    let request = AssignRequest {
        branch,
        force: force || evict.is_some(),
        evict,
    };

    let (outcome, _) = assign_branch(&ctx, &TerminalPrompter, state, request)?;
    match &outcome {
        AssignOutcome::AlreadyAssigned(existing) => {
            progress(&format!(
                "`{branch}` is already assigned to {}",
                existing.slot_name
            ));
        }
        AssignOutcome::Assigned {
            assignment, action, ..
        } => {
            let verb = match action {
                WorktreeAction::Added => "created",
                WorktreeAction::CheckedOut => "reused",
            };
            progress(&format!(
                "assigned `{branch}` to {} ({verb} worktree)",
                assignment.slot_name
            ));
        }
    }
    println!("{}", outcome.worktree_path().display());
    Ok(())
}

#[derive(Debug, Serialize)]
struct JsonSlotRow {
    slot_name: String,
    in_pool: bool,
    branch_name: Option<String>,
    assigned_at: Option<String>,
    worktree_path: Option<String>,
    last_objective_issue: Option<u64>,
}

fn slot_rows(state: &PoolState) -> Vec<JsonSlotRow> {
    let mut rows: Vec<JsonSlotRow> = slot_names(state.pool_size)
        .map(|(_, name)| {
            let assignment = state.find_by_slot(&name);
            JsonSlotRow {
                in_pool: true,
                branch_name: assignment.map(|a| a.branch_name.clone()),
                assigned_at: assignment.map(|a| a.assigned_at.clone()),
                worktree_path: assignment.map(|a| a.worktree_path.display().to_string()),
                last_objective_issue: state
                    .slot_info(&name)
                    .and_then(|info| info.last_objective_issue),
                slot_name: name,
            }
        })
        .collect();

    for assignment in state
        .assignments
        .iter()
        .filter(|assignment| !slot_in_pool(&assignment.slot_name, state.pool_size))
    {
        rows.push(JsonSlotRow {
            slot_name: assignment.slot_name.clone(),
            in_pool: false,
            branch_name: Some(assignment.branch_name.clone()),
            assigned_at: Some(assignment.assigned_at.clone()),
            worktree_path: Some(assignment.worktree_path.display().to_string()),
            last_objective_issue: state
                .slot_info(&assignment.slot_name)
                .and_then(|info| info.last_objective_issue),
        });
    }
    rows
}

fn cmd_slot_list(as_json: bool) -> Result<()> {
    let env = PoolEnv::discover()?;
    let Some(state) = env.store.load()? else {
        println!("No pool configured ({} does not exist)", env.store.path().display());
        return Ok(());
    };
    let rows = slot_rows(&state);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "Pool: {} slots, {} assignments",
        state.pool_size,
        state.assignments.len()
    );
    println!("{:<16} {:<40} {:<10} ASSIGNED", "SLOT", "BRANCH", "OBJECTIVE");
    for row in rows {
        let slot = if row.in_pool {
            row.slot_name
        } else {
            format!("{} (outside pool)", row.slot_name)
        };
        let objective = row
            .last_objective_issue
            .map(|issue| format!("#{issue}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {:<40} {:<10} {}",
            slot,
            truncate(
                row.branch_name.as_deref().unwrap_or("-"),
                REPORT_BRANCH_MAX_CHARS
            ),
            objective,
            row.assigned_at.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn cmd_slot_check(as_json: bool) -> Result<()> {
    let env = PoolEnv::discover()?;
    progress("check: comparing pool.json, slot directories and git worktrees");
    match run_check(&SubprocessGit, &env.repo_root, &env.store, &env.worktrees_dir)? {
        CheckOutcome::NoPool { path } => Err(PoolError::NoPoolConfigured { path }.into()),
        CheckOutcome::Report(report) => {
            if as_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.render());
            }
            if !report.is_clean() {
                eprintln!("hint: `erk slot repair` clears orphan-state entries; other issues need manual review");
            }
            Ok(())
        }
    }
}

fn cmd_slot_repair(force: bool) -> Result<()> {
    let env = PoolEnv::discover()?;
    match run_repair(&env.store, &TerminalPrompter, force)? {
        RepairOutcome::NoPool { path } => Err(PoolError::NoPoolConfigured { path }.into()),
        RepairOutcome::NothingToRepair => {
            println!("Nothing to repair: every assignment has a worktree directory.");
            Ok(())
        }
        RepairOutcome::Declined { stale } => {
            println!(
                "Repair cancelled; {} stale assignment(s) left in place.",
                stale.len()
            );
            Ok(())
        }
        RepairOutcome::Repaired { removed } => {
            for assignment in &removed {
                println!(
                    "Removed {} -> `{}` ({} missing)",
                    assignment.slot_name,
                    assignment.branch_name,
                    assignment.worktree_path.display()
                );
            }
            println!("Repaired {} stale assignment(s).", removed.len());
            Ok(())
        }
    }
}

fn cmd_slot_objective(slot: &str, issue: Option<u64>) -> Result<()> {
    let env = PoolEnv::discover()?;
    let unknown_slot = |pool_size| PoolError::UnknownSlot {
        slot: slot.to_string(),
        pool_size,
    };

    let Some(issue) = issue else {
        let state = env.store.load_required()?;
        let name = canonical_slot_name(slot).ok_or_else(|| unknown_slot(state.pool_size))?;
        match state
            .slot_info(&name)
            .and_then(|info| info.last_objective_issue)
        {
            Some(issue) => println!("{name}: last objective issue #{issue}"),
            None => println!("{name}: no objective recorded"),
        }
        return Ok(());
    };

    if !env.store.exists() {
        return Err(PoolError::NoPoolConfigured {
            path: env.store.path().to_path_buf(),
        }
        .into());
    }
    let _lock = env.store.lock()?;
    let mut state = env.load_or_init()?;
    let name = canonical_slot_name(slot)
        .filter(|name| slot_in_pool(name, state.pool_size))
        .ok_or_else(|| unknown_slot(state.pool_size))?;
    state.slot_info_mut(&name).last_objective_issue = Some(issue);
    env.store.save(&state)?;
    println!("{name}: last objective issue set to #{issue}");
    Ok(())
}
