use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "erk",
    version,
    about = "Reusable git worktree slots for agent-assisted branch workflows"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Create branches and place them in the worktree pool.
    #[command(subcommand, alias = "br")]
    Branch(BranchCommand),
    /// Inspect and maintain the worktree slot pool.
    #[command(subcommand)]
    Slot(SlotCommand),
}

#[derive(Debug, Subcommand)]
pub(crate) enum BranchCommand {
    /// Create a new branch from trunk and assign it to a pool slot.
    Create {
        branch: String,
        /// Evict the oldest assignment if the pool is full.
        #[arg(long)]
        force: bool,
        /// Only create the branch; do not assign a slot.
        #[arg(long, conflicts_with_all = ["force", "evict"])]
        no_slot: bool,
        /// Evict this slot if the pool is full.
        #[arg(long, value_name = "SLOT")]
        evict: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub(crate) enum SlotCommand {
    /// Assign a branch (existing or new) to a pool slot.
    Assign {
        branch: String,
        /// Evict the oldest assignment if the pool is full.
        #[arg(long)]
        force: bool,
        /// Evict this slot if the pool is full.
        #[arg(long, value_name = "SLOT")]
        evict: Option<String>,
    },
    /// Show slot assignments as recorded in pool.json.
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        json: bool,
    },
    /// Compare pool.json, slot directories and git's worktree registry.
    Check {
        #[arg(long)]
        json: bool,
    },
    /// Remove assignments whose worktree directory no longer exists.
    Repair {
        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },
    /// Show or set the last objective issue worked on in a slot.
    Objective {
        slot: String,
        #[arg(long)]
        issue: Option<u64>,
    },
}
