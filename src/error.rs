use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub(crate) enum PoolError {
    #[error("no pool configured: {} does not exist; assign a branch with `erk slot assign <branch>` to create it", path.display())]
    NoPoolConfigured { path: PathBuf },

    #[error("pool is full ({pool_size} slots) and `{branch}` cannot be assigned; rerun with --force to evict the oldest assignment")]
    PoolFull { pool_size: usize, branch: String },

    #[error("eviction cancelled; `{branch}` was not assigned")]
    EvictionCancelled { branch: String },

    #[error("slot `{slot}` has no assignment to evict")]
    SlotNotAssigned { slot: String },

    #[error("`{slot}` is not a slot of this pool (pool size {pool_size})")]
    UnknownSlot { slot: String, pool_size: usize },

    #[error("{count} stale assignment(s) need confirmation; rerun with --force in non-interactive shells")]
    ConfirmationRequired { count: usize },

    #[error("branch `{branch}` already exists; use `erk slot assign {branch}` to place it in the pool")]
    BranchAlreadyExists { branch: String },

    #[error("pool size must be a positive integer (got {value})")]
    InvalidPoolSize { value: String },

    #[error("{slot} directory {} exists but is not a registered git worktree; remove it or run `git worktree prune`", path.display())]
    UnregisteredSlotDir { slot: String, path: PathBuf },

    #[error("{} has unsupported version `{version}`", path.display())]
    UnsupportedVersion { path: PathBuf, version: String },
}
