pub(crate) const ERK_DIR: &str = ".erk";
pub(crate) const WORKTREES_DIR: &str = ".worktrees";
pub(crate) const POOL_STATE_FILE: &str = "pool.json";
pub(crate) const POOL_STATE_VERSION: &str = "1.0";
pub(crate) const POOL_STATE_MAJOR_VERSION: u64 = 1;
pub(crate) const CONFIG_FILE: &str = "config.toml";

pub(crate) const DEFAULT_POOL_SIZE: usize = 4;
pub(crate) const POOL_SIZE_ENV: &str = "ERK_POOL_SIZE";
pub(crate) const LOG_FILTER_ENV: &str = "ERK_LOG";
pub(crate) const DEFAULT_LOG_FILTER: &str = "warn";

pub(crate) const SLOT_PREFIX: &str = "erk-slot";
pub(crate) const LEGACY_SLOT_PREFIX: &str = "erk-managed-wt";
pub(crate) const SLOT_INDEX_WIDTH: usize = 2;

pub(crate) const TRUNK_FALLBACKS: &[&str] = &["main", "master"];

pub(crate) const REPORT_BRANCH_MAX_CHARS: usize = 40;
pub(crate) const TRUNCATE_ELLIPSIS_CHARS: usize = 3;
