//! Pool state persistence.
//!
//! `pool.json` lives under `<repo>/.erk/`. Every mutation rewrites the whole
//! document through a temp file and a rename, while a sibling `pool.json.lock`
//! serializes read-modify-write cycles between `erk` processes.

use crate::constants::{
    ERK_DIR, POOL_STATE_FILE, POOL_STATE_MAJOR_VERSION, POOL_STATE_VERSION,
};
use crate::error::PoolError;
use crate::slot_name::{canonical_slot_name, is_legacy_slot_name, parse_slot_index, slot_in_pool};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SlotAssignment {
    pub(crate) slot_name: String,
    pub(crate) branch_name: String,
    pub(crate) assigned_at: String,
    pub(crate) worktree_path: PathBuf,
}

impl SlotAssignment {
    pub(crate) fn new(slot_name: &str, branch_name: &str, worktree_path: &Path) -> Self {
        Self {
            slot_name: slot_name.to_string(),
            branch_name: branch_name.to_string(),
            assigned_at: now_timestamp(),
            worktree_path: worktree_path.to_path_buf(),
        }
    }

    pub(crate) fn slot_index(&self) -> Option<usize> {
        parse_slot_index(&self.slot_name)
    }

    /// Unparseable timestamps sort as the oldest so they are evicted first.
    pub(crate) fn assigned_at_utc(&self) -> DateTime<Utc> {
        parse_timestamp(&self.assigned_at).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SlotInfo {
    pub(crate) name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) last_objective_issue: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PoolState {
    pub(crate) version: String,
    pub(crate) pool_size: usize,
    #[serde(default)]
    pub(crate) slots: Vec<SlotInfo>,
    #[serde(default)]
    pub(crate) assignments: Vec<SlotAssignment>,
}

impl PoolState {
    pub(crate) fn new(pool_size: usize) -> Self {
        Self {
            version: POOL_STATE_VERSION.to_string(),
            pool_size,
            slots: Vec::new(),
            assignments: Vec::new(),
        }
    }

    pub(crate) fn find_by_branch(&self, branch: &str) -> Option<&SlotAssignment> {
        self.assignments
            .iter()
            .find(|assignment| assignment.branch_name == branch)
    }

    pub(crate) fn find_by_slot(&self, slot_name: &str) -> Option<&SlotAssignment> {
        self.assignments
            .iter()
            .find(|assignment| assignment.slot_name == slot_name)
    }

    pub(crate) fn remove_assignment(&mut self, slot_name: &str) -> Option<SlotAssignment> {
        let position = self
            .assignments
            .iter()
            .position(|assignment| assignment.slot_name == slot_name)?;
        Some(self.assignments.remove(position))
    }

    pub(crate) fn slot_info(&self, slot_name: &str) -> Option<&SlotInfo> {
        self.slots.iter().find(|info| info.name == slot_name)
    }

    pub(crate) fn slot_info_mut(&mut self, slot_name: &str) -> &mut SlotInfo {
        let position = match self.slots.iter().position(|info| info.name == slot_name) {
            Some(position) => position,
            None => {
                self.slots.push(SlotInfo {
                    name: slot_name.to_string(),
                    last_objective_issue: None,
                });
                self.slots
                    .sort_by_key(|info| parse_slot_index(&info.name).unwrap_or(usize::MAX));
                self.slots
                    .iter()
                    .position(|info| info.name == slot_name)
                    .unwrap_or(self.slots.len() - 1)
            }
        };
        &mut self.slots[position]
    }

    /// Sets the pool size and drops assignments whose slot no longer fits.
    /// Returns the dropped assignments.
    pub(crate) fn resize(&mut self, pool_size: usize) -> Vec<SlotAssignment> {
        self.pool_size = pool_size;
        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.assignments)
            .into_iter()
            .partition(|assignment| slot_in_pool(&assignment.slot_name, pool_size));
        self.assignments = kept;
        dropped
    }

    /// Rewrites legacy slot names to the canonical prefix. Returns how many
    /// names changed. Two assignments that land on one slot collapse into the
    /// newer one.
    pub(crate) fn migrate_legacy_slot_names(&mut self) -> usize {
        let mut migrated = 0usize;
        let mut assignments: Vec<SlotAssignment> = Vec::with_capacity(self.assignments.len());
        for mut assignment in std::mem::take(&mut self.assignments) {
            if is_legacy_slot_name(&assignment.slot_name)
                && let Some(canonical) = canonical_slot_name(&assignment.slot_name)
            {
                assignment.slot_name = canonical;
                migrated += 1;
            }
            match assignments
                .iter_mut()
                .find(|existing| existing.slot_name == assignment.slot_name)
            {
                Some(existing) => {
                    if assignment.assigned_at_utc() > existing.assigned_at_utc() {
                        std::mem::swap(existing, &mut assignment);
                    }
                    tracing::warn!(
                        slot = %existing.slot_name,
                        kept = %existing.branch_name,
                        dropped = %assignment.branch_name,
                        "slot had two assignments; keeping the newest"
                    );
                }
                None => assignments.push(assignment),
            }
        }
        self.assignments = assignments;

        let mut slots: Vec<SlotInfo> = Vec::with_capacity(self.slots.len());
        for mut info in std::mem::take(&mut self.slots) {
            if is_legacy_slot_name(&info.name)
                && let Some(canonical) = canonical_slot_name(&info.name)
            {
                info.name = canonical;
                migrated += 1;
            }
            match slots.iter_mut().find(|existing| existing.name == info.name) {
                Some(existing) => {
                    if existing.last_objective_issue.is_none() {
                        existing.last_objective_issue = info.last_objective_issue;
                    }
                }
                None => slots.push(info),
            }
        }
        self.slots = slots;
        migrated
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PoolStore {
    path: PathBuf,
}

/// Held for the duration of a read-modify-write cycle; dropping it unlocks.
#[derive(Debug)]
pub(crate) struct PoolLock {
    _file: File,
}

impl PoolStore {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn for_repo(repo_root: &Path) -> Self {
        Self::new(repo_root.join(ERK_DIR).join(POOL_STATE_FILE))
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub(crate) fn load(&self) -> Result<Option<PoolState>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()));
            }
        };

        let mut state: PoolState = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        if !version_supported(&state.version) {
            return Err(PoolError::UnsupportedVersion {
                path: self.path.clone(),
                version: state.version,
            }
            .into());
        }
        if state.pool_size == 0 {
            return Err(PoolError::InvalidPoolSize {
                value: state.pool_size.to_string(),
            })
            .with_context(|| format!("invalid pool_size in {}", self.path.display()));
        }

        let migrated = state.migrate_legacy_slot_names();
        if migrated > 0 {
            tracing::info!(
                migrated,
                path = %self.path.display(),
                "migrated legacy slot names"
            );
        }
        Ok(Some(state))
    }

    /// Like `load`, but absence is a `NoPoolConfigured` error.
    pub(crate) fn load_required(&self) -> Result<PoolState> {
        self.load()?.ok_or_else(|| {
            PoolError::NoPoolConfigured {
                path: self.path.clone(),
            }
            .into()
        })
    }

    pub(crate) fn save(&self, state: &PoolState) -> Result<()> {
        self.ensure_parent_dir()?;
        let mut contents = serde_json::to_string_pretty(state)
            .context("failed to serialize pool state")?;
        contents.push('\n');

        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut temp_file = File::create(&temp_path)
                .with_context(|| format!("failed to create {}", temp_path.display()))?;
            temp_file
                .write_all(contents.as_bytes())
                .with_context(|| format!("failed to write {}", temp_path.display()))?;
            temp_file
                .sync_all()
                .with_context(|| format!("failed to sync {}", temp_path.display()))?;
        }
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        tracing::debug!(
            path = %self.path.display(),
            assignments = state.assignments.len(),
            "saved pool state"
        );
        Ok(())
    }

    pub(crate) fn lock(&self) -> Result<PoolLock> {
        self.ensure_parent_dir()?;
        let lock_path = self.path.with_extension("json.lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("failed to open {}", lock_path.display()))?;
        FileExt::lock_exclusive(&file)
            .with_context(|| format!("failed to lock {}", lock_path.display()))?;
        tracing::debug!(path = %lock_path.display(), "acquired pool lock");
        Ok(PoolLock { _file: file })
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        Ok(())
    }
}

pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn version_supported(version: &str) -> bool {
    version
        .split('.')
        .next()
        .and_then(|major| major.trim().parse::<u64>().ok())
        .is_some_and(|major| major <= POOL_STATE_MAJOR_VERSION)
}
