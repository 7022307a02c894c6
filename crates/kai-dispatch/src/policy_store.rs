//! Bot policy state and its settings-file persistence.
//!
//! The settings file keeps the wire layout
//! `{"mode":"public"|"private","autoViewStatus":bool}` and is rewritten
//! wholesale on every mutation before the in-memory state changes.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use kai_core::write_text_atomic;
use serde::{Deserialize, Serialize};

pub const DEFAULT_COMMAND_PREFIX: &str = ".";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
/// Global access mode. `Private` restricts every command to the owner.
pub enum BotMode {
    #[default]
    Public,
    Private,
}

impl BotMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Policy read by the dispatcher and handlers.
pub struct BotPolicyState {
    pub mode: BotMode,
    pub command_prefix: String,
    pub auto_status_view_enabled: bool,
    pub owner_identity: Option<String>,
}

impl Default for BotPolicyState {
    fn default() -> Self {
        Self {
            mode: BotMode::Public,
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            auto_status_view_enabled: true,
            owner_identity: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Partial update for the persisted policy fields.
pub struct PolicyPatch {
    pub mode: Option<BotMode>,
    pub auto_status_view_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSettings {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default, rename = "autoViewStatus")]
    auto_view_status: Option<bool>,
}

impl PersistedSettings {
    fn from_state(state: &BotPolicyState) -> Self {
        Self {
            mode: Some(state.mode.as_str().to_string()),
            auto_view_status: Some(state.auto_status_view_enabled),
        }
    }
}

#[derive(Debug)]
/// Owner of [`BotPolicyState`]. Mutations flush to the settings file, when
/// one is configured, before they become visible.
pub struct PolicyStore {
    state: RwLock<BotPolicyState>,
    /// Serializes mutations so the file write happens outside `state`.
    write_lock: Mutex<()>,
    settings_path: Option<PathBuf>,
}

impl PolicyStore {
    /// A store with no backing file. Mutations only change memory.
    pub fn in_memory(state: BotPolicyState) -> Self {
        Self {
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
            settings_path: None,
        }
    }

    /// Loads persisted fields from `settings_path` on top of `defaults`. A
    /// missing file keeps the defaults; an unreadable or malformed one is an
    /// error.
    pub fn load(settings_path: PathBuf, defaults: BotPolicyState) -> Result<Self> {
        let mut state = defaults;
        if settings_path.exists() {
            let raw = std::fs::read_to_string(&settings_path).with_context(|| {
                format!("failed to read settings file {}", settings_path.display())
            })?;
            let persisted = serde_json::from_str::<PersistedSettings>(&raw).with_context(|| {
                format!("failed to parse settings file {}", settings_path.display())
            })?;
            if let Some(raw_mode) = persisted.mode.as_deref() {
                match BotMode::parse(raw_mode) {
                    Some(mode) => state.mode = mode,
                    None => tracing::warn!(
                        mode = raw_mode,
                        path = %settings_path.display(),
                        "ignoring unknown persisted mode"
                    ),
                }
            }
            if let Some(enabled) = persisted.auto_view_status {
                state.auto_status_view_enabled = enabled;
            }
        }
        Ok(Self {
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
            settings_path: Some(settings_path),
        })
    }

    pub fn settings_path(&self) -> Option<&Path> {
        self.settings_path.as_deref()
    }

    pub fn snapshot(&self) -> BotPolicyState {
        self.read().clone()
    }

    pub fn mode(&self) -> BotMode {
        self.read().mode
    }

    pub fn command_prefix(&self) -> String {
        self.read().command_prefix.clone()
    }

    pub fn auto_status_view_enabled(&self) -> bool {
        self.read().auto_status_view_enabled
    }

    pub fn owner_identity(&self) -> Option<String> {
        self.read().owner_identity.clone()
    }

    /// Records the owner identity. Not persisted: the owner comes from the
    /// configuration or the connection itself on every start.
    pub fn set_owner_identity(&self, owner: Option<String>) {
        let owner = owner
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self.write().owner_identity = owner;
    }

    /// Applies `patch`, persisting the result first. On a persistence
    /// failure the in-memory state is left untouched. Readers are not
    /// blocked while the settings file is written.
    pub fn apply(&self, patch: PolicyPatch) -> Result<BotPolicyState> {
        let _writer = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = self.snapshot();
        if let Some(mode) = patch.mode {
            next.mode = mode;
        }
        if let Some(enabled) = patch.auto_status_view_enabled {
            next.auto_status_view_enabled = enabled;
        }
        if let Some(path) = &self.settings_path {
            persist_settings(path, &next)?;
        }
        let mut state = self.write();
        state.mode = next.mode;
        state.auto_status_view_enabled = next.auto_status_view_enabled;
        Ok(state.clone())
    }

    pub fn set_mode(&self, mode: BotMode) -> Result<BotPolicyState> {
        self.apply(PolicyPatch {
            mode: Some(mode),
            ..PolicyPatch::default()
        })
    }

    pub fn set_auto_status_view(&self, enabled: bool) -> Result<BotPolicyState> {
        self.apply(PolicyPatch {
            auto_status_view_enabled: Some(enabled),
            ..PolicyPatch::default()
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, BotPolicyState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BotPolicyState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn persist_settings(path: &Path, state: &BotPolicyState) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(&PersistedSettings::from_state(state))
        .context("failed to serialize settings")?;
    payload.push('\n');
    write_text_atomic(path, &payload)
        .with_context(|| format!("failed to write settings file {}", path.display()))
}
