use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backup::WorkflowOptions;
use crate::git::{DEFAULT_BRANCH, DEFAULT_PUSH_ATTEMPTS, RetryPolicy};
use crate::merge::{MergeEngine, TieBreakPolicy};

pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_MEMORY_FILE: &str = ".memory/store.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// `source_host` for entries recorded here; the machine hostname if unset.
    pub host: Option<String>,
    pub sync: SyncConfig,
    pub merge: MergeConfig,
    pub backup: BackupConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn host(&self) -> String {
        match self.host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => default_host(),
        }
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.backup
            .dir
            .clone()
            .unwrap_or_else(crate::paths::backups_dir)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.logging
            .file
            .dir
            .clone()
            .unwrap_or_else(crate::paths::log_dir)
    }

    /// Memory file on disk inside `repo_root`.
    pub fn local_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.sync.file)
    }

    pub fn workflow_options(&self, repo_root: &Path) -> WorkflowOptions {
        let mut options = WorkflowOptions::new(
            self.host(),
            repo_root,
            self.sync.file.clone(),
            self.backup_dir(),
        );
        options.engine = MergeEngine::new(self.merge.tie_break);
        options.fetch_retry = self.sync.fetch_retry;
        options.push_retry = self.sync.push_retry;
        options.max_push_attempts = self.sync.max_push_attempts;
        options
    }
}

/// Machine hostname, with id delimiters replaced so it can head an entry id.
pub fn default_host() -> String {
    let raw = whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_string());
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            crate::core::ID_DELIMITER | crate::core::SIBLING_MARKER => '-',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "localhost".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub remote: String,
    pub branch: String,
    /// Repository-relative path of the memory file.
    pub file: String,
    pub max_push_attempts: u32,
    pub fetch_retry: RetryPolicy,
    pub push_retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote: DEFAULT_REMOTE.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            file: DEFAULT_MEMORY_FILE.to_string(),
            max_push_attempts: DEFAULT_PUSH_ATTEMPTS,
            fetch_retry: RetryPolicy::default(),
            push_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MergeConfig {
    pub tie_break: TieBreakPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BackupConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Tree,
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Daily,
    Hourly,
    Minutely,
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub stdout_format: LogFormat,
    pub filter: Option<String>,
    pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stdout_format: LogFormat::Tree,
            filter: None,
            file: FileLoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub rotation: LogRotation,
    pub retention_max_age_days: Option<u64>,
    pub retention_max_files: Option<usize>,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            format: LogFormat::Json,
            rotation: LogRotation::Daily,
            retention_max_age_days: Some(7),
            retention_max_files: Some(10),
        }
    }
}

// =============================================================================
// Partial layers (user file, repo file)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigLayer {
    pub host: Option<String>,
    pub sync: SyncConfigOverride,
    pub merge: MergeConfigOverride,
    pub backup: BackupConfig,
    pub logging: LoggingConfigOverride,
}

impl ConfigLayer {
    pub fn apply_to(&self, base: &mut Config) {
        if let Some(host) = self.host.as_ref() {
            base.host = Some(host.clone());
        }
        self.sync.apply_to(&mut base.sync);
        self.merge.apply_to(&mut base.merge);
        if let Some(dir) = self.backup.dir.as_ref() {
            base.backup.dir = Some(dir.clone());
        }
        self.logging.apply_to(&mut base.logging);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SyncConfigOverride {
    pub remote: Option<String>,
    pub branch: Option<String>,
    pub file: Option<String>,
    pub max_push_attempts: Option<u32>,
    pub fetch_retry: Option<RetryPolicy>,
    pub push_retry: Option<RetryPolicy>,
}

impl SyncConfigOverride {
    pub fn apply_to(&self, target: &mut SyncConfig) {
        if let Some(remote) = self.remote.as_ref() {
            target.remote = remote.clone();
        }
        if let Some(branch) = self.branch.as_ref() {
            target.branch = branch.clone();
        }
        if let Some(file) = self.file.as_ref() {
            target.file = file.clone();
        }
        if let Some(attempts) = self.max_push_attempts {
            target.max_push_attempts = attempts;
        }
        if let Some(policy) = self.fetch_retry {
            target.fetch_retry = policy;
        }
        if let Some(policy) = self.push_retry {
            target.push_retry = policy;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MergeConfigOverride {
    pub tie_break: Option<TieBreakPolicy>,
}

impl MergeConfigOverride {
    pub fn apply_to(&self, target: &mut MergeConfig) {
        if let Some(policy) = self.tie_break {
            target.tie_break = policy;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfigOverride {
    pub stdout: Option<bool>,
    pub stdout_format: Option<LogFormat>,
    pub filter: Option<String>,
    pub file: Option<FileLoggingConfigOverride>,
}

impl LoggingConfigOverride {
    pub fn apply_to(&self, target: &mut LoggingConfig) {
        if let Some(stdout) = self.stdout {
            target.stdout = stdout;
        }
        if let Some(format) = self.stdout_format {
            target.stdout_format = format;
        }
        if let Some(filter) = self.filter.as_ref() {
            target.filter = Some(filter.clone());
        }
        if let Some(file) = self.file.as_ref() {
            file.apply_to(&mut target.file);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileLoggingConfigOverride {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
    pub format: Option<LogFormat>,
    pub rotation: Option<LogRotation>,
    pub retention_max_age_days: Option<u64>,
    pub retention_max_files: Option<usize>,
}

impl FileLoggingConfigOverride {
    pub fn apply_to(&self, target: &mut FileLoggingConfig) {
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(dir) = self.dir.as_ref() {
            target.dir = Some(dir.clone());
        }
        if let Some(format) = self.format {
            target.format = format;
        }
        if let Some(rotation) = self.rotation {
            target.rotation = rotation;
        }
        if let Some(days) = self.retention_max_age_days {
            target.retention_max_age_days = Some(days);
        }
        if let Some(files) = self.retention_max_files {
            target.retention_max_files = Some(files);
        }
    }
}
