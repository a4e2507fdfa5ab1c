use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

pub const DEFAULT_MODEL: &str = "ep-20251120104157-fxtrj";
pub const DEFAULT_GATEWAY_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";
pub const API_KEY_ENV: &str = "ARK_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Maximum span between the first and last segment start of one batch.
    pub batch_duration_minutes: u64,
    pub check_interval_secs: u64,
    /// Page size when fetching pending segments.
    pub pending_limit: u32,
    pub model: String,
    /// Skip the inference gateway and emit canned observations/cards.
    pub debug_mode: bool,
    pub retention_days: u32,
    /// Where merged batch videos are written.
    pub output_dir: PathBuf,
    pub request_timeout_secs: u64,
}

impl AnalysisSettings {
    pub fn batch_duration_secs(&self) -> i64 {
        i64::try_from(self.batch_duration_minutes.saturating_mul(60)).unwrap_or(i64::MAX)
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            batch_duration_minutes: 15,
            check_interval_secs: 60,
            pending_limit: 100,
            model: DEFAULT_MODEL.into(),
            debug_mode: false,
            retention_days: 3,
            output_dir: PathBuf::from("./recordings"),
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewaySettings {
    pub base_url: String,
    /// Empty means "use the ARK_API_KEY environment variable".
    pub api_key: String,
}

impl GatewaySettings {
    pub fn resolved_api_key(&self) -> Option<String> {
        if !self.api_key.is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty())
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_URL.into(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserSettings {
    pub analysis: AnalysisSettings,
    pub gateway: GatewaySettings,
    pub database_path: PathBuf,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            analysis: AnalysisSettings::default(),
            gateway: GatewaySettings::default(),
            database_path: PathBuf::from("./workday.db"),
        }
    }
}

/// Shared settings handle. The pipeline takes a fresh snapshot at the start of
/// every pass, so edits land on the next cycle without a restart.
pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring malformed settings file {}: {err}",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Settings that are never written to disk.
    pub fn in_memory(settings: UserSettings) -> Self {
        Self {
            path: None,
            data: RwLock::new(settings),
        }
    }

    pub fn snapshot(&self) -> UserSettings {
        self.read().clone()
    }

    pub fn analysis(&self) -> AnalysisSettings {
        self.read().analysis.clone()
    }

    pub fn gateway(&self) -> GatewaySettings {
        self.read().gateway.clone()
    }

    pub fn update_analysis(&self, settings: AnalysisSettings) -> Result<()> {
        let mut guard = self.write();
        guard.analysis = settings;
        self.persist(&guard)
    }

    pub fn update_gateway(&self, settings: GatewaySettings) -> Result<()> {
        let mut guard = self.write();
        guard.gateway = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.snapshot(), UserSettings::default());
        assert_eq!(store.analysis().batch_duration_secs(), 900);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"analysis": {"debug_mode": true, "batch_duration_minutes": 5}}"#)
            .unwrap();

        let store = SettingsStore::new(path).unwrap();
        let analysis = store.analysis();
        assert!(analysis.debug_mode);
        assert_eq!(analysis.batch_duration_secs(), 300);
        assert_eq!(analysis.retention_days, 3);
        assert_eq!(store.gateway().base_url, DEFAULT_GATEWAY_URL);
    }

    #[test]
    fn updates_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut analysis = store.analysis();
        analysis.model = "vision-lite".into();
        store.update_analysis(analysis).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.analysis().model, "vision-lite");
        reopened.reload().unwrap();
        assert_eq!(reopened.analysis().model, "vision-lite");
    }

    #[test]
    fn explicit_api_key_wins_over_environment() {
        let gateway = GatewaySettings {
            base_url: DEFAULT_GATEWAY_URL.into(),
            api_key: "configured".into(),
        };
        assert_eq!(gateway.resolved_api_key().as_deref(), Some("configured"));
    }
}
