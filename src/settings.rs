use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

pub const MIN_TARGET_HZ: u32 = 30;
pub const MAX_TARGET_HZ: u32 = 200;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplerSettings {
    pub target_hz: u32,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self { target_hz: 90 }
    }
}

impl SamplerSettings {
    /// Target rate clamped into the supported operating range.
    pub fn effective_hz(&self) -> u32 {
        let clamped = self.target_hz.clamp(MIN_TARGET_HZ, MAX_TARGET_HZ);
        if clamped != self.target_hz {
            warn!(
                "sampler target {} Hz outside {}..={} Hz, using {} Hz",
                self.target_hz, MIN_TARGET_HZ, MAX_TARGET_HZ, clamped
            );
        }
        clamped
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FrontendSettings {
    /// Metres.
    pub gaze_ray_length: f32,
    /// Metres.
    pub head_ray_length: f32,
    /// Treat the session as simulated input: eye tracking is never queried.
    pub force_simulator: bool,
}

impl Default for FrontendSettings {
    fn default() -> Self {
        Self {
            gaze_ray_length: 25.0,
            head_ray_length: 25.0,
            force_simulator: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CalibrationSettings {
    pub max_allowed_drift_deg: f32,
    pub samples_to_average: usize,
    pub calibrate_timeout_secs: f32,
    pub verify_timeout_secs: f32,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            max_allowed_drift_deg: 1.0,
            samples_to_average: 60,
            calibrate_timeout_secs: 2.0,
            verify_timeout_secs: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub sampler: SamplerSettings,
    pub frontend: FrontendSettings,
    pub calibration: CalibrationSettings,
}

impl PipelineSettings {
    /// Applies `PHYSIO_FORCE_SIMULATOR` on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        let forced = std::env::var("PHYSIO_FORCE_SIMULATOR")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if forced {
            self.frontend.force_simulator = true;
        }
        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<PipelineSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!(
                        "Ignoring unparseable settings in {}: {err}; using defaults",
                        path.display()
                    );
                    PipelineSettings::default()
                }
            }
        } else {
            PipelineSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> PipelineSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: PipelineSettings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: PipelineSettings = serde_json::from_str(&contents)?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &PipelineSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, PipelineSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PipelineSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let settings = store.get();
        assert_eq!(settings.sampler.target_hz, 90);
        assert_eq!(settings.calibration.samples_to_average, 60);
        assert!(!settings.frontend.force_simulator);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "sampler": { "target_hz": 120 } }"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().get();
        assert_eq!(settings.sampler.target_hz, 120);
        assert_eq!(settings.frontend.gaze_ray_length, 25.0);
        assert_eq!(settings.calibration.max_allowed_drift_deg, 1.0);
    }

    #[test]
    fn test_update_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.get();
        settings.calibration.samples_to_average = 30;
        store.update(settings.clone()).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.get(), settings);
        reopened.reload().unwrap();
        assert_eq!(reopened.get().calibration.samples_to_average, 30);
    }

    #[test]
    fn test_garbage_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(SettingsStore::new(path).unwrap().get(), PipelineSettings::default());
    }

    #[test]
    fn test_target_hz_is_clamped() {
        let low = SamplerSettings { target_hz: 5 };
        let high = SamplerSettings { target_hz: 1000 };
        assert_eq!(low.effective_hz(), MIN_TARGET_HZ);
        assert_eq!(high.effective_hz(), MAX_TARGET_HZ);
        assert_eq!(SamplerSettings::default().effective_hz(), 90);
    }
}
