use std::time::Duration;

use log::warn;

use crate::settings::CalibrationSettings;

/// Smallest verification batch regardless of `samples_to_average`.
const MIN_VERIFY_SAMPLES: usize = 15;

/// Tunables for one drift calibration run.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// Raw error above this many degrees labels the run `corrected`.
    pub max_allowed_drift_deg: f32,

    /// Calibration batch size; the verification batch is derived from it.
    pub samples_to_average: usize,

    pub calibrate_timeout: Duration,
    pub verify_timeout: Duration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self::from(&CalibrationSettings::default())
    }
}

impl From<&CalibrationSettings> for CalibrationConfig {
    fn from(settings: &CalibrationSettings) -> Self {
        let defaults = CalibrationSettings::default();
        Self {
            max_allowed_drift_deg: settings.max_allowed_drift_deg,
            samples_to_average: settings.samples_to_average.max(1),
            calibrate_timeout: timeout_from_secs(
                "calibrate_timeout_secs",
                settings.calibrate_timeout_secs,
                defaults.calibrate_timeout_secs,
            ),
            verify_timeout: timeout_from_secs(
                "verify_timeout_secs",
                settings.verify_timeout_secs,
                defaults.verify_timeout_secs,
            ),
        }
    }
}

/// Negative values clamp to zero; NaN or values a `Duration` cannot hold fall
/// back to the default.
fn timeout_from_secs(name: &str, secs: f32, default_secs: f32) -> Duration {
    if secs <= 0.0 {
        return Duration::ZERO;
    }
    match Duration::try_from_secs_f32(secs) {
        Ok(timeout) => timeout,
        Err(err) => {
            warn!("Ignoring calibration {name} = {secs}: {err}; using {default_secs}s");
            Duration::from_secs_f32(default_secs)
        }
    }
}

impl CalibrationConfig {
    pub fn verify_samples(&self) -> usize {
        MIN_VERIFY_SAMPLES.max(self.samples_to_average / 2)
    }
}
