use std::sync::Arc;

use nalgebra::UnitQuaternion;
use tokio::sync::watch;

use crate::models::CalibrationResult;

/// Process-wide current drift correction.
///
/// Starts with no correction (identity). The calibrator replaces it on every
/// published run; frontends hold a [`CorrectionReader`] and copy the offset
/// once per frame.
#[derive(Clone)]
pub struct DriftCorrection {
    tx: Arc<watch::Sender<Option<CalibrationResult>>>,
}

impl Default for DriftCorrection {
    fn default() -> Self {
        Self::new()
    }
}

impl DriftCorrection {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, result: CalibrationResult) {
        self.tx.send_replace(Some(result));
    }

    /// Back to identity; the next frame runs uncorrected.
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    pub fn current(&self) -> Option<CalibrationResult> {
        self.tx.borrow().clone()
    }

    pub fn has_offset(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn reader(&self) -> CorrectionReader {
        CorrectionReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side handed to the frontend.
#[derive(Clone)]
pub struct CorrectionReader {
    rx: watch::Receiver<Option<CalibrationResult>>,
}

impl CorrectionReader {
    pub fn offset(&self) -> UnitQuaternion<f32> {
        self.rx
            .borrow()
            .as_ref()
            .map(|result| result.offset)
            .unwrap_or_else(UnitQuaternion::identity)
    }

    pub fn current(&self) -> Option<CalibrationResult> {
        self.rx.borrow().clone()
    }
}
