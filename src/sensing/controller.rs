use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::Sender;
use log::info;
use tokio_util::sync::CancellationToken;

use crate::metrics::SamplerMetrics;
use crate::models::PhysioSample;

use super::clock::StudyClock;
use super::loop_worker::{sampler_loop, SamplerLoop};
use super::snapshot::SnapshotCell;

const SAMPLER_THREAD_NAME: &str = "physio-sampler";

/// Owns the background sampler thread for one tracked trial.
pub struct SamplerController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    hz: u32,
    metrics: SamplerMetrics,
}

impl SamplerController {
    pub fn new(hz: u32) -> Self {
        Self {
            handle: None,
            cancel_token: None,
            hz,
            metrics: SamplerMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &SamplerMetrics {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start_sampling(
        &mut self,
        cell: SnapshotCell,
        sink: Sender<PhysioSample>,
        clock: &StudyClock,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("sampler already active");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();
        let config = SamplerLoop {
            cell,
            sink,
            hz: self.hz,
            base_secs: clock.now_secs(),
            metrics: self.metrics.clone(),
        };

        info!("starting sampler at {} Hz", self.hz);
        let handle = thread::Builder::new()
            .name(SAMPLER_THREAD_NAME.to_string())
            .spawn(move || sampler_loop(config, token_clone))
            .context("failed to spawn sampler thread")?;

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancels the loop and blocks until the thread has exited. Every sample the
    /// loop sent is in the channel once this returns.
    pub fn stop_sampling(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("sampler thread panicked"))
                .context("sampler thread failed to join")
        } else {
            Ok(())
        }
    }
}

impl Drop for SamplerController {
    fn drop(&mut self) {
        let _ = self.stop_sampling();
    }
}
