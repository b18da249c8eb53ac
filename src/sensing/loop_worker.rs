use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use tokio_util::sync::CancellationToken;

use crate::metrics::{SamplerMetrics, TickMetrics};
use crate::models::PhysioSample;

use super::snapshot::SnapshotCell;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Remaining wait above which the loop sleeps instead of spinning.
const COARSE_SLEEP_THRESHOLD: Duration = Duration::from_millis(1);
/// Slack left between the coarse sleep and the deadline for the spin phase.
const SPIN_MARGIN: Duration = Duration::from_micros(500);

pub struct SamplerLoop {
    pub cell: SnapshotCell,
    pub sink: Sender<PhysioSample>,
    pub hz: u32,
    /// Study-clock reading at activation; added to the loop's own stopwatch.
    pub base_secs: f64,
    pub metrics: SamplerMetrics,
}

impl SamplerLoop {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.hz.max(1)))
    }
}

/// Fixed-rate resampling loop. Runs on a dedicated thread until `cancel_token`
/// fires or the receiving side of `sink` is dropped.
pub fn sampler_loop(config: SamplerLoop, cancel_token: CancellationToken) {
    let period = config.period();
    let stopwatch = Instant::now();
    let mut next_tick = period;

    log_info!("sampler loop started at {} Hz", config.hz);

    while !cancel_token.is_cancelled() {
        if !wait_until(stopwatch, next_tick, &cancel_token) {
            break;
        }

        let elapsed = stopwatch.elapsed();
        let lateness = elapsed.saturating_sub(next_tick);
        let tick = capture_tick(&config, elapsed);

        if let Some(sample) = tick.sample {
            if config.sink.send(sample).is_err() {
                log_warn!("sampler sink disconnected, stopping loop");
                break;
            }
        }

        config.metrics.record_tick(
            TickMetrics {
                timestamp: tick.timestamp,
                lateness_us: u64::try_from(lateness.as_micros()).unwrap_or(u64::MAX),
                enqueued: tick.timestamp.is_some(),
            },
            lateness > period,
        );

        // Advance by exactly one period so scheduling error never accumulates.
        next_tick += period;
    }

    log_info!("sampler loop shutting down");
}

struct Tick {
    sample: Option<PhysioSample>,
    timestamp: Option<f64>,
}

fn capture_tick(config: &SamplerLoop, elapsed: Duration) -> Tick {
    let Some(mut sample) = config.cell.take_latest_clone() else {
        return Tick {
            sample: None,
            timestamp: None,
        };
    };

    let timestamp = config.base_secs + elapsed.as_secs_f64();
    sample.timestamp = timestamp;
    sample.sampler_hz = Some(config.hz);
    Tick {
        sample: Some(sample),
        timestamp: Some(timestamp),
    }
}

/// Sleeps coarsely then spins until `deadline` (measured on `stopwatch`).
/// Returns false if cancellation was observed while waiting.
fn wait_until(stopwatch: Instant, deadline: Duration, cancel_token: &CancellationToken) -> bool {
    loop {
        if cancel_token.is_cancelled() {
            return false;
        }
        let now = stopwatch.elapsed();
        if now >= deadline {
            return true;
        }
        let remaining = deadline - now;
        if remaining > COARSE_SLEEP_THRESHOLD {
            std::thread::sleep(remaining - SPIN_MARGIN);
        } else {
            std::hint::spin_loop();
        }
    }
}
