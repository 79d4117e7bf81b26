use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use irport_core::Tensor;
use tracing::{debug, info};

use crate::SharedModel;

#[derive(Clone, Debug)]
pub struct StressPolicy {
    pub duration: Duration,
    /// Log progress every N iterations; 0 disables progress logs.
    pub report_every: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct StressReport {
    pub iterations: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl StressReport {
    pub fn per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.iterations as f64 / secs
        } else {
            0.0
        }
    }
}

/// Re-runs inference on `inputs` until `policy.duration` elapses or `cancel`
/// is raised. Inference is blocking, so the loop runs on the blocking pool.
pub async fn stress(
    model: SharedModel,
    inputs: Vec<Tensor>,
    policy: StressPolicy,
    cancel: Arc<AtomicBool>,
) -> Result<StressReport> {
    info!(duration_s = policy.duration.as_secs_f64(), "starting stress test");
    let report = tokio::task::spawn_blocking(move || stress_blocking(&model, &inputs, &policy, &cancel))
        .await
        .context("stress task failed")??;
    info!(
        iterations = report.iterations,
        elapsed_s = report.elapsed.as_secs_f64(),
        per_second = report.per_second(),
        cancelled = report.cancelled,
        "stress test complete"
    );
    Ok(report)
}

fn stress_blocking(
    model: &SharedModel,
    inputs: &[Tensor],
    policy: &StressPolicy,
    cancel: &AtomicBool,
) -> Result<StressReport> {
    let mut guard = model.lock().map_err(|_| anyhow!("model lock poisoned"))?;
    let start = Instant::now();
    let mut iterations = 0u64;

    loop {
        if cancel.load(Ordering::Relaxed) {
            debug!(iterations, "stress test cancelled");
            return Ok(StressReport {
                iterations,
                elapsed: start.elapsed(),
                cancelled: true,
            });
        }

        guard
            .infer(inputs.to_vec())
            .with_context(|| format!("inference failed at iteration {iterations}"))?;
        iterations += 1;

        let elapsed = start.elapsed();
        if elapsed >= policy.duration {
            return Ok(StressReport {
                iterations,
                elapsed,
                cancelled: false,
            });
        }
        if policy.report_every > 0 && iterations % policy.report_every == 0 {
            info!(iterations, elapsed_s = elapsed.as_secs_f64(), "stress progress");
        }
    }
}
