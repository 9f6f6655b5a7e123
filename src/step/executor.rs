//! Step execution wrapper
//!
//! Adds per-step timeout, retries of FAILURE results, progress and status
//! logging around [`Step::run`].

use super::types::{StepResult, StepStatus};
use super::Step;
use crate::error::Result;
use crate::types::{format_duration, StepArgs};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// How often a running step reports that it is still running
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// Run a step once, honoring its timeout and retry policy
///
/// A timed-out attempt yields a FAILURE result and is never retried.
/// Errors returned by the step propagate unchanged.
pub async fn execute(step: &dyn Step, args: &StepArgs) -> Result<StepResult> {
    let started = Instant::now();
    let title = step.title();
    let max_retries = step.max_retries();
    let mut attempt = 0;

    info!("🚀 Start {title}");

    loop {
        let result = match step.max_duration() {
            Some(max_duration) => match tokio::time::timeout(
                max_duration,
                with_progress(title, started, PROGRESS_INTERVAL, step.run(args)),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    error!(
                        "🚨 {title} timed out after {}. No additional retry will happen.",
                        format_duration(max_duration)
                    );
                    let result = timed_out_result(title, max_duration);
                    log_step_result(title, &result, started.elapsed());
                    return Ok(result);
                }
            },
            None => with_progress(title, started, PROGRESS_INTERVAL, step.run(args)).await?,
        };

        if result.status == StepStatus::Failure && attempt < max_retries {
            attempt += 1;
            let delay = step.retry_delay();
            warn!(
                "{title} failed, retry #{attempt}/{max_retries} in {}",
                format_duration(delay)
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        log_step_result(title, &result, started.elapsed());
        return Ok(result);
    }
}

/// Drive `fut` to completion, logging every `interval` while it runs
pub(crate) async fn with_progress<F: Future>(
    title: &str,
    started: Instant,
    interval: Duration,
    fut: F,
) -> F::Output {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    tokio::pin!(fut);

    loop {
        tokio::select! {
            output = &mut fut => return output,
            _ = ticker.tick() => {
                info!(
                    "⏳ {title}: Still running... (duration: {})",
                    format_duration(started.elapsed())
                );
            }
        }
    }
}

fn timed_out_result(title: &str, max_duration: Duration) -> StepResult {
    StepResult::failure(title).with_stdout(format!(
        "Timed out after the max duration of {}.",
        format_duration(max_duration)
    ))
}

fn log_step_result(title: &str, result: &StepResult, elapsed: Duration) {
    let duration = format_duration(elapsed);
    let emoji = result.status.emoji();
    match result.status {
        StepStatus::Failure => error!("{title}: {emoji} failed (duration: {duration})"),
        StepStatus::Skipped => info!("{title}: {emoji} was skipped (duration: {duration})"),
        StepStatus::Success => info!("{title}: {emoji} was successful (duration: {duration})"),
    }
}
