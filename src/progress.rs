//! Read-only progress reporter — polls the completion counters at 1 Hz.
//!
//! The reporter only ever issues the `progress` query; it never claims or
//! locks rows.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::store::TaskStore;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Drive a progress bar until `stop` is cancelled.
pub async fn report_progress(store: Arc<dyn TaskStore>, stop: CancellationToken) {
    let total = match store.progress().await {
        Ok(progress) => progress.total,
        Err(e) => {
            warn!(error = %e, "Progress reporter could not read totals");
            return;
        }
    };

    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("=> "),
    );
    bar.set_message("Decompiling");

    let mut tick = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tick.tick() => {
                match store.progress().await {
                    Ok(progress) => bar.set_position(progress.completed),
                    Err(e) => warn!(error = %e, "Progress poll failed"),
                }
            }
        }
    }

    // Final refresh so the bar reflects the state the pool drained at.
    if let Ok(progress) = store.progress().await {
        bar.set_position(progress.completed);
    }
    bar.finish();
}
