//! Drive a pipeline from the tracked stream position, with one-shot recovery.

use anyhow::{Context, Result};
use checkpoint::{PositionSource, PositionTracker};
use delivery_sink::DeliverySink;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::event::{EventSource, StreamError};
use crate::pipeline::{Pipeline, PipelineError, PipelineStats};

/// Stream events from `source` into `pipeline` until the source is exhausted
/// or `cancel` fires.
///
/// The start position comes from `tracker`. If the upstream rejects a position
/// with a recoverable server error, streaming restarts once from the recovered
/// position; a second rejection is returned as an error.
pub async fn run_with_recovery<E, P, S>(
    source: &mut E,
    tracker: &mut PositionTracker<P>,
    pipeline: &mut Pipeline<S>,
    cancel: &CancellationToken,
) -> Result<PipelineStats>
where
    E: EventSource + ?Sized,
    P: PositionSource,
    S: DeliverySink,
{
    let mut position = tracker.resume().await?;
    let mut recovered = false;

    loop {
        info!(stream = %tracker.identity(), %position, "Starting replication stream");
        pipeline.begin(&position);

        let result = match source.start(&position).await {
            Ok(()) => pipeline.run(&mut *source, cancel).await,
            Err(e) => Err(PipelineError::Stream(e)),
        };

        match result {
            Ok(stats) => {
                info!(
                    dispatched = stats.dispatched,
                    skipped = stats.skipped,
                    markers = stats.markers,
                    "Replication stream stopped"
                );
                return Ok(stats);
            }
            Err(PipelineError::Stream(StreamError::Server(e))) if !recovered => {
                match tracker.recover(&e) {
                    Some(next) => {
                        recovered = true;
                        position = next;
                    }
                    None => {
                        return Err(e)
                            .with_context(|| format!("Replication stream failed at {position}"))
                    }
                }
            }
            Err(PipelineError::Stream(e)) => {
                if recovered {
                    warn!(%position, "Replication stream failed after recovery");
                }
                return Err(e).with_context(|| format!("Replication stream failed at {position}"));
            }
            Err(PipelineError::Dispatch(e)) => return Err(e),
        }
    }
}
