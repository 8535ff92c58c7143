//! `binlog-sync run` handler.

use std::sync::Arc;

use anyhow::Context;
use checkpoint::{
    BinlogPosition, Checkpoint, NullPositionSource, PositionSource, PositionTracker,
    StreamIdentity,
};
use delivery_sink::{
    DeliveryLogPositionSource, DeliverySink, JsonlFileSink, SinkKind, StdoutSink,
};
use mysql_binlog_source::{
    run_with_recovery, JsonlEventSource, MySqlColumnSource, Pipeline, PipelineConfig,
    PipelineStats, SchemaCache,
};
use tokio_util::sync::CancellationToken;

use crate::config::{load_config_if_provided, parse_duration, AppConfig};
use crate::{RunArgs, SinkOpts, SourceOpts};

/// Run the pipeline until the event source is exhausted or `cancel` fires.
pub async fn run_sync(args: RunArgs, cancel: CancellationToken) -> anyhow::Result<PipelineStats> {
    let config = load_config_if_provided(&args.source.config)?;
    let cache = Arc::new(schema_cache(&args.source, &config)?);
    let filter = config.schema_filter();
    if args.source.preload_metadata {
        cache.preload(&filter).await?;
    }

    let start_from = args
        .start_from
        .as_deref()
        .map(BinlogPosition::from_cli_string)
        .transpose()
        .context("Invalid --start-from position")?;
    let lookup_timeout = parse_duration(&args.position_lookup_timeout).with_context(|| {
        format!(
            "Invalid position lookup timeout: {}",
            args.position_lookup_timeout
        )
    })?;

    let pipeline_config = PipelineConfig {
        alias: args.sink.alias.clone(),
        filter,
        skip_unknown_statements: args.skip_unknown_statements,
        max_payload_bytes: args.max_payload_bytes,
    };
    let mut source = JsonlEventSource::new(&args.source.events_dir);
    let identity = stream_identity(&args.sink);
    tracing::info!(stream = %identity, sink = %args.sink.sink, "Starting binlog sync");

    // Branch once on the sink; everything below is monomorphized per sink.
    match args.sink.sink {
        SinkKind::File => {
            let sink = JsonlFileSink::open(
                &args.sink.delivery_log,
                &args.sink.book,
                &args.sink.group,
            )
            .await?;
            let tracker = PositionTracker::new(
                DeliveryLogPositionSource::new(&args.sink.delivery_log),
                identity,
            );
            let tracker = tracker
                .with_lookup_timeout(lookup_timeout)
                .with_start_override(start_from);
            let pipeline = Pipeline::new(cache, sink, pipeline_config);
            drive(&mut source, tracker, pipeline, &cancel).await
        }
        SinkKind::Stdout => {
            let sink = StdoutSink::new(&args.sink.book, &args.sink.group);
            let tracker = PositionTracker::new(NullPositionSource, identity)
                .with_lookup_timeout(lookup_timeout)
                .with_start_override(start_from);
            let pipeline = Pipeline::new(cache, sink, pipeline_config);
            drive(&mut source, tracker, pipeline, &cancel).await
        }
    }
}

/// Position a `run` with these sink options would resume from.
pub async fn resume_position(sink: &SinkOpts) -> anyhow::Result<BinlogPosition> {
    let identity = stream_identity(sink);
    match sink.sink {
        SinkKind::File => {
            PositionTracker::new(DeliveryLogPositionSource::new(&sink.delivery_log), identity)
                .resume()
                .await
        }
        SinkKind::Stdout => {
            PositionTracker::new(NullPositionSource, identity)
                .resume()
                .await
        }
    }
}

async fn drive<P: PositionSource, S: DeliverySink>(
    source: &mut JsonlEventSource,
    mut tracker: PositionTracker<P>,
    mut pipeline: Pipeline<S>,
    cancel: &CancellationToken,
) -> anyhow::Result<PipelineStats> {
    run_with_recovery(source, &mut tracker, &mut pipeline, cancel).await
}

fn stream_identity(sink: &SinkOpts) -> StreamIdentity {
    StreamIdentity::new(&sink.book, &sink.group, &sink.alias)
}

fn schema_cache(source: &SourceOpts, config: &AppConfig) -> anyhow::Result<SchemaCache> {
    match &source.mysql_uri {
        Some(uri) => {
            if !config.columns.is_empty() {
                tracing::warn!("Ignoring static column lists, columns are loaded from MySQL");
            }
            Ok(SchemaCache::new(MySqlColumnSource::from_url(uri)?))
        }
        None => {
            if config.columns.is_empty() {
                tracing::warn!(
                    "No MySQL URI and no static column lists configured, all row events will be skipped"
                );
            }
            Ok(SchemaCache::new(config.column_source()))
        }
    }
}
