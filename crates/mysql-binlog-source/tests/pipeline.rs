//! Pipeline and runner tests against scripted event sources.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use checkpoint::{
    BinlogPosition, NullPositionSource, PositionTracker, ServerError, StreamIdentity,
    MISSING_LOG_FILE_MESSAGE, OFFSET_BEYOND_FILE_SIZE_MESSAGE, POSITION_NOT_FOUND_CODE,
};
use chrono::{TimeZone, Utc};
use delivery_sink::{DeliverySink, Direction, MessageArguments};
use mysql_binlog_source::{
    run_with_recovery, ColumnSource, EventSource, Pipeline, PipelineConfig, PipelineStats,
    ReplicationEvent, RowsKind, SchemaCache, SchemaFilter, StaticColumnSource, StreamError,
};
use serde_json::{json, Value};
use sync_core::RowValue;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct MemorySink {
    sent: Arc<Mutex<Vec<(Value, MessageArguments)>>>,
}

impl MemorySink {
    fn messages(&self) -> Vec<(Value, MessageArguments)> {
        self.sent.lock().unwrap().clone()
    }

    fn payloads(&self) -> Vec<Value> {
        self.messages().into_iter().map(|(p, _)| p).collect()
    }
}

#[async_trait]
impl DeliverySink for MemorySink {
    async fn send(&self, payload: Vec<u8>, args: MessageArguments) -> Result<()> {
        let payload = serde_json::from_slice(&payload)?;
        self.sent.lock().unwrap().push((payload, args));
        Ok(())
    }
}

struct RejectingSink;

#[async_trait]
impl DeliverySink for RejectingSink {
    async fn send(&self, _payload: Vec<u8>, _args: MessageArguments) -> Result<()> {
        anyhow::bail!("broker unavailable")
    }
}

/// What a scripted source does after one `start` call.
enum Run {
    Reject(ServerError),
    Events(Vec<ReplicationEvent>),
    EventsThenFail(Vec<ReplicationEvent>, ServerError),
    Hang,
}

#[derive(Default)]
struct ScriptedSource {
    runs: VecDeque<Run>,
    pending: VecDeque<ReplicationEvent>,
    failure: Option<ServerError>,
    hang: bool,
    starts: Vec<BinlogPosition>,
}

impl ScriptedSource {
    fn new(runs: impl IntoIterator<Item = Run>) -> Self {
        Self {
            runs: runs.into_iter().collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn start(&mut self, position: &BinlogPosition) -> Result<(), StreamError> {
        self.starts.push(position.clone());
        self.pending.clear();
        self.failure = None;
        self.hang = false;
        match self.runs.pop_front() {
            Some(Run::Reject(e)) => return Err(e.into()),
            Some(Run::Events(events)) => self.pending = events.into(),
            Some(Run::EventsThenFail(events, e)) => {
                self.pending = events.into();
                self.failure = Some(e);
            }
            Some(Run::Hang) => self.hang = true,
            None => {}
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<ReplicationEvent>, StreamError> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }
        if let Some(e) = self.failure.take() {
            return Err(e.into());
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(None)
    }
}

fn cache() -> Arc<SchemaCache> {
    let columns = StaticColumnSource::default()
        .with_table("shop", "users", ["id", "name"])
        .with_table("shop", "orders", ["id", "total"]);
    Arc::new(SchemaCache::new(columns))
}

fn config() -> PipelineConfig {
    PipelineConfig {
        alias: "orders-feed".to_string(),
        ..Default::default()
    }
}

fn rotate(file: &str) -> ReplicationEvent {
    ReplicationEvent::Rotate {
        next_log_file: file.to_string(),
    }
}

fn rows(table: &str, kind: RowsKind, rows: Vec<Vec<RowValue>>, pos: u32) -> ReplicationEvent {
    ReplicationEvent::Rows {
        schema: "shop".to_string(),
        table: table.to_string(),
        kind,
        rows,
        log_position: pos,
    }
}

fn user(id: i64, name: &str) -> Vec<RowValue> {
    vec![id.into(), name.into()]
}

fn query(schema: &str, sql: &str, pos: u32) -> ReplicationEvent {
    ReplicationEvent::Query {
        schema: schema.to_string(),
        query: sql.to_string(),
        log_position: pos,
    }
}

async fn replay(
    config: PipelineConfig,
    events: Vec<ReplicationEvent>,
) -> (Result<PipelineStats, mysql_binlog_source::PipelineError>, MemorySink) {
    let sink = MemorySink::default();
    let mut pipeline = Pipeline::new(cache(), sink.clone(), config);
    let mut source = ScriptedSource::new([Run::Events(events)]);
    source.start(&BinlogPosition::initial()).await.unwrap();
    let result = pipeline.run(&mut source, &CancellationToken::new()).await;
    (result, sink)
}

#[tokio::test]
async fn test_rows_are_dispatched_with_position_properties() {
    let (result, sink) = replay(
        config(),
        vec![
            rotate("mysql-bin.000001"),
            ReplicationEvent::Gtid {
                sequence_number: 7,
                commit_timestamp: Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap(),
            },
            rows(
                "users",
                RowsKind::Insert,
                vec![user(1, "alice"), user(2, "bob")],
                120,
            ),
        ],
    )
    .await;

    assert_eq!(
        result.unwrap(),
        PipelineStats {
            dispatched: 1,
            skipped: 0,
            markers: 2,
        }
    );

    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    let (payload, args) = &messages[0];
    assert_eq!(
        payload,
        &json!({
            "Schema": "shop",
            "Table": "users",
            "Operation": "INSERT",
            "Inserted": [{"id": 1, "name": "alice"}, {"id": 2, "name": "bob"}],
        })
    );
    assert_eq!(args.alias, "orders-feed");
    assert_eq!(args.protocol, "json");
    assert_eq!(args.direction, Direction::In);
    assert_eq!(args.properties["name"], "mysql-bin.000001");
    assert_eq!(args.properties["pos"], "120");
    assert_eq!(args.properties["seq"], "7");
    assert_eq!(args.properties["timestamp"], "1718447400000000000");
    assert_eq!(args.properties["schema"], "shop");
    assert_eq!(args.properties["table"], "users");
}

#[tokio::test]
async fn test_update_and_delete_records() {
    let (result, sink) = replay(
        config(),
        vec![
            rotate("mysql-bin.000001"),
            rows(
                "users",
                RowsKind::Update,
                vec![user(1, "alice"), user(1, "alicia")],
                200,
            ),
            rows("users", RowsKind::Delete, vec![user(2, "bob")], 300),
        ],
    )
    .await;
    result.unwrap();

    assert_eq!(
        sink.payloads(),
        vec![
            json!({
                "Schema": "shop",
                "Table": "users",
                "Operation": "UPDATE",
                "Updated": [{
                    "Before": {"id": 1, "name": "alice"},
                    "After": {"id": 1, "name": "alicia"},
                }],
            }),
            json!({
                "Schema": "shop",
                "Table": "users",
                "Operation": "DELETE",
                "Deleted": [{"id": 2, "name": "bob"}],
            }),
        ]
    );
}

#[tokio::test]
async fn test_table_without_metadata_is_skipped() {
    let (result, sink) = replay(
        config(),
        vec![
            rows("ghost", RowsKind::Insert, vec![user(1, "x")], 100),
            rows("users", RowsKind::Insert, vec![user(1, "alice")], 200),
        ],
    )
    .await;

    let stats = result.unwrap();
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(sink.payloads()[0]["Table"], "users");
}

/// Column source whose lookups fail for tables the server does not know.
struct MissingTableSource;

#[async_trait]
impl ColumnSource for MissingTableSource {
    async fn load_columns(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        if table == "users" {
            return Ok(vec!["id".to_string(), "name".to_string()]);
        }
        anyhow::bail!("Table '{schema}.{table}' doesn't exist")
    }
}

#[tokio::test]
async fn test_failed_column_lookup_is_skipped() {
    let sink = MemorySink::default();
    let cache = Arc::new(SchemaCache::new(MissingTableSource));
    let mut pipeline = Pipeline::new(cache, sink.clone(), config());
    let mut source = ScriptedSource::new([Run::Events(vec![
        rows("ghost", RowsKind::Insert, vec![user(1, "x")], 10),
        rows("users", RowsKind::Insert, vec![user(1, "alice")], 20),
    ])]);
    source.start(&BinlogPosition::initial()).await.unwrap();

    let stats = pipeline
        .run(&mut source, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(sink.payloads().len(), 1);
    assert_eq!(sink.payloads()[0]["Table"], "users");
}

#[tokio::test]
async fn test_schema_filter_skips_unconfigured_tables() {
    let config = PipelineConfig {
        filter: SchemaFilter::new().with_schema("shop", ["orders"]),
        ..config()
    };
    let (result, sink) = replay(
        config,
        vec![
            rows("users", RowsKind::Insert, vec![user(1, "alice")], 100),
            rows(
                "orders",
                RowsKind::Insert,
                vec![vec![10i64.into(), 9.5.into()]],
                200,
            ),
        ],
    )
    .await;

    let stats = result.unwrap();
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(
        sink.payloads(),
        vec![json!({
            "Schema": "shop",
            "Table": "orders",
            "Operation": "INSERT",
            "Inserted": [{"id": 10, "total": 9.5}],
        })]
    );
}

#[tokio::test]
async fn test_statements_are_classified() {
    let (result, sink) = replay(
        config(),
        vec![
            rotate("mysql-bin.000002"),
            query("", "TRUNCATE TABLE `db1`.`users`;", 50),
            query("shop", "DROP TABLE IF EXISTS orders", 90),
            query("shop", "BEGIN", 110),
        ],
    )
    .await;
    assert_eq!(result.unwrap().dispatched, 3);

    let messages = sink.messages();
    assert_eq!(
        messages[0].0,
        json!({
            "Schema": "db1",
            "Table": "users",
            "Operation": "TRUNCATE",
            "Query": "TRUNCATE TABLE `db1`.`users`;",
        })
    );
    assert_eq!(messages[0].1.properties["schema"], "db1");
    assert_eq!(messages[0].1.properties["pos"], "50");
    assert_eq!(
        messages[1].0,
        json!({
            "Schema": "shop",
            "Table": "orders",
            "Operation": "DROP_TABLE",
            "Query": "DROP TABLE IF EXISTS orders",
        })
    );
    assert_eq!(
        messages[2].0,
        json!({
            "Schema": "shop",
            "Table": "",
            "Operation": "UNKNOWN",
            "Query": "BEGIN",
        })
    );
}

#[tokio::test]
async fn test_unknown_statements_can_be_skipped() {
    let config = PipelineConfig {
        skip_unknown_statements: true,
        ..config()
    };
    let (result, sink) = replay(
        config,
        vec![
            query("shop", "BEGIN", 10),
            query("shop", "ALTER TABLE users ADD COLUMN age INT", 20),
        ],
    )
    .await;

    let stats = result.unwrap();
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(sink.payloads()[0]["Operation"], "ALTER_TABLE");
}

#[tokio::test]
async fn test_oversized_records_are_split() {
    let users: Vec<Vec<RowValue>> = (0..6).map(|i| user(i, "someone")).collect();
    let config = PipelineConfig {
        max_payload_bytes: Some(120),
        ..config()
    };
    let (result, sink) = replay(
        config,
        vec![
            rotate("mysql-bin.000001"),
            rows("users", RowsKind::Insert, users, 400),
        ],
    )
    .await;

    let stats = result.unwrap();
    assert!(stats.dispatched > 1);

    let messages = sink.messages();
    let mut ids = Vec::new();
    for (payload, args) in &messages {
        assert!(serde_json::to_vec(payload).unwrap().len() <= 120);
        assert_eq!(args.properties["pos"], "400");
        for row in payload["Inserted"].as_array().unwrap() {
            ids.push(row["id"].as_i64().unwrap());
        }
    }
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_row_wider_than_columns_is_fatal() {
    let (result, sink) = replay(
        config(),
        vec![
            rotate("mysql-bin.000003"),
            rows(
                "users",
                RowsKind::Insert,
                vec![vec![1i64.into(), "alice".into(), "extra".into()]],
                120,
            ),
        ],
    )
    .await;

    let err = result.unwrap_err();
    let message = format!("{:#}", anyhow::Error::from(err));
    assert!(message.contains("shop.users at mysql-bin.000003:120"), "{message}");
    assert!(sink.messages().is_empty());
}

#[tokio::test]
async fn test_sink_failure_is_fatal() {
    let mut pipeline = Pipeline::new(cache(), RejectingSink, config());
    let mut source = ScriptedSource::new([Run::Events(vec![
        rotate("mysql-bin.000001"),
        rows("users", RowsKind::Insert, vec![user(1, "alice")], 120),
    ])]);
    source.start(&BinlogPosition::initial()).await.unwrap();

    let err = pipeline
        .run(&mut source, &CancellationToken::new())
        .await
        .unwrap_err();
    let message = format!("{:#}", anyhow::Error::from(err));
    assert!(message.contains("broker unavailable"), "{message}");
    assert!(message.contains("mysql-bin.000001:120"), "{message}");
}

#[tokio::test]
async fn test_cancellation_stops_between_events() {
    let sink = MemorySink::default();
    let mut pipeline = Pipeline::new(cache(), sink.clone(), config());
    let mut source = ScriptedSource::new([Run::Hang]);
    source.start(&BinlogPosition::initial()).await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let stats = pipeline.run(&mut source, &cancel).await.unwrap();
    assert_eq!(stats, PipelineStats::default());
}

#[tokio::test]
async fn test_cancelled_before_start_dispatches_nothing() {
    let sink = MemorySink::default();
    let mut pipeline = Pipeline::new(cache(), sink.clone(), config());
    let mut source = ScriptedSource::new([Run::Events(vec![rows(
        "users",
        RowsKind::Insert,
        vec![user(1, "alice")],
        120,
    )])]);
    source.start(&BinlogPosition::initial()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    pipeline.run(&mut source, &cancel).await.unwrap();
    assert!(sink.messages().is_empty());
}

fn tracker(start: BinlogPosition) -> PositionTracker<NullPositionSource> {
    PositionTracker::new(
        NullPositionSource,
        StreamIdentity::new("book", "group", "orders-feed"),
    )
    .with_start_override(Some(start))
}

#[tokio::test]
async fn test_missing_log_file_restarts_from_beginning() {
    let sink = MemorySink::default();
    let mut pipeline = Pipeline::new(cache(), sink.clone(), config());
    let mut tracker = tracker(BinlogPosition::new("mysql-bin.000009", 4));
    let mut source = ScriptedSource::new([
        Run::Reject(ServerError::new(
            POSITION_NOT_FOUND_CODE,
            MISSING_LOG_FILE_MESSAGE,
        )),
        Run::Events(vec![
            rotate("mysql-bin.000001"),
            rows("users", RowsKind::Insert, vec![user(1, "alice")], 120),
        ]),
    ]);

    let stats = run_with_recovery(
        &mut source,
        &mut tracker,
        &mut pipeline,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(stats.dispatched, 1);
    assert_eq!(
        source.starts,
        vec![
            BinlogPosition::new("mysql-bin.000009", 4),
            BinlogPosition::initial(),
        ]
    );
    assert_eq!(sink.messages()[0].1.properties["name"], "mysql-bin.000001");
}

#[tokio::test]
async fn test_offset_beyond_file_size_restarts_at_file_start() {
    let sink = MemorySink::default();
    let mut pipeline = Pipeline::new(cache(), sink.clone(), config());
    let mut tracker = tracker(BinlogPosition::new("mysql-bin.000002", 99_999));
    let reason = format!("{OFFSET_BEYOND_FILE_SIZE_MESSAGE}; the first event 'mysql-bin.000002' at 99999");
    let mut source = ScriptedSource::new([
        Run::EventsThenFail(vec![], ServerError::new(POSITION_NOT_FOUND_CODE, reason)),
        Run::Events(vec![rows(
            "users",
            RowsKind::Insert,
            vec![user(1, "alice")],
            120,
        )]),
    ]);

    run_with_recovery(
        &mut source,
        &mut tracker,
        &mut pipeline,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        source.starts,
        vec![
            BinlogPosition::new("mysql-bin.000002", 99_999),
            BinlogPosition::start_of("mysql-bin.000002"),
        ]
    );
    // The log file is reset to the restart position before streaming resumes.
    assert_eq!(sink.messages()[0].1.properties["name"], "mysql-bin.000002");
}

#[tokio::test]
async fn test_recovery_is_one_shot() {
    let mut pipeline = Pipeline::new(cache(), MemorySink::default(), config());
    let mut tracker = tracker(BinlogPosition::new("mysql-bin.000009", 4));
    let rejection = || ServerError::new(POSITION_NOT_FOUND_CODE, MISSING_LOG_FILE_MESSAGE);
    let mut source = ScriptedSource::new([Run::Reject(rejection()), Run::Reject(rejection())]);

    let err = run_with_recovery(
        &mut source,
        &mut tracker,
        &mut pipeline,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(source.starts.len(), 2);
    let message = format!("{err:#}");
    assert!(message.contains("1236"), "{message}");
}

#[tokio::test]
async fn test_other_server_errors_are_not_recovered() {
    let mut pipeline = Pipeline::new(cache(), MemorySink::default(), config());
    let mut tracker = tracker(BinlogPosition::new("mysql-bin.000001", 4));
    let mut source = ScriptedSource::new([Run::Reject(ServerError::new(
        1045,
        "Access denied for user",
    ))]);

    let err = run_with_recovery(
        &mut source,
        &mut tracker,
        &mut pipeline,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(source.starts.len(), 1);
    assert!(format!("{err:#}").contains("Access denied"));
}

#[tokio::test]
async fn test_runner_starts_from_beginning_without_history() {
    let mut pipeline = Pipeline::new(cache(), MemorySink::default(), config());
    let mut tracker = PositionTracker::new(
        NullPositionSource,
        StreamIdentity::new("book", "group", "orders-feed"),
    );
    let mut source = ScriptedSource::new([Run::Events(vec![])]);

    run_with_recovery(
        &mut source,
        &mut tracker,
        &mut pipeline,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(source.starts, vec![BinlogPosition::initial()]);
}
