//! End-to-end tests: JSONL binlog replay into a JSONL delivery log.

use std::path::{Path, PathBuf};

use binlog_sync::{resume_position, run_sync, RunArgs};
use checkpoint::BinlogPosition;
use clap::Parser;
use delivery_sink::DeliveredMessage;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

const CONFIG: &str = r#"
[columns.shop]
users = ["id", "name"]
orders = ["id", "total"]
"#;

struct Fixture {
    _dir: TempDir,
    events_dir: PathBuf,
    config: PathBuf,
    delivery_log: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        tracing_subscriber::fmt()
            .with_env_filter("binlog_sync=debug,mysql_binlog_source=debug")
            .try_init()
            .ok();

        let dir = TempDir::new().unwrap();
        let events_dir = dir.path().join("binlog");
        std::fs::create_dir_all(&events_dir).unwrap();
        let config = dir.path().join("binlog-sync.toml");
        std::fs::write(&config, CONFIG).unwrap();

        append_events(
            &events_dir.join("mysql-bin.000001.jsonl"),
            &[
                json!({"type": "gtid", "sequence_number": 1, "commit_timestamp": "2024-06-15T10:30:00Z"}),
                json!({"type": "rows", "schema": "shop", "table": "users", "kind": "insert",
                       "rows": [[1, "alice"], [2, "bob"]]}),
                json!({"type": "query", "schema": "shop",
                       "query": "CREATE TABLE shop.orders (id INT, total DOUBLE)"}),
            ],
        );
        append_events(
            &events_dir.join("mysql-bin.000002.jsonl"),
            &[
                json!({"type": "gtid", "sequence_number": 2, "commit_timestamp": "2024-06-15T10:31:00Z"}),
                json!({"type": "rows", "schema": "shop", "table": "orders", "kind": "insert",
                       "rows": [[10, 9.5]]}),
                json!({"type": "rows", "schema": "shop", "table": "ghost", "kind": "insert",
                       "rows": [[1]]}),
                json!({"type": "rows", "schema": "shop", "table": "users", "kind": "update",
                       "rows": [[1, "alice"], [1, "alicia"]]}),
            ],
        );

        let delivery_log = dir.path().join("out").join("delivery.jsonl");
        Self {
            _dir: dir,
            events_dir,
            config,
            delivery_log,
        }
    }

    fn args(&self, extra: &[&str]) -> RunArgs {
        let mut argv: Vec<String> = vec![
            "run".to_string(),
            "--events-dir".to_string(),
            self.events_dir.display().to_string(),
            "--config".to_string(),
            self.config.display().to_string(),
            "--delivery-log".to_string(),
            self.delivery_log.display().to_string(),
            "--alias".to_string(),
            "orders".to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        RunArgs::try_parse_from(argv).unwrap()
    }

    fn delivered(&self) -> Vec<DeliveredMessage> {
        std::fs::read_to_string(&self.delivery_log)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn payloads(&self) -> Vec<Value> {
        self.delivered()
            .iter()
            .map(|m| serde_json::from_str(&m.payload).unwrap())
            .collect()
    }

    fn log_size(&self, name: &str) -> u64 {
        std::fs::metadata(self.events_dir.join(format!("{name}.jsonl")))
            .unwrap()
            .len()
    }
}

fn append_events(path: &Path, events: &[Value]) {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    for event in events {
        writeln!(file, "{event}").unwrap();
    }
}

#[tokio::test]
async fn test_replay_to_delivery_log() {
    let fixture = Fixture::new();

    let stats = assert_ok!(run_sync(fixture.args(&[]), CancellationToken::new()).await);
    assert_eq!(stats.dispatched, 4);
    assert_eq!(stats.skipped, 1);

    assert_eq!(
        fixture.payloads(),
        vec![
            json!({"Schema": "shop", "Table": "users", "Operation": "INSERT",
                   "Inserted": [{"id": 1, "name": "alice"}, {"id": 2, "name": "bob"}]}),
            json!({"Schema": "shop", "Table": "orders", "Operation": "CREATE_TABLE",
                   "Query": "CREATE TABLE shop.orders (id INT, total DOUBLE)"}),
            json!({"Schema": "shop", "Table": "orders", "Operation": "INSERT",
                   "Inserted": [{"id": 10, "total": 9.5}]}),
            json!({"Schema": "shop", "Table": "users", "Operation": "UPDATE",
                   "Updated": [{"Before": {"id": 1, "name": "alice"},
                                "After": {"id": 1, "name": "alicia"}}]}),
        ]
    );

    let delivered = fixture.delivered();
    for message in &delivered {
        assert_eq!(message.book, "default");
        assert_eq!(message.group, "mysql");
        assert_eq!(message.alias, "orders");
        assert_eq!(message.protocol, "json");
    }
    assert_eq!(delivered[0].properties["name"], "mysql-bin.000001");
    assert_eq!(delivered[0].properties["seq"], "1");
    assert_eq!(delivered[2].properties["name"], "mysql-bin.000002");
    assert_eq!(delivered[2].properties["seq"], "2");
    assert_eq!(
        delivered[3].properties["pos"],
        fixture.log_size("mysql-bin.000002").to_string()
    );
}

#[tokio::test]
async fn test_restart_resumes_after_last_delivered_message() {
    let fixture = Fixture::new();
    assert_ok!(run_sync(fixture.args(&[]), CancellationToken::new()).await);

    let resume = assert_ok!(resume_position(&fixture.args(&[]).sink).await);
    assert_eq!(
        resume,
        BinlogPosition::new(
            "mysql-bin.000002",
            fixture.log_size("mysql-bin.000002") as u32
        )
    );

    append_events(
        &fixture.events_dir.join("mysql-bin.000002.jsonl"),
        &[json!({"type": "rows", "schema": "shop", "table": "users", "kind": "delete",
                 "rows": [[2, "bob"]]})],
    );

    let stats = assert_ok!(run_sync(fixture.args(&[]), CancellationToken::new()).await);
    assert_eq!(stats.dispatched, 1);

    let payloads = fixture.payloads();
    assert_eq!(payloads.len(), 5);
    assert_eq!(
        payloads[4],
        json!({"Schema": "shop", "Table": "users", "Operation": "DELETE",
               "Deleted": [{"id": 2, "name": "bob"}]})
    );
}

#[tokio::test]
async fn test_missing_start_file_restarts_from_oldest_log() {
    let fixture = Fixture::new();
    let args = fixture.args(&["--start-from", "mysql-bin.000009:4"]);

    let stats = assert_ok!(run_sync(args, CancellationToken::new()).await);
    assert_eq!(stats.dispatched, 4);
}

#[tokio::test]
async fn test_offset_past_end_restarts_at_file_start() {
    let fixture = Fixture::new();
    let args = fixture.args(&["--start-from", "mysql-bin.000002:999999"]);

    let stats = assert_ok!(run_sync(args, CancellationToken::new()).await);
    assert_eq!(stats.dispatched, 2);
    let delivered = fixture.delivered();
    assert!(delivered
        .iter()
        .all(|m| m.properties["name"] == "mysql-bin.000002"));
}

#[tokio::test]
async fn test_schema_filter_and_payload_limit() {
    let fixture = Fixture::new();
    std::fs::write(
        &fixture.config,
        format!("[schemas]\nshop = [\"users\"]\n{CONFIG}"),
    )
    .unwrap();
    let args = fixture.args(&["--max-payload-bytes", "80", "--skip-unknown-statements"]);

    let stats = assert_ok!(run_sync(args, CancellationToken::new()).await);

    // users insert split in two, CREATE TABLE kept, orders filtered, update kept
    assert_eq!(stats.dispatched, 4);
    let operations: Vec<Value> = fixture
        .payloads()
        .iter()
        .map(|p| p["Operation"].clone())
        .collect();
    assert_eq!(
        operations,
        vec![
            json!("INSERT"),
            json!("INSERT"),
            json!("CREATE_TABLE"),
            json!("UPDATE")
        ]
    );
}

#[tokio::test]
async fn test_invalid_start_position_is_rejected() {
    let fixture = Fixture::new();
    let args = fixture.args(&["--start-from", "mysql-bin.000001"]);

    let err = run_sync(args, CancellationToken::new()).await.unwrap_err();
    assert!(format!("{err:#}").contains("Invalid --start-from position"));
}
