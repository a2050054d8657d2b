//! reminder-sync - 提醒对账 dry-run
//!
//! 用法：`reminder-sync <snapshot.json> [config.toml]`
//! 读取快照文件，用记录型适配器跑一轮对账（不触碰系统闹钟），映射写入配置的存储目录，
//! 并把对账结果打印为 JSON。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use reminder_sync::alarm::RecordingAlarmAdapter;
use reminder_sync::config::load_config_or_default;
use reminder_sync::model::Snapshot;
use reminder_sync::observability;
use reminder_sync::snapshot::InMemorySnapshotSource;
use reminder_sync::store::{parse_alarm_map, FileKeyValueStore, KeyValueStore};
use reminder_sync::EngineBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let mut args = std::env::args().skip(1);
    let snapshot_path = args
        .next()
        .context("usage: reminder-sync <snapshot.json> [config.toml]")?;
    let cfg = load_config_or_default(args.next().map(PathBuf::from));

    let raw = tokio::fs::read_to_string(&snapshot_path)
        .await
        .with_context(|| format!("Failed to read snapshot {}", snapshot_path))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).context("Snapshot file is not valid JSON")?;
    let snapshot = Snapshot::from_json_lenient(value);
    tracing::info!(
        tasks = snapshot.tasks.len(),
        projects = snapshot.projects.len(),
        "Loaded snapshot"
    );

    let adapter = Arc::new(RecordingAlarmAdapter::new());
    let source = Arc::new(InMemorySnapshotSource::new(snapshot));
    let engine = EngineBuilder::new(adapter.clone(), source)
        .with_config(&cfg)
        .build();

    let report = engine.reconcile_now().await;

    let store = FileKeyValueStore::new(&cfg.storage.dir);
    let persisted = store
        .get_item(&cfg.storage.alarm_map_key)
        .await
        .context("Failed to read alarm map")?
        .unwrap_or_else(|| "{}".to_string());
    let alarms = parse_alarm_map(&persisted)?;

    let output = serde_json::json!({
        "report": report,
        "alarms": alarms,
        "requests": adapter.scheduled_requests(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
