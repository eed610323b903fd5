//! 离线同步演示
//!
//! 断网写入 → 恢复网络 → 自动 drain，远端对第一次请求返回瞬时错误，对 422 直接进死信。
//!
//! 运行: cargo run --example offline_demo

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use offline_sync_sdk::{
    EntityKind, OfflineSyncConfig, OfflineSyncEngine, RemoteApi, RemoteFailure, SyncEvent,
    SyncItem, SyncOperation,
};
use serde_json::json;
use tracing::{info, Level};

/// 模拟远端：第一次调用失败一次，`bad-*` 实体永久拒绝
struct DemoRemote {
    calls: AtomicUsize,
}

#[async_trait]
impl RemoteApi for DemoRemote {
    async fn send(&self, item: &SyncItem) -> Result<(), RemoteFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        if n == 0 {
            return Err(RemoteFailure::Transient("connection reset".into()));
        }
        if item.entity_id.starts_with("bad-") {
            return Err(RemoteFailure::from_status(422, "validation failed"));
        }
        info!("☁️ 远端已接收 {} {}/{}", item.operation, item.entity_type, item.entity_id);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = OfflineSyncConfig::builder()
        .in_memory(true)
        .start_online(false)
        .build()?;
    let remote = Arc::new(DemoRemote {
        calls: AtomicUsize::new(0),
    });
    let engine = OfflineSyncEngine::with_remote(config, remote).await?;

    let _status = engine.on_sync_status(|status| info!("📶 sync status → {}", status));
    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SyncEvent::ItemFailed { id, retry_count, error } => {
                    info!("⚠️ {} 第 {} 次失败: {}", id, retry_count, error)
                }
                SyncEvent::ItemDeadLettered { id, error, .. } => info!("☠️ {} 进入死信: {}", id, error),
                _ => {}
            }
        }
    });

    info!("--- 离线写入 ---");
    engine
        .mutate(SyncOperation::Create, EntityKind::Incidents, "inc-1", json!({"title": "Leak"}))
        .await?;
    engine
        .mutate(SyncOperation::Update, EntityKind::Risks, "risk-7", json!({"score": 12}))
        .await?;
    engine
        .mutate(SyncOperation::Create, EntityKind::Audits, "bad-1", json!({}))
        .await?;
    engine
        .cache_set("dashboard:kpis", json!({"open_incidents": 1}), Some(Duration::from_secs(30)))
        .await;

    info!("本地镜像: {:?}", engine.get_entity(EntityKind::Incidents, "inc-1").await?);
    info!("待同步: {}", engine.get_sync_queue_count().await?);

    info!("--- 恢复网络 ---");
    engine.set_online_status(true);
    tokio::time::sleep(Duration::from_millis(500)).await;

    // 第一轮中瞬时失败的条目留在队列里，手动再处理一遍
    let report = engine.process_queue().await?;
    info!("手动 drain: {:?}", report);

    let stats = engine.queue_stats().await?;
    info!(
        "队列统计: total={} pending={} exhausted={} dead_letters={}",
        stats.total, stats.pending, stats.exhausted, stats.dead_letters
    );
    for letter in engine.dead_letters().await? {
        info!(
            "死信 {} ({}/{}): {:?}",
            letter.item.id, letter.item.entity_type, letter.item.entity_id, letter.item.last_error
        );
    }

    engine.shutdown().await;
    Ok(())
}
