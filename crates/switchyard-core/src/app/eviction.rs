//! EvictionLoop - 古い終端 task を registry から落とす
//!
//! # フロー
//! 1. `interval` ごとに起きる
//! 2. `max_age` より古い終端 entry を `Router::evict_older_than` で削除
//! 3. snapshot store があれば registry を保存
//!
//! Eviction はこのループ（か明示的な呼び出し）でしか起きません。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::router::Router;
use crate::config::RegistryConfig;

pub struct EvictionLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl EvictionLoop {
    pub fn spawn(router: Arc<Router>, interval: Duration, max_age: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // 最初の tick は即時に返るので読み捨てる
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                if *shutdown_rx.borrow() {
                    break;
                }

                let evicted = router.evict_older_than(max_age);
                if evicted > 0
                    && let Err(e) = router.persist().await
                {
                    tracing::warn!(error = %e, "registry snapshot failed after eviction");
                }
            }
            tracing::debug!("eviction loop stopped");
        });

        Self { shutdown_tx, join }
    }

    pub fn from_config(router: Arc<Router>, config: &RegistryConfig) -> Self {
        Self::spawn(
            router,
            Duration::from_secs(config.eviction_interval_secs.max(1)),
            Duration::from_secs(config.eviction_max_age_secs),
        )
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}
