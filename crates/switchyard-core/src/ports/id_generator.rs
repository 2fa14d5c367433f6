//! IdGenerator port - ID 生成の抽象化
//!
//! In-memory backends use it for job / run ids, and the integration adapter
//! uses it for correlation ids when an automation is fire-and-forget.
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{NativeId, TaskId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は分散システムで使える ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait IdGenerator: Send + Sync {
    /// ULID を生成（prefix は呼び出し側が付ける）
    fn generate_ulid(&self) -> Ulid;

    /// Task ID を生成（`task-{ulid}`）
    fn generate_task_id(&self) -> TaskId {
        TaskId::from_ulid(self.generate_ulid())
    }

    /// Native ID を `{prefix}{ulid}` 形式で生成
    fn generate_native_id(&self, prefix: &str) -> NativeId {
        NativeId::new(format!("{prefix}{}", self.generate_ulid()))
    }
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// テスト時に FixedClock を使うと timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}
