//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。Router はここの trait にだけ依存し、
//! 具体的な backend・時計・ID 生成・永続化先は構築時に注入されます。
//!
//! # 設計原則
//! - Router が registry の正本（source of truth）
//! - Backend は adapter 越しにしか触らない
//! - 通知・永続化は差し替え可能な副作用

pub mod adapter;
pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod snapshot_store;

// 主要な trait を再エクスポート
pub use self::adapter::BackendAdapter;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, MemoryEventSink, TracingEventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::snapshot_store::{
    JsonFileSnapshotStore, MemorySnapshotStore, RegistrySnapshot, SnapshotError, SnapshotStore,
};
