//! App - アプリケーション層
//!
//! ports と impls を組み合わせて Router を組み立てます。
//!
//! # 主要コンポーネント
//! - **Classifier**: task → backend kind
//! - **TaskRegistry**: Router 専用の task 表
//! - **Router**: schedule / status / cancel / list の窓口
//! - **RouterBuilder**: ワイヤリングと起動時検証
//! - **EvictionLoop**: 古い終端 task の掃除
//! - **LocalStack**: インメモリ backend 一式（開発・テスト用）

pub mod builder;
pub mod classifier;
pub mod eviction;
pub mod local;
pub mod registry;
pub mod router;
pub mod status;

pub use self::builder::{BuildError, RouterBuilder};
pub use self::classifier::Classifier;
pub use self::eviction::EvictionLoop;
pub use self::local::{LocalStack, LocalStackBuilder, LocalStackError};
pub use self::registry::{TaskFilter, TaskRegistry};
pub use self::router::Router;
