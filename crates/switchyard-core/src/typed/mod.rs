//! Typed - 型付き payload API
//!
//! Router にとって payload は不透明な JSON ですが、backend 呼び出しの境界では
//! task_type をキーにした型として扱います。typo や payload 崩れを submit 時点で弾くための層です。
//!
//! # 二層構造
//! - **表層（Typed）**: `TypedTask` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `PayloadSchema`, `DynHandler` - object-safe, type erasure

pub mod handler;
pub mod registry;
pub mod task;

// 主要な trait/型 を再エクスポート
pub use self::handler::{DynHandler, Handler, HandlerError, TypedHandler};
pub use self::registry::{PayloadSchema, PayloadSchemas, SchemaError};
pub use self::task::{TypedTask, decode_payload};
