//! Handler trait - queue ワーカーが実行する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<T, H> → DynHandler)

use std::marker::PhantomData;

use async_trait::async_trait;

use super::task::TypedTask;
use crate::domain::ExecutionResult;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    #[error("json decode: {0}")]
    Decode(String),

    #[error("{0}")]
    Failed(String),
}

/// Handler は TypedTask を実行して ExecutionResult を返す
///
/// # ジェネリクスによる型安全性
/// - `Handler<ConvertController>` は `ConvertController` しか受け取れない
/// - コンパイル時に payload 型と Handler の対応が保証される
#[async_trait]
pub trait Handler<T: TypedTask>: Send + Sync {
    async fn handle(&self, task: T) -> Result<ExecutionResult, HandlerError>;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// HashMap<String, Arc<dyn DynHandler>> に格納するための型消去版。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, payload: serde_json::Value) -> Result<ExecutionResult, HandlerError>;
    fn task_type(&self) -> &str;
}

pub struct TypedHandler<T: TypedTask, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: TypedTask, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: TypedTask, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(&self, payload: serde_json::Value) -> Result<ExecutionResult, HandlerError> {
        let task: T =
            serde_json::from_value(payload).map_err(|e| HandlerError::Decode(e.to_string()))?;
        self.handler.handle(task).await
    }

    fn task_type(&self) -> &str {
        T::TYPE
    }
}
