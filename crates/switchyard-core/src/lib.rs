//! switchyard-core
//!
//! Routes tasks to one of three execution backends and tracks them behind a
//! single handle.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, handle, status, outcome, record, errors, events）
//! - **ports**: 抽象化レイヤー（BackendAdapter, Clock, IdGenerator, EventSink, SnapshotStore）
//! - **impls**: backend ごとの native trait・インメモリ実装・adapter（queue, workflow, integration）
//! - **app**: Router 本体（classifier, status 変換表, registry, builder, eviction, LocalStack）
//! - **flow**: 依存関係つき task 群（WorkflowGraph, FlowComposer）
//! - **typed**: 型付き Task API（TypedTask, Handler, PayloadSchemas）
//! - **config** / **logging**: TOML 設定と tracing 初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod flow;
pub mod impls;
pub mod logging;
pub mod ports;
pub mod typed;
