//! Flow - 依存関係つき task 群を Router 経由で実行する
//!
//! - `graph`: 親子 DAG（循環は追加時に拒否）
//! - `composer`: 葉から順に schedule し、子の結果で親を進める / 止める

pub mod composer;
pub mod graph;

pub use self::composer::{FlowComposer, FlowError, FlowProgress, FlowReport, FlowState, NodeState};
pub use self::graph::{GraphError, WorkflowGraph};
