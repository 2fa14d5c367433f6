//! Classifier - task を backend kind に振り分ける
//!
//! 判定順（この順で評価し、最初に当たったものを採用）:
//! 1. `is_durable == true` → DurableWorkflow（タグより優先、無条件）
//! 2. 外部連携タグのいずれかを持つ → ExternalIntegration
//! 3. それ以外 → Queue
//!
//! 純粋関数。I/O も内部状態の変更もありません。

use std::collections::BTreeSet;

use crate::config::ClassifierConfig;
use crate::domain::{BackendKind, TaskDescription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    external_tags: BTreeSet<String>,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self::with_tags(config.external_integration_tags.iter().cloned())
    }

    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            external_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn classify(&self, task: &TaskDescription) -> BackendKind {
        if task.is_durable {
            return BackendKind::DurableWorkflow;
        }
        if task.tags.iter().any(|t| self.external_tags.contains(t)) {
            return BackendKind::ExternalIntegration;
        }
        BackendKind::Queue
    }

    pub fn external_tags(&self) -> &BTreeSet<String> {
        &self.external_tags
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}
