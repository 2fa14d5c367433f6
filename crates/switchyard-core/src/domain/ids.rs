//! Domain identifiers (strongly-typed IDs).
//!
//! Task ids are caller-supplied strings, and backend-native ids are whatever
//! the backend hands back. Both are plain strings on the wire, so `Id<T>` wraps
//! a `String` and uses a phantom marker to keep the two from being mixed up.
//!
//! ## Phantom Type パターン
//! `Id<T>` で共通実装を提供しつつ、`T` は実行時には使わないマーカー型として
//! コンパイル時の型安全性だけを提供します。

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Router や backend が ID を自動生成するときのプレフィックスを提供します。
pub trait IdMarker: Send + Sync + 'static {
    /// 自動生成時のプレフィックス（例: "task-", "native-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// # 例
/// ```ignore
/// let task_id: TaskId = "t1".into();
/// let native: NativeId = "bull:default:42".into();
/// // task_id と native は異なる型なので、混同できない
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// ULID から `{prefix}{ulid}` 形式の ID を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self::new(format!("{}{}", T::prefix(), ulid))
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> Borrow<str> for Id<T> {
    fn borrow(&self) -> &str {
        &self.value
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Task のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Backend-native id のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Native {}

impl IdMarker for Native {
    fn prefix() -> &'static str {
        "native-"
    }
}

/// Identifier of a task (caller-supplied or router-generated, immutable once assigned).
pub type TaskId = Id<Task>;

/// Identifier a backend uses for its own execution (job id, workflow id, correlation id).
pub type NativeId = Id<Native>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id: TaskId = "t1".into();
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, "\"t1\"");

        let back: TaskId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn generated_ids_carry_marker_prefix() {
        let task = TaskId::from_ulid(Ulid::new());
        let native = NativeId::from_ulid(Ulid::new());

        assert!(task.as_str().starts_with("task-"));
        assert!(native.as_str().starts_with("native-"));
        // let _: TaskId = native; // <- does not compile
    }

    #[test]
    fn blank_ids_are_empty() {
        assert!(TaskId::new("  ").is_empty());
        assert!(!TaskId::new("t1").is_empty());
    }

    #[test]
    fn borrow_allows_str_lookups() {
        let mut set = std::collections::HashSet::new();
        set.insert(TaskId::new("t1"));
        assert!(set.contains("t1"));
    }
}
