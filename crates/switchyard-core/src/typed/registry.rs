//! PayloadSchemas - task_type ごとの payload 検証
//!
//! Router は payload を不透明な JSON として扱います。
//! 具体的な backend 呼び出しの直前（adapter の submit）でだけ、
//! task_type をキーにした tagged union として解釈します。
//!
//! # 内部実装
//! - `register::<T: TypedTask>()` で登録
//! - 内部的に TypedSchema<T> でラップして型消去
//! - HashMap<String, Arc<dyn PayloadSchema>> で管理

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use super::task::TypedTask;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema for task type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("payload for '{task_type}' does not match its schema: {message}")]
    Decode { task_type: String, message: String },

    #[error("expected task type '{expected}', got '{actual}'")]
    TypeMismatch { expected: String, actual: String },
}

/// Object-safe payload check.
pub trait PayloadSchema: Send + Sync {
    fn check(&self, payload: &serde_json::Value) -> Result<(), SchemaError>;
    fn task_type(&self) -> &str;
}

struct TypedSchema<T: TypedTask> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: TypedTask> PayloadSchema for TypedSchema<T> {
    fn check(&self, payload: &serde_json::Value) -> Result<(), SchemaError> {
        T::deserialize(payload)
            .map(|_| ())
            .map_err(|e| SchemaError::Decode {
                task_type: T::TYPE.to_string(),
                message: e.to_string(),
            })
    }

    fn task_type(&self) -> &str {
        T::TYPE
    }
}

/// Registered payload schemas keyed by task type.
///
/// Built during initialization (mutable) and shared immutably afterwards.
/// Unregistered task types pass through unchecked.
#[derive(Default, Clone)]
pub struct PayloadSchemas {
    schemas: HashMap<String, Arc<dyn PayloadSchema>>,
}

impl PayloadSchemas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: TypedTask>(&mut self) -> Result<(), SchemaError> {
        let task_type = T::TYPE.to_string();
        if self.schemas.contains_key(&task_type) {
            return Err(SchemaError::AlreadyRegistered(task_type));
        }
        let schema: Arc<dyn PayloadSchema> = Arc::new(TypedSchema::<T> {
            _marker: PhantomData,
        });
        self.schemas.insert(task_type, schema);
        Ok(())
    }

    /// Builder-style `register`.
    pub fn with<T: TypedTask>(mut self) -> Result<Self, SchemaError> {
        self.register::<T>()?;
        Ok(self)
    }

    pub fn check(&self, task_type: &str, payload: &serde_json::Value) -> Result<(), SchemaError> {
        match self.schemas.get(task_type) {
            Some(schema) => schema.check(payload),
            None => Ok(()),
        }
    }

    pub fn is_registered(&self, task_type: &str) -> bool {
        self.schemas.contains_key(task_type)
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.schemas.keys().cloned().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for PayloadSchemas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadSchemas")
            .field("types", &self.registered_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::task::fixtures::{ConvertController, PublishDocs};
    use serde_json::json;

    #[test]
    fn registered_schema_rejects_malformed_payload() {
        let schemas = PayloadSchemas::new().with::<ConvertController>().unwrap();

        assert!(
            schemas
                .check(ConvertController::TYPE, &json!({"source_path": "a.php"}))
                .is_ok()
        );
        let err = schemas
            .check(ConvertController::TYPE, &json!({"path": 1}))
            .unwrap_err();
        assert!(matches!(err, SchemaError::Decode { .. }));
    }

    #[test]
    fn unregistered_types_pass_through() {
        let schemas = PayloadSchemas::new();
        assert!(schemas.check("anything", &json!(null)).is_ok());
    }

    #[test]
    fn double_registration_is_an_error() {
        let mut schemas = PayloadSchemas::new();
        schemas.register::<PublishDocs>().unwrap();
        let result = schemas.register::<PublishDocs>();
        assert!(matches!(result, Err(SchemaError::AlreadyRegistered(_))));
    }

    #[test]
    fn registered_types_are_sorted() {
        let schemas = PayloadSchemas::new()
            .with::<PublishDocs>()
            .unwrap()
            .with::<ConvertController>()
            .unwrap();
        assert_eq!(
            schemas.registered_types(),
            vec![ConvertController::TYPE.to_string(), PublishDocs::TYPE.to_string()]
        );
        assert!(schemas.is_registered(PublishDocs::TYPE));
    }
}
