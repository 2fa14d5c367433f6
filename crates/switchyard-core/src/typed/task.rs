//! TypedTask trait - task_type と payload 型の対応付け
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::registry::SchemaError;
use crate::domain::{TaskDescription, TaskId};

/// TypedTask は task_type と payload 型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct ConvertController {
///     source_path: String,
/// }
///
/// impl TypedTask for ConvertController {
///     const TYPE: &'static str = "codegen.convert_controller.v1";
/// }
///
/// let task = ConvertController { source_path: "app/Http/UserController.php".into() }
///     .describe("convert-user-controller")?;
/// ```
pub trait TypedTask: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// task_type の定義
    ///
    /// # 命名規約
    /// - `{domain}.{action}.v{major}`
    /// - 例: `codegen.convert_controller.v1`
    const TYPE: &'static str;

    /// Build a `TaskDescription` carrying this value as its payload.
    fn describe(&self, id: impl Into<TaskId>) -> Result<TaskDescription, serde_json::Error> {
        let payload = serde_json::to_value(self)?;
        Ok(TaskDescription::new(id, Self::TYPE).with_payload(payload))
    }
}

/// Decode the payload of a description into `T`, checking the type name first.
pub fn decode_payload<T: TypedTask>(task: &TaskDescription) -> Result<T, SchemaError> {
    if task.task_type.as_str() != T::TYPE {
        return Err(SchemaError::TypeMismatch {
            expected: T::TYPE.to_string(),
            actual: task.task_type.to_string(),
        });
    }
    serde_json::from_value(task.payload.clone()).map_err(|e| SchemaError::Decode {
        task_type: T::TYPE.to_string(),
        message: e.to_string(),
    })
}
