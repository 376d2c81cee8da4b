//! Pluggable document models and id generators
//!
//! A [`Model`] validates (and may transform) every value before it is
//! written. Rejection is a `Error::Validation` raised before any substrate
//! call. An [`IdGenerator`] produces ids for `add`; the default is a
//! time-ordered uuid v7, so generated ids iterate in insertion order.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use stratadex_core::{DocumentId, Result, Value};
use uuid::Uuid;

/// Validation and transformation applied to every written value
pub trait Model: Send + Sync {
    /// Return the value to store, or a validation error
    fn parse(&self, input: Value) -> Result<Value>;
}

/// Accepts every value unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyModel;

impl Model for AnyModel {
    fn parse(&self, input: Value) -> Result<Value> {
        Ok(input)
    }
}

/// Model backed by a closure
///
/// ```ignore
/// let model = FnModel::new(|v: Value| {
///     if v.get("name").is_none() {
///         return Err(Error::validation("name is required"));
///     }
///     Ok(v)
/// });
/// ```
pub struct FnModel<F>(F);

impl<F> FnModel<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        FnModel(f)
    }
}

impl<F> Model for FnModel<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    fn parse(&self, input: Value) -> Result<Value> {
        (self.0)(input)
    }
}

impl<F> fmt::Debug for FnModel<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnModel")
    }
}

/// Produces ids for documents added without one
#[async_trait]
pub trait IdGenerator: Send + Sync {
    /// Id for a new document holding `value`
    async fn generate(&self, value: &Value) -> Result<DocumentId>;
}

/// uuid v7 strings
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV7Ids;

#[async_trait]
impl IdGenerator for UuidV7Ids {
    async fn generate(&self, _value: &Value) -> Result<DocumentId> {
        Ok(DocumentId::String(Uuid::now_v7().to_string()))
    }
}

/// Synchronous id function of the value
pub struct FnIdGenerator<F>(F);

impl<F> FnIdGenerator<F>
where
    F: Fn(&Value) -> Result<DocumentId> + Send + Sync,
{
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        FnIdGenerator(f)
    }
}

#[async_trait]
impl<F> IdGenerator for FnIdGenerator<F>
where
    F: Fn(&Value) -> Result<DocumentId> + Send + Sync,
{
    async fn generate(&self, value: &Value) -> Result<DocumentId> {
        (self.0)(value)
    }
}

/// Shared default model
pub(crate) fn default_model() -> Arc<dyn Model> {
    Arc::new(AnyModel)
}

/// Shared default id generator
pub(crate) fn default_id_generator() -> Arc<dyn IdGenerator> {
    Arc::new(UuidV7Ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratadex_core::Error;

    #[test]
    fn test_fn_model_rejects() {
        let model = FnModel::new(|v: Value| {
            if v.as_int().is_some() {
                Ok(v)
            } else {
                Err(Error::validation("expected an int"))
            }
        });
        assert!(model.parse(Value::Int(1)).is_ok());
        assert!(model.parse(Value::from("x")).unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_uuid_v7_ids() {
        let id = UuidV7Ids.generate(&Value::Null).await.unwrap();
        let parsed = Uuid::parse_str(id.as_str().unwrap()).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
        assert_ne!(id, UuidV7Ids.generate(&Value::Null).await.unwrap());
    }

    #[tokio::test]
    async fn test_fn_id_generator_uses_value() {
        let gen = FnIdGenerator::new(|v: &Value| {
            v.get("email")
                .and_then(Value::as_str)
                .map(DocumentId::from)
                .ok_or_else(|| Error::validation("email required"))
        });
        let mut obj = Value::object();
        obj.as_object_mut().unwrap().insert("email".into(), "a@b".into());
        assert_eq!(gen.generate(&obj).await.unwrap(), DocumentId::from("a@b"));
    }
}
