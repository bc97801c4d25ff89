//! Type-erased values threaded through a compiled action.
//!
//! Every bound argument, default value and intermediate handler result is a
//! [`Value`]: a shared `Any`. The static type travels next to it as a
//! [`ValueType`], which compares by `TypeId` only and optionally knows how to
//! encode the value as JSON (needed for view models and HTTP responses).

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

/// Shared, type-erased value.
pub type Value = Arc<dyn Any + Send + Sync>;

type Encoder = fn(&(dyn Any + Send + Sync)) -> Result<serde_json::Value, EncodeError>;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("values of type '{ty}' cannot be encoded")]
    NotSerializable { ty: &'static str },
    #[error("value is not a '{expected}'")]
    TypeMismatch { expected: &'static str },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Runtime descriptor of a static Rust type.
#[derive(Clone, Copy)]
pub struct ValueType {
    id: TypeId,
    name: &'static str,
    encoder: Option<Encoder>,
}

impl ValueType {
    /// Descriptor without a JSON encoder (services, ambient values, ...).
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            encoder: None,
        }
    }

    /// Descriptor for handler results; the value can be encoded as JSON.
    pub fn serializable<T: Serialize + Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            encoder: Some(encode_json::<T>),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name, e.g. `String` for `alloc::string::String`.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }

    pub fn is_serializable(&self) -> bool {
        self.encoder.is_some()
    }

    /// True when `value` actually holds an instance of this type.
    pub fn matches(&self, value: &Value) -> bool {
        (**value).type_id() == self.id
    }

    pub fn encode(&self, value: &Value) -> Result<serde_json::Value, EncodeError> {
        match self.encoder {
            Some(encode) => encode(&**value),
            None => Err(EncodeError::NotSerializable { ty: self.name }),
        }
    }

    /// JSON Schema primitive used when documenting a parameter of this type.
    pub fn json_type(&self) -> &'static str {
        match self.short_name() {
            "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
            | "u128" | "usize" => "integer",
            "f32" | "f64" => "number",
            "bool" => "boolean",
            "String" | "str" | "&str" | "char" | "Uuid" => "string",
            _ => "object",
        }
    }
}

fn encode_json<T: Serialize + Any>(
    value: &(dyn Any + Send + Sync),
) -> Result<serde_json::Value, EncodeError> {
    let typed = value
        .downcast_ref::<T>()
        .ok_or(EncodeError::TypeMismatch {
            expected: type_name::<T>(),
        })?;
    Ok(serde_json::to_value(typed)?)
}

impl PartialEq for ValueType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ValueType {}

impl Hash for ValueType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A value together with its static type.
#[derive(Clone)]
pub struct TypedValue {
    value: Value,
    ty: ValueType,
}

impl TypedValue {
    pub fn new(value: Value, ty: ValueType) -> Self {
        Self { value, ty }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_type(&self) -> ValueType {
        self.ty
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn to_json(&self) -> Result<serde_json::Value, EncodeError> {
        self.ty.encode(&self.value)
    }
}

impl fmt::Debug for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedValue").field("ty", &self.ty).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_encoder() {
        assert_eq!(ValueType::of::<i32>(), ValueType::serializable::<i32>());
        assert_ne!(ValueType::of::<i32>(), ValueType::of::<i64>());
    }

    #[test]
    fn json_type_hints() {
        assert_eq!(ValueType::of::<u64>().json_type(), "integer");
        assert_eq!(ValueType::of::<f32>().json_type(), "number");
        assert_eq!(ValueType::of::<bool>().json_type(), "boolean");
        assert_eq!(ValueType::of::<String>().json_type(), "string");
        assert_eq!(ValueType::of::<Vec<u8>>().json_type(), "object");
        assert_eq!(ValueType::of::<String>().short_name(), "String");
    }

    #[test]
    fn matches_inspects_payload_not_arc() {
        let v: Value = Arc::new(7u16);
        assert!(ValueType::of::<u16>().matches(&v));
        assert!(!ValueType::of::<u32>().matches(&v));
    }

    #[test]
    fn encode_requires_serializable_descriptor() {
        let v: Value = Arc::new("hi".to_string());
        let json = ValueType::serializable::<String>().encode(&v).unwrap();
        assert_eq!(json, serde_json::json!("hi"));

        let err = ValueType::of::<String>().encode(&v).unwrap_err();
        assert!(matches!(err, EncodeError::NotSerializable { .. }));
    }
}
