//! The typed [`Value`] slot behind a property.

use std::sync::Arc;

use serde_json::Value as Json;

use super::property_value::{PropertyValue, ValueKind};
use crate::error::PropertyError;
use crate::value::{ObserverId, Value};

mod sealed {
    pub trait Sealed {}
    impl Sealed for bool {}
    impl Sealed for i64 {}
    impl Sealed for f64 {}
    impl Sealed for String {}
    impl Sealed for serde_json::Value {}
}

/// Rust types a property can be backed by.
pub trait PropertyType: sealed::Sealed + Clone + PartialEq + Send + Sync + 'static {
    /// The kind reported for this type.
    const KIND: ValueKind;

    /// Wrap a shared value into a cell.
    fn into_cell(value: Arc<Value<Self>>) -> PropertyCell;

    /// Borrow the shared value if `cell` holds this type.
    fn from_cell(cell: &PropertyCell) -> Option<&Arc<Value<Self>>>;

    /// Render as JSON for notifications and snapshots.
    fn to_json(&self) -> Json;
}

macro_rules! property_type {
    ($ty:ty, $variant:ident, $kind:expr, |$v:ident| $json:expr) => {
        impl PropertyType for $ty {
            const KIND: ValueKind = $kind;

            fn into_cell(value: Arc<Value<Self>>) -> PropertyCell {
                PropertyCell::$variant(value)
            }

            fn from_cell(cell: &PropertyCell) -> Option<&Arc<Value<Self>>> {
                match cell {
                    PropertyCell::$variant(value) => Some(value),
                    _ => None,
                }
            }

            fn to_json(&self) -> Json {
                let $v = self;
                $json
            }
        }

        impl From<Value<$ty>> for PropertyCell {
            fn from(value: Value<$ty>) -> Self {
                Self::$variant(Arc::new(value))
            }
        }

        impl From<Arc<Value<$ty>>> for PropertyCell {
            fn from(value: Arc<Value<$ty>>) -> Self {
                Self::$variant(value)
            }
        }
    };
}

property_type!(bool, Bool, ValueKind::Boolean, |v| Json::Bool(*v));
property_type!(i64, Int, ValueKind::Integer, |v| Json::from(*v));
property_type!(f64, Float, ValueKind::Number, |v| Json::from(*v));
property_type!(String, String, ValueKind::String, |v| Json::String(v.clone()));
property_type!(Json, Json, ValueKind::Json, |v| v.clone());

/// A property's backing value, one variant per supported type.
///
/// Cells hold the value behind an [`Arc`], so the same value can back
/// several properties.
#[derive(Debug, Clone)]
pub enum PropertyCell {
    Bool(Arc<Value<bool>>),
    Int(Arc<Value<i64>>),
    Float(Arc<Value<f64>>),
    String(Arc<Value<String>>),
    Json(Arc<Value<Json>>),
}

impl PropertyCell {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Boolean,
            Self::Int(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Number,
            Self::String(_) => ValueKind::String,
            Self::Json(_) => ValueKind::Json,
        }
    }

    /// The current value, `None` while unknown.
    #[must_use]
    pub fn get(&self) -> Option<PropertyValue> {
        match self {
            Self::Bool(v) => v.get().map(PropertyValue::Bool),
            Self::Int(v) => v.get().map(PropertyValue::Int),
            Self::Float(v) => v.get().map(PropertyValue::Float),
            Self::String(v) => v.get().map(PropertyValue::String),
            Self::Json(v) => v.get().map(PropertyValue::Json),
        }
    }

    /// The current value as JSON, `null` while unknown.
    #[must_use]
    pub fn get_json(&self) -> Json {
        self.get().map_or(Json::Null, |v| v.to_json())
    }

    /// Convert `value` into this cell's kind.
    ///
    /// Integers widen into number cells and JSON cells take any value.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::TypeMismatch`] for any other combination.
    #[allow(clippy::cast_precision_loss)]
    pub fn coerce(&self, value: PropertyValue) -> Result<PropertyValue, PropertyError> {
        match (self, value) {
            (Self::Float(_), PropertyValue::Int(i)) => Ok(PropertyValue::Float(i as f64)),
            (Self::Json(_), value) => Ok(PropertyValue::Json(value.to_json())),
            (cell, value) if cell.kind() == value.kind() => Ok(value),
            (cell, value) => Err(PropertyError::TypeMismatch {
                expected: cell.kind(),
                actual: value.kind(),
            }),
        }
    }

    /// Write through [`Value::set`] after coercion.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::TypeMismatch`] when `value` cannot be
    /// coerced into this cell's kind.
    pub fn set(&self, value: PropertyValue) -> Result<(), PropertyError> {
        match (self, self.coerce(value)?) {
            (Self::Bool(cell), PropertyValue::Bool(v)) => cell.set(v),
            (Self::Int(cell), PropertyValue::Int(v)) => cell.set(v),
            (Self::Float(cell), PropertyValue::Float(v)) => cell.set(v),
            (Self::String(cell), PropertyValue::String(v)) => cell.set(v),
            (Self::Json(cell), PropertyValue::Json(v)) => cell.set(v),
            (cell, other) => {
                return Err(PropertyError::TypeMismatch {
                    expected: cell.kind(),
                    actual: other.kind(),
                });
            }
        }
        Ok(())
    }

    /// Call `observer` with the JSON rendering of every change.
    pub(crate) fn observe(&self, observer: impl Fn(Json) + Send + Sync + 'static) -> ObserverId {
        fn attach<T: PropertyType>(
            value: &Value<T>,
            observer: impl Fn(Json) + Send + Sync + 'static,
        ) -> ObserverId {
            value.add_observer(move |v: &T| observer(v.to_json()))
        }
        match self {
            Self::Bool(v) => attach(v, observer),
            Self::Int(v) => attach(v, observer),
            Self::Float(v) => attach(v, observer),
            Self::String(v) => attach(v, observer),
            Self::Json(v) => attach(v, observer),
        }
    }

    pub(crate) fn unobserve(&self, id: ObserverId) -> bool {
        match self {
            Self::Bool(v) => v.remove_observer(id),
            Self::Int(v) => v.remove_observer(id),
            Self::Float(v) => v.remove_observer(id),
            Self::String(v) => v.remove_observer(id),
            Self::Json(v) => v.remove_observer(id),
        }
    }
}
