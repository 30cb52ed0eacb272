//! Property: a named, typed, observable attribute of a thing.
//!
//! A property wraps a [`PropertyCell`] together with its JSON metadata. Client
//! writes go through [`Property::set_value`], which rejects wrong-typed
//! values, honours `readOnly` and checks the value against the metadata
//! through the [`SchemaValidator`] before touching the cell. Every change of
//! the cell is published as a `propertyStatus` message once the property is
//! attached to a thing.

mod cell;
mod property_value;

pub use cell::{PropertyCell, PropertyType};
pub use property_value::{PropertyValue, ValueKind};

use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use serde_json::{Value as Json, json};

use crate::error::PropertyError;
use crate::notification::Notifier;
use crate::sync::{lock, read, write};
use crate::validation::SchemaValidator;
use crate::value::ObserverId;

/// A named property with metadata and a typed backing value.
pub struct Property {
    name: String,
    metadata: Json,
    cell: PropertyCell,
    href_prefix: RwLock<String>,
    validator: RwLock<Option<Arc<dyn SchemaValidator>>>,
    target: Arc<RwLock<Option<Notifier>>>,
    observer: Mutex<Option<ObserverId>>,
}

impl Property {
    /// Create a property backed by `cell`.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::MetadataNotObject`] when `metadata` is not a
    /// JSON object.
    pub fn new(
        name: impl Into<String>,
        cell: impl Into<PropertyCell>,
        metadata: Json,
    ) -> Result<Self, PropertyError> {
        if !metadata.is_object() {
            return Err(PropertyError::MetadataNotObject);
        }
        let name = name.into();
        Ok(Self {
            name: name.into(),
            metadata,
            cell: cell.into(),
            href_prefix: RwLock::new(String::new()),
            validator: RwLock::new(None),
            target: Arc::new(RwLock::new(None)),
            observer: Mutex::new(None),
        })
    }

    /// Use `validator` for schema checks instead of the thing's default.
    #[must_use]
    pub fn with_validator(self, validator: Arc<dyn SchemaValidator>) -> Self {
        *write(&self.validator) = Some(validator);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn metadata(&self) -> &Json {
        &self.metadata
    }

    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.cell.kind()
    }

    #[must_use]
    pub fn cell(&self) -> &PropertyCell {
        &self.cell
    }

    /// Whether the metadata declares `"readOnly": true`.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.metadata
            .get("readOnly")
            .and_then(Json::as_bool)
            .unwrap_or(false)
    }

    /// The current value, `None` while unknown.
    #[must_use]
    pub fn value(&self) -> Option<PropertyValue> {
        self.cell.get()
    }

    /// The current value as JSON, `null` while unknown.
    #[must_use]
    pub fn value_json(&self) -> Json {
        self.cell.get_json()
    }

    /// The current value as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::TypeMismatch`] when the property is not
    /// backed by a `T`.
    pub fn typed_value<T: PropertyType>(&self) -> Result<Option<T>, PropertyError> {
        T::from_cell(&self.cell)
            .map(|value| value.get())
            .ok_or(PropertyError::TypeMismatch {
                expected: self.cell.kind(),
                actual: T::KIND,
            })
    }

    /// Check that a client may write `value`.
    ///
    /// # Errors
    ///
    /// - [`PropertyError::ReadOnly`] when the property is read-only
    /// - [`PropertyError::InvalidValue`] when the validator rejects the value
    pub fn validate_value(&self, value: &PropertyValue) -> Result<(), PropertyError> {
        if self.is_read_only() {
            return Err(PropertyError::ReadOnly);
        }
        let validator = read(&self.validator).clone();
        match validator {
            Some(validator) => validator
                .validate(&value.to_json(), &self.metadata)
                .map_err(PropertyError::InvalidValue),
            None => Ok(()),
        }
    }

    /// Type-check, validate, then write `value` through the cell.
    ///
    /// # Errors
    ///
    /// - [`PropertyError::TypeMismatch`] when `value` has the wrong kind
    /// - any error of [`Property::validate_value`]
    pub fn set_value(&self, value: impl Into<PropertyValue>) -> Result<(), PropertyError> {
        let value = self.cell.coerce(value.into())?;
        self.validate_value(&value)?;
        self.cell.set(value)
    }

    /// Publish a device-side change without forwarding or validation.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::TypeMismatch`] when `value` has the wrong kind.
    pub fn notify_of_external_update(
        &self,
        value: impl Into<PropertyValue>,
    ) -> Result<(), PropertyError> {
        match (&self.cell, self.cell.coerce(value.into())?) {
            (PropertyCell::Bool(cell), PropertyValue::Bool(v)) => cell.notify_of_external_update(v),
            (PropertyCell::Int(cell), PropertyValue::Int(v)) => cell.notify_of_external_update(v),
            (PropertyCell::Float(cell), PropertyValue::Float(v)) => {
                cell.notify_of_external_update(v);
            }
            (PropertyCell::String(cell), PropertyValue::String(v)) => {
                cell.notify_of_external_update(v);
            }
            (PropertyCell::Json(cell), PropertyValue::Json(v)) => cell.notify_of_external_update(v),
            (cell, other) => {
                return Err(PropertyError::TypeMismatch {
                    expected: cell.kind(),
                    actual: other.kind(),
                });
            }
        }
        Ok(())
    }

    /// Path of this property below the thing, with prefix.
    #[must_use]
    pub fn href(&self) -> String {
        format!("{}/properties/{}", read(&self.href_prefix), self.name)
    }

    pub fn set_href_prefix(&self, prefix: impl Into<String>) {
        *write(&self.href_prefix) = prefix.into();
    }

    /// The metadata with a `property` link appended to its `links`.
    #[must_use]
    pub fn as_property_description(&self) -> Json {
        let mut description = self.metadata.clone();
        let link = json!({"rel": "property", "href": self.href()});
        if let Some(object) = description.as_object_mut() {
            match object.get_mut("links").and_then(Json::as_array_mut) {
                Some(links) => links.push(link),
                None => {
                    object.insert("links".to_string(), json!([link]));
                }
            }
        }
        description
    }

    /// Route change notifications to `notifier`; keep an explicit
    /// validator, otherwise adopt `validator`.
    pub(crate) fn attach(&self, notifier: Notifier, validator: &Arc<dyn SchemaValidator>) {
        *write(&self.target) = Some(notifier);
        {
            let mut own = write(&self.validator);
            if own.is_none() {
                *own = Some(Arc::clone(validator));
            }
        }
        let mut observer = lock(&self.observer);
        if observer.is_none() {
            let slot = Arc::clone(&self.target);
            let name = self.name.clone();
            *observer = Some(self.cell.observe(move |value| {
                let notifier = read(&slot).clone();
                if let Some(notifier) = notifier {
                    notifier.property_notify(&name, value);
                }
            }));
        }
    }

    /// Stop publishing change notifications and release the cell observer.
    pub(crate) fn detach(&self) {
        *write(&self.target) = None;
        if let Some(id) = lock(&self.observer).take() {
            self.cell.unobserve(id);
        }
    }
}

impl Drop for Property {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .field("cell", &self.cell)
            .finish_non_exhaustive()
    }
}
