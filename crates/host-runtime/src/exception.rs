//! Host Exceptions
//!
//! A [`HostException`] is an instance of a host exception type: the runtime
//! type, a message, an ordered auxiliary data map and an optional inner
//! exception. Host primitives fail with `HostException`s, and the bridge
//! constructs them when guest errors cross into host code.

use indexmap::IndexMap;
use smol_str::SmolStr;
use thiserror::Error;

use crate::types::{HostTypeId, HostTypeInfo, StdException};
use crate::value::HostValue;

/// Result type for host primitives
pub type HostResult<T> = Result<T, HostException>;

/// An instance of a host exception type.
#[derive(Error, Debug, Clone)]
#[error("{type_name}: {message}")]
pub struct HostException {
    type_id: HostTypeId,
    type_name: SmolStr,
    message: String,
    data: IndexMap<SmolStr, HostValue>,
    #[source]
    inner: Option<Box<HostException>>,
}

impl HostException {
    /// Create an instance of a standard exception type
    pub fn new(std: StdException, message: impl Into<String>) -> Self {
        Self::from_parts(std.id(), std.name(), message)
    }

    /// Create an instance of a registered type with its default message
    pub fn of_type(info: &HostTypeInfo) -> Self {
        Self::from_parts(info.id(), info.name(), Self::default_message(info.name()))
    }

    pub(crate) fn from_parts(
        type_id: HostTypeId,
        type_name: impl Into<SmolStr>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_id,
            type_name: type_name.into(),
            message: message.into(),
            data: IndexMap::new(),
            inner: None,
        }
    }

    /// Message used by parameterless constructors
    pub fn default_message(type_name: &str) -> String {
        format!("Exception of type '{}' was thrown.", type_name)
    }

    /// Runtime type of this exception
    pub fn host_type(&self) -> HostTypeId {
        self.type_id
    }

    /// Runtime type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Exception message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Replace the message
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    /// Auxiliary data entries in insertion order
    pub fn data(&self) -> &IndexMap<SmolStr, HostValue> {
        &self.data
    }

    /// Look up one auxiliary data entry
    pub fn data_value(&self, key: &str) -> Option<&HostValue> {
        self.data.get(key)
    }

    /// Attach an auxiliary data entry
    pub fn set_data(&mut self, key: impl Into<SmolStr>, value: HostValue) {
        self.data.insert(key.into(), value);
    }

    /// Builder form of [`HostException::set_data`]
    pub fn with_data(mut self, key: impl Into<SmolStr>, value: HostValue) -> Self {
        self.set_data(key, value);
        self
    }

    /// Inner exception
    pub fn inner(&self) -> Option<&HostException> {
        self.inner.as_deref()
    }

    /// Set the inner exception
    pub fn with_inner(mut self, inner: HostException) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_display_and_source() {
        let inner = HostException::new(StdException::IOException, "disk gone");
        let outer = HostException::new(StdException::InvalidOperationException, "save failed")
            .with_inner(inner);

        assert_eq!(
            outer.to_string(),
            "System.InvalidOperationException: save failed"
        );
        assert_eq!(
            outer.source().map(|e| e.to_string()),
            Some("System.IO.IOException: disk gone".to_string())
        );
    }

    #[test]
    fn test_data_preserves_order() {
        let exc = HostException::new(StdException::Exception, "x")
            .with_data("b", HostValue::Int32(2))
            .with_data("a", HostValue::Int32(1));

        let keys: Vec<&str> = exc.data().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(exc.data_value("a"), Some(&HostValue::Int32(1)));
    }

    #[test]
    fn test_default_message() {
        assert_eq!(
            HostException::default_message("System.Exception"),
            "Exception of type 'System.Exception' was thrown."
        );
    }
}
