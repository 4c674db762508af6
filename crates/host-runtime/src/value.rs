//! Host Value Representations
//!
//! `HostValue` is the tagged representation of a host scalar or object as it
//! flows through host primitives (array elements, constructor arguments,
//! delegate arguments and return values).
//!
//! ## Objects
//!
//! Anything that is not a fixed-width scalar or a string is carried as a
//! [`HostObject`]: a named, reference-counted, type-erased payload. Object
//! identity is pointer identity, which is how the host compares references.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::array::ElementType;

// ============================================================================
// HostObject
// ============================================================================

/// Opaque reference to a host object.
#[derive(Clone)]
pub struct HostObject {
    type_name: SmolStr,
    payload: Rc<dyn Any>,
}

impl HostObject {
    /// Box a value as a host object
    pub fn new<T: Any>(type_name: impl Into<SmolStr>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            payload: Rc::new(value),
        }
    }

    /// Host type name of the object
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Borrow the payload as a concrete type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Reference identity
    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.payload, &other.payload)
    }
}

impl PartialEq for HostObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({})", self.type_name)
    }
}

// ============================================================================
// HostValue
// ============================================================================

/// A host value.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    /// Null reference
    Null,
    /// `System.Boolean`
    Bool(bool),
    /// `System.SByte`
    SByte(i8),
    /// `System.Byte`
    Byte(u8),
    /// `System.Int16`
    Int16(i16),
    /// `System.UInt16`
    UInt16(u16),
    /// `System.Int32`
    Int32(i32),
    /// `System.UInt32`
    UInt32(u32),
    /// `System.Int64`
    Int64(i64),
    /// `System.UInt64`
    UInt64(u64),
    /// `System.Single`
    Single(f32),
    /// `System.Double`
    Double(f64),
    /// `System.Char`
    Char(char),
    /// `System.String`
    String(SmolStr),
    /// Any other reference
    Object(HostObject),
}

impl HostValue {
    /// Runtime element type of this value (`None` for null)
    pub fn element_type(&self) -> Option<ElementType> {
        Some(match self {
            HostValue::Null => return None,
            HostValue::Bool(_) => ElementType::Bool,
            HostValue::SByte(_) => ElementType::SByte,
            HostValue::Byte(_) => ElementType::Byte,
            HostValue::Int16(_) => ElementType::Int16,
            HostValue::UInt16(_) => ElementType::UInt16,
            HostValue::Int32(_) => ElementType::Int32,
            HostValue::UInt32(_) => ElementType::UInt32,
            HostValue::Int64(_) => ElementType::Int64,
            HostValue::UInt64(_) => ElementType::UInt64,
            HostValue::Single(_) => ElementType::Single,
            HostValue::Double(_) => ElementType::Double,
            HostValue::Char(_) => ElementType::Char,
            HostValue::String(_) => ElementType::String,
            HostValue::Object(_) => ElementType::Object,
        })
    }

    /// Host type name of this value
    pub fn type_name(&self) -> &str {
        match self {
            HostValue::Null => "null",
            HostValue::Object(obj) => obj.type_name(),
            other => match other.element_type() {
                Some(ty) => ty.host_name(),
                None => "null",
            },
        }
    }

    /// Integer payload, widened (`None` for non-integers)
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            HostValue::SByte(n) => Some(i128::from(*n)),
            HostValue::Byte(n) => Some(i128::from(*n)),
            HostValue::Int16(n) => Some(i128::from(*n)),
            HostValue::UInt16(n) => Some(i128::from(*n)),
            HostValue::Int32(n) => Some(i128::from(*n)),
            HostValue::UInt32(n) => Some(i128::from(*n)),
            HostValue::Int64(n) => Some(i128::from(*n)),
            HostValue::UInt64(n) => Some(i128::from(*n)),
            _ => None,
        }
    }

    /// Floating point payload (`None` for non-floats)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Single(f) => Some(f64::from(*f)),
            HostValue::Double(f) => Some(*f),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Check for null
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }
}

impl Default for HostValue {
    fn default() -> Self {
        HostValue::Null
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => write!(f, "null"),
            HostValue::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            HostValue::SByte(n) => write!(f, "{}", n),
            HostValue::Byte(n) => write!(f, "{}", n),
            HostValue::Int16(n) => write!(f, "{}", n),
            HostValue::UInt16(n) => write!(f, "{}", n),
            HostValue::Int32(n) => write!(f, "{}", n),
            HostValue::UInt32(n) => write!(f, "{}", n),
            HostValue::Int64(n) => write!(f, "{}", n),
            HostValue::UInt64(n) => write!(f, "{}", n),
            HostValue::Single(n) => write!(f, "{}", n),
            HostValue::Double(n) => write!(f, "{}", n),
            HostValue::Char(c) => write!(f, "{}", c),
            HostValue::String(s) => write!(f, "{}", s),
            HostValue::Object(obj) => write!(f, "{}", obj.type_name()),
        }
    }
}
