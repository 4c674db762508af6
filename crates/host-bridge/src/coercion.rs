//! Type Coercion
//!
//! Conversions between guest values and fixed-width host representations.
//!
//! ## Traits
//!
//! - [`FromGuest`]: guest value to a host primitive, with overflow detection
//! - [`ToGuest`]: host primitive or [`HostValue`] to a guest value
//!
//! ## Element Coercion
//!
//! Two strictness levels exist for storing a guest value into an array slot:
//!
//! - [`coerce_element`] is assignment: integers are range-checked
//!   (`OverflowError`), integers round into float slots, doubles narrow to
//!   singles when in range, and incompatible kinds raise `TypeError`.
//! - [`coerce_lossless`] is construction: only conversions that preserve the
//!   value exactly are accepted; everything else is `TypeError`.
//!
//! [`common_element_type`] and [`widen`] implement the widening lattice used
//! to pick the element type of a concatenation.

use host_runtime::{ElementType, HostObject, HostValue};
use smol_str::SmolStr;

use crate::error::{GuestException, GuestResult};
use crate::foreign_array::ForeignArray;
use crate::runtime::InteropRuntime;
use crate::value::GuestValue;

// ============================================================================
// FromGuest
// ============================================================================

/// Conversion from a guest value to a host primitive.
pub trait FromGuest: Sized {
    /// Convert, raising `OverflowError` for out-of-range integers and
    /// `TypeError` for incompatible kinds.
    fn from_guest(value: &GuestValue) -> GuestResult<Self>;
}

/// Integer payload of a guest value (`bool` counts as an integer).
pub fn guest_integer(value: &GuestValue) -> Option<i128> {
    match value {
        GuestValue::Bool(b) => Some(i128::from(*b)),
        GuestValue::Int(n) => Some(*n),
        GuestValue::Host(HostValue::Bool(b)) => Some(i128::from(*b)),
        GuestValue::Host(host) => host.as_i128(),
        _ => None,
    }
}

/// Floating point payload of a guest value.
pub fn guest_float(value: &GuestValue) -> Option<f64> {
    match value {
        GuestValue::Float(f) => Some(*f),
        GuestValue::Host(host) => host.as_f64(),
        _ => None,
    }
}

fn type_mismatch(expected: &str, value: &GuestValue) -> GuestException {
    GuestException::type_error(format!(
        "expected {}, got {}",
        expected,
        value.type_name()
    ))
}

fn out_of_range(n: i128, target: &str) -> GuestException {
    GuestException::overflow(format!("{} is out of range for {}", n, target))
}

macro_rules! impl_from_guest_int {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromGuest for $ty {
                fn from_guest(value: &GuestValue) -> GuestResult<Self> {
                    let n = guest_integer(value).ok_or_else(|| type_mismatch($name, value))?;
                    <$ty>::try_from(n).map_err(|_| out_of_range(n, $name))
                }
            }
        )*
    };
}

impl_from_guest_int! {
    i8 => "SByte",
    u8 => "Byte",
    i16 => "Int16",
    u16 => "UInt16",
    i32 => "int",
    u32 => "UInt32",
    i64 => "long",
    u64 => "UInt64",
}

impl FromGuest for bool {
    fn from_guest(value: &GuestValue) -> GuestResult<Self> {
        match value {
            GuestValue::Bool(b) | GuestValue::Host(HostValue::Bool(b)) => Ok(*b),
            _ => Err(type_mismatch("bool", value)),
        }
    }
}

impl FromGuest for f64 {
    fn from_guest(value: &GuestValue) -> GuestResult<Self> {
        if let Some(f) = guest_float(value) {
            return Ok(f);
        }
        // Integers round to the nearest float
        guest_integer(value)
            .map(|n| n as f64)
            .ok_or_else(|| type_mismatch("float", value))
    }
}

impl FromGuest for f32 {
    fn from_guest(value: &GuestValue) -> GuestResult<Self> {
        if let Some(f) = guest_float(value) {
            if f.is_finite() && f.abs() > f64::from(f32::MAX) {
                return Err(GuestException::overflow(format!(
                    "{} is out of range for Single",
                    f
                )));
            }
            return Ok(f as f32);
        }
        guest_integer(value)
            .map(|n| n as f32)
            .ok_or_else(|| type_mismatch("Single", value))
    }
}

impl FromGuest for char {
    fn from_guest(value: &GuestValue) -> GuestResult<Self> {
        match value {
            GuestValue::Host(HostValue::Char(c)) => Ok(*c),
            GuestValue::Str(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(GuestException::type_error(format!(
                        "expected a character, got a string of length {}",
                        s.chars().count()
                    ))),
                }
            }
            _ => Err(type_mismatch("Char", value)),
        }
    }
}

impl FromGuest for SmolStr {
    fn from_guest(value: &GuestValue) -> GuestResult<Self> {
        match value {
            GuestValue::Str(s) | GuestValue::Host(HostValue::String(s)) => Ok(s.clone()),
            _ => Err(type_mismatch("str", value)),
        }
    }
}

// ============================================================================
// ToGuest
// ============================================================================

/// Conversion from a host primitive to a guest value.
pub trait ToGuest {
    fn to_guest(&self) -> GuestValue;
}

macro_rules! impl_to_guest_int {
    ($($ty:ty),*) => {
        $(
            impl ToGuest for $ty {
                fn to_guest(&self) -> GuestValue {
                    GuestValue::Int(i128::from(*self))
                }
            }
        )*
    };
}

impl_to_guest_int!(i8, u8, i16, u16, i32, u32, i64, u64);

impl ToGuest for bool {
    fn to_guest(&self) -> GuestValue {
        GuestValue::Bool(*self)
    }
}

impl ToGuest for f32 {
    fn to_guest(&self) -> GuestValue {
        GuestValue::Host(HostValue::Single(*self))
    }
}

impl ToGuest for f64 {
    fn to_guest(&self) -> GuestValue {
        GuestValue::Float(*self)
    }
}

impl ToGuest for char {
    fn to_guest(&self) -> GuestValue {
        GuestValue::Str(SmolStr::new(self.encode_utf8(&mut [0u8; 4])))
    }
}

impl ToGuest for SmolStr {
    fn to_guest(&self) -> GuestValue {
        GuestValue::Str(self.clone())
    }
}

impl ToGuest for str {
    fn to_guest(&self) -> GuestValue {
        GuestValue::Str(self.into())
    }
}

impl ToGuest for HostValue {
    fn to_guest(&self) -> GuestValue {
        match self {
            HostValue::Null => GuestValue::None,
            HostValue::Bool(b) => b.to_guest(),
            HostValue::SByte(n) => n.to_guest(),
            HostValue::Byte(n) => n.to_guest(),
            HostValue::Int16(n) => n.to_guest(),
            HostValue::UInt16(n) => n.to_guest(),
            HostValue::Int32(n) => n.to_guest(),
            HostValue::UInt32(n) => n.to_guest(),
            HostValue::Int64(n) => n.to_guest(),
            HostValue::UInt64(n) => n.to_guest(),
            HostValue::Single(f) => f.to_guest(),
            HostValue::Double(f) => f.to_guest(),
            HostValue::Char(c) => c.to_guest(),
            HostValue::String(s) => s.to_guest(),
            HostValue::Object(obj) => match obj.downcast_ref::<GuestValue>() {
                Some(boxed) => boxed.clone(),
                None => GuestValue::Host(self.clone()),
            },
        }
    }
}

/// Convert a host value for the guest, wrapping host arrays as foreign arrays.
pub fn host_to_guest(rt: &InteropRuntime, value: &HostValue) -> GuestValue {
    if let HostValue::Object(obj) = value {
        if let Some(array) = obj.downcast_ref::<host_runtime::HostArray>() {
            return GuestValue::Array(ForeignArray::import(rt, array.clone()));
        }
    }
    value.to_guest()
}

/// Best-effort conversion of a guest value for the host.
///
/// Used for exception payloads and delegate arguments. Guest values with no
/// host counterpart are boxed as host objects and unbox again through
/// [`ToGuest`].
pub fn to_host_value(value: &GuestValue) -> HostValue {
    match value {
        GuestValue::None => HostValue::Null,
        GuestValue::Bool(b) => HostValue::Bool(*b),
        GuestValue::Int(n) => {
            if let Ok(n) = i32::try_from(*n) {
                HostValue::Int32(n)
            } else if let Ok(n) = i64::try_from(*n) {
                HostValue::Int64(n)
            } else if let Ok(n) = u64::try_from(*n) {
                HostValue::UInt64(n)
            } else {
                HostValue::Object(HostObject::new("int", value.clone()))
            }
        }
        GuestValue::Float(f) => HostValue::Double(*f),
        GuestValue::Str(s) => HostValue::String(s.clone()),
        GuestValue::Host(host) => host.clone(),
        GuestValue::Array(array) => HostValue::Object(HostObject::new(
            "System.Array",
            array.host_array().clone(),
        )),
        other => HostValue::Object(HostObject::new(other.type_name(), other.clone())),
    }
}

// ============================================================================
// Element Coercion
// ============================================================================

fn integer_to_host(n: i128, element_type: ElementType) -> Option<HostValue> {
    Some(match element_type {
        ElementType::SByte => HostValue::SByte(i8::try_from(n).ok()?),
        ElementType::Byte => HostValue::Byte(u8::try_from(n).ok()?),
        ElementType::Int16 => HostValue::Int16(i16::try_from(n).ok()?),
        ElementType::UInt16 => HostValue::UInt16(u16::try_from(n).ok()?),
        ElementType::Int32 => HostValue::Int32(i32::try_from(n).ok()?),
        ElementType::UInt32 => HostValue::UInt32(u32::try_from(n).ok()?),
        ElementType::Int64 => HostValue::Int64(i64::try_from(n).ok()?),
        ElementType::UInt64 => HostValue::UInt64(u64::try_from(n).ok()?),
        _ => return None,
    })
}

/// Coerce a guest value for storage into an element slot (assignment).
pub fn coerce_element(value: &GuestValue, element_type: ElementType) -> GuestResult<HostValue> {
    Ok(match element_type {
        ElementType::Bool => HostValue::Bool(bool::from_guest(value)?),
        ElementType::SByte => HostValue::SByte(i8::from_guest(value)?),
        ElementType::Byte => HostValue::Byte(u8::from_guest(value)?),
        ElementType::Int16 => HostValue::Int16(i16::from_guest(value)?),
        ElementType::UInt16 => HostValue::UInt16(u16::from_guest(value)?),
        ElementType::Int32 => HostValue::Int32(i32::from_guest(value)?),
        ElementType::UInt32 => HostValue::UInt32(u32::from_guest(value)?),
        ElementType::Int64 => HostValue::Int64(i64::from_guest(value)?),
        ElementType::UInt64 => HostValue::UInt64(u64::from_guest(value)?),
        ElementType::Single => HostValue::Single(f32::from_guest(value)?),
        ElementType::Double => HostValue::Double(f64::from_guest(value)?),
        ElementType::Char => HostValue::Char(char::from_guest(value)?),
        ElementType::String if value.is_none() => HostValue::Null,
        ElementType::String => HostValue::String(SmolStr::from_guest(value)?),
        ElementType::Object => to_host_value(value),
    })
}

/// Coerce a guest value for storage into an element slot (construction).
///
/// Accepts only conversions that preserve the value exactly.
pub fn coerce_lossless(value: &GuestValue, element_type: ElementType) -> GuestResult<HostValue> {
    let rejected = || {
        GuestException::type_error(format!(
            "expected {}, got {}",
            element_type.guest_name(),
            value.type_name()
        ))
    };

    if element_type.is_integer() {
        let n = guest_integer(value).ok_or_else(rejected)?;
        return integer_to_host(n, element_type).ok_or_else(rejected);
    }

    match element_type {
        ElementType::Double => {
            if let Some(f) = guest_float(value) {
                return Ok(HostValue::Double(f));
            }
            match guest_integer(value) {
                Some(n) if n as f64 as i128 == n => Ok(HostValue::Double(n as f64)),
                _ => Err(rejected()),
            }
        }
        ElementType::Single => {
            if let Some(f) = guest_float(value) {
                let narrowed = f as f32;
                return if f.is_nan() || f64::from(narrowed) == f {
                    Ok(HostValue::Single(narrowed))
                } else {
                    Err(rejected())
                };
            }
            match guest_integer(value) {
                Some(n) if n as f32 as i128 == n => Ok(HostValue::Single(n as f32)),
                _ => Err(rejected()),
            }
        }
        ElementType::Bool => match value {
            GuestValue::Bool(b) | GuestValue::Host(HostValue::Bool(b)) => Ok(HostValue::Bool(*b)),
            _ => Err(rejected()),
        },
        ElementType::Char => char::from_guest(value)
            .map(HostValue::Char)
            .map_err(|_| rejected()),
        ElementType::String if value.is_none() => Ok(HostValue::Null),
        ElementType::String => SmolStr::from_guest(value)
            .map(HostValue::String)
            .map_err(|_| rejected()),
        ElementType::Object => Ok(to_host_value(value)),
        _ => Err(rejected()),
    }
}

// ============================================================================
// Widening Lattice
// ============================================================================

const INTEGER_LADDER: [ElementType; 8] = [
    ElementType::SByte,
    ElementType::Byte,
    ElementType::Int16,
    ElementType::UInt16,
    ElementType::Int32,
    ElementType::UInt32,
    ElementType::Int64,
    ElementType::UInt64,
];

fn integer_bits(element_type: ElementType) -> Option<u32> {
    match element_type {
        ElementType::SByte | ElementType::Byte => Some(8),
        ElementType::Int16 | ElementType::UInt16 => Some(16),
        ElementType::Int32 | ElementType::UInt32 => Some(32),
        ElementType::Int64 | ElementType::UInt64 => Some(64),
        _ => None,
    }
}

/// The most general element type that represents every value of both
/// operands exactly, if one exists.
pub fn common_element_type(a: ElementType, b: ElementType) -> Option<ElementType> {
    if a == b {
        return Some(a);
    }
    if a == ElementType::Object || b == ElementType::Object {
        return Some(ElementType::Object);
    }

    match (a.integer_range(), b.integer_range()) {
        (Some((a_min, a_max)), Some((b_min, b_max))) => {
            let (min, max) = (a_min.min(b_min), a_max.max(b_max));
            return INTEGER_LADDER.into_iter().find(|ty| {
                ty.integer_range()
                    .is_some_and(|(lo, hi)| lo <= min && max <= hi)
            });
        }
        (Some(_), None) | (None, Some(_)) => {
            let (int, float) = if a.is_integer() { (a, b) } else { (b, a) };
            let bits = integer_bits(int)?;
            return match float {
                ElementType::Single if bits <= 16 => Some(ElementType::Single),
                ElementType::Single | ElementType::Double if bits <= 32 => {
                    Some(ElementType::Double)
                }
                _ => None,
            };
        }
        (None, None) => {}
    }

    match (a, b) {
        (ElementType::Single, ElementType::Double) | (ElementType::Double, ElementType::Single) => {
            Some(ElementType::Double)
        }
        _ => None,
    }
}

/// Convert a stored element to a wider element type.
///
/// Returns `None` when the value is not exactly representable in `target`.
pub fn widen(value: &HostValue, target: ElementType) -> Option<HostValue> {
    if target == ElementType::Object || value.element_type() == Some(target) {
        return Some(value.clone());
    }
    if target == ElementType::String && value.is_null() {
        return Some(HostValue::Null);
    }

    if let Some(n) = value.as_i128() {
        return match target {
            ElementType::Double if n as f64 as i128 == n => Some(HostValue::Double(n as f64)),
            ElementType::Single if n as f32 as i128 == n => Some(HostValue::Single(n as f32)),
            _ => integer_to_host(n, target),
        };
    }

    match (value, target) {
        (HostValue::Single(f), ElementType::Double) => Some(HostValue::Double(f64::from(*f))),
        _ => None,
    }
}
