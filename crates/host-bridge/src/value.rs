//! Guest Value Representations
//!
//! The values the guest evaluator hands to the adapters and gets back from
//! them. Native guest scalars and sequences have their own variants; host
//! scalars with no native guest counterpart (a `System.Single`, an opaque
//! host object) travel as [`GuestValue::Host`].
//!
//! ## Representation
//!
//! [`GuestValue::repr`] renders values the way the guest's `repr` builtin
//! does: strings are quoted, floats always show a fractional part or an
//! exponent, and one-element tuples keep their trailing comma.

use std::fmt;
use std::rc::Rc;

use host_runtime::HostValue;
use smol_str::SmolStr;

use crate::error::{GuestException, GuestResult};
use crate::foreign_array::ForeignArray;
use crate::foreign_event::BoundEvent;

// ============================================================================
// GuestValue
// ============================================================================

/// A guest value.
#[derive(Debug, Clone)]
pub enum GuestValue {
    /// `None`
    None,
    /// `bool`
    Bool(bool),
    /// `int`
    Int(i128),
    /// `float`
    Float(f64),
    /// `str`
    Str(SmolStr),
    /// `tuple`
    Tuple(Vec<GuestValue>),
    /// `list`
    List(Vec<GuestValue>),
    /// `slice`
    Slice(GuestSlice),
    /// Foreign host array
    Array(ForeignArray),
    /// Function or bound method
    Callable(GuestCallable),
    /// Raw multi-subscriber accessor of a foreign event
    BoundEvent(BoundEvent),
    /// Host value with no native guest counterpart
    Host(HostValue),
}

/// Numeric view used for cross-type equality (`1 == 1.0 == True`).
enum Number {
    Int(i128),
    Float(f64),
}

impl GuestValue {
    /// Guest type name
    pub fn type_name(&self) -> String {
        match self {
            GuestValue::None => "NoneType".to_string(),
            GuestValue::Bool(_) => "bool".to_string(),
            GuestValue::Int(_) => "int".to_string(),
            GuestValue::Float(_) => "float".to_string(),
            GuestValue::Str(_) => "str".to_string(),
            GuestValue::Tuple(_) => "tuple".to_string(),
            GuestValue::List(_) => "list".to_string(),
            GuestValue::Slice(_) => "slice".to_string(),
            GuestValue::Array(array) => array.array_type().to_string(),
            GuestValue::Callable(callable) => {
                if callable.receiver().is_some() {
                    "instancemethod".to_string()
                } else {
                    "function".to_string()
                }
            }
            GuestValue::BoundEvent(_) => "BoundEvent".to_string(),
            GuestValue::Host(HostValue::Object(obj)) => obj.type_name().to_string(),
            GuestValue::Host(value) => match value.element_type() {
                Some(ty) => ty.guest_name().to_string(),
                None => "NoneType".to_string(),
            },
        }
    }

    /// Check for `None` (including a host null)
    pub fn is_none(&self) -> bool {
        matches!(self, GuestValue::None | GuestValue::Host(HostValue::Null))
    }

    /// Items of a tuple or list
    pub fn as_sequence(&self) -> Option<&[GuestValue]> {
        match self {
            GuestValue::Tuple(items) | GuestValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Invoke the value.
    ///
    /// Only callables can be invoked; anything else raises `TypeError`.
    pub fn call(&self, args: &[GuestValue]) -> GuestResult<GuestValue> {
        match self {
            GuestValue::Callable(callable) => callable.call(args),
            GuestValue::BoundEvent(_) => Err(GuestException::not_callable("BoundEvent")),
            other => Err(GuestException::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Guest `repr`
    pub fn repr(&self) -> String {
        match self {
            GuestValue::None => "None".to_string(),
            GuestValue::Bool(b) => bool_repr(*b).to_string(),
            GuestValue::Int(n) => n.to_string(),
            GuestValue::Float(f) => float_repr(*f),
            GuestValue::Str(s) => str_repr(s),
            GuestValue::Tuple(items) => match items.as_slice() {
                [single] => format!("({},)", single.repr()),
                _ => format!("({})", join_reprs(items)),
            },
            GuestValue::List(items) => format!("[{}]", join_reprs(items)),
            GuestValue::Slice(slice) => slice.to_string(),
            GuestValue::Array(array) => array.repr(),
            GuestValue::Callable(callable) => match callable.receiver() {
                Some(receiver) => format!(
                    "<bound method {} of {}>",
                    callable.name(),
                    receiver.repr()
                ),
                None => format!("<function {}>", callable.name()),
            },
            GuestValue::BoundEvent(event) => format!("<BoundEvent {}>", event.name()),
            GuestValue::Host(value) => host_repr(value),
        }
    }

    fn number(&self) -> Option<Number> {
        match self {
            GuestValue::Bool(b) => Some(Number::Int(i128::from(*b))),
            GuestValue::Int(n) => Some(Number::Int(*n)),
            GuestValue::Float(f) => Some(Number::Float(*f)),
            GuestValue::Host(value) => match (value.as_i128(), value.as_f64()) {
                (Some(n), _) => Some(Number::Int(n)),
                (None, Some(f)) => Some(Number::Float(f)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl PartialEq for GuestValue {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.number(), other.number()) {
            return match (a, b) {
                (Number::Int(a), Number::Int(b)) => a == b,
                (Number::Float(a), Number::Float(b)) => a == b,
                (Number::Int(i), Number::Float(f)) | (Number::Float(f), Number::Int(i)) => {
                    f.fract() == 0.0 && f == i as f64 && f as i128 == i
                }
            };
        }

        match (self, other) {
            (a, b) if a.is_none() && b.is_none() => true,
            (GuestValue::Str(a), GuestValue::Str(b)) => a == b,
            (GuestValue::Tuple(a), GuestValue::Tuple(b)) => a == b,
            (GuestValue::List(a), GuestValue::List(b)) => a == b,
            (GuestValue::Slice(a), GuestValue::Slice(b)) => a == b,
            (GuestValue::Array(a), GuestValue::Array(b)) => a == b,
            (GuestValue::Callable(a), GuestValue::Callable(b)) => a == b,
            (GuestValue::BoundEvent(a), GuestValue::BoundEvent(b)) => a == b,
            (GuestValue::Host(a), GuestValue::Host(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for GuestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestValue::Str(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.repr()),
        }
    }
}

impl From<bool> for GuestValue {
    fn from(value: bool) -> Self {
        GuestValue::Bool(value)
    }
}

impl From<i64> for GuestValue {
    fn from(value: i64) -> Self {
        GuestValue::Int(value.into())
    }
}

impl From<i128> for GuestValue {
    fn from(value: i128) -> Self {
        GuestValue::Int(value)
    }
}

impl From<f64> for GuestValue {
    fn from(value: f64) -> Self {
        GuestValue::Float(value)
    }
}

impl From<&str> for GuestValue {
    fn from(value: &str) -> Self {
        GuestValue::Str(value.into())
    }
}

impl From<ForeignArray> for GuestValue {
    fn from(value: ForeignArray) -> Self {
        GuestValue::Array(value)
    }
}

// ============================================================================
// GuestSlice
// ============================================================================

/// A guest `slice(start, stop, step)` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuestSlice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl GuestSlice {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self { start, stop, step }
    }

    /// `[:]`
    pub fn full() -> Self {
        Self::default()
    }

    /// Storage offsets selected from a dimension with the given lower bound
    /// and length, in selection order.
    ///
    /// Bounds are host indices. Negative bounds count back from one past the
    /// upper bound, unless the lower bound is itself negative. Out-of-range
    /// bounds clamp. A zero step raises `ValueError`.
    pub fn positions(&self, lower: i64, len: usize) -> GuestResult<Vec<usize>> {
        let step = i128::from(self.step.unwrap_or(1));
        if step == 0 {
            return Err(GuestException::value_error("slice step cannot be zero"));
        }

        let len = len as i128;
        let (low, high) = if step > 0 { (0, len) } else { (-1, len - 1) };
        let resolve = |bound: Option<i64>, default: i128| match bound {
            None => default,
            Some(b) if b < 0 && lower >= 0 => (len + i128::from(b)).clamp(low, high),
            Some(b) => (i128::from(b) - i128::from(lower)).clamp(low, high),
        };

        let (start, stop) = if step > 0 {
            (resolve(self.start, low), resolve(self.stop, high))
        } else {
            (resolve(self.start, high), resolve(self.stop, low))
        };

        let count = if step > 0 && start < stop {
            (stop - start - 1) / step + 1
        } else if step < 0 && start > stop {
            (start - stop - 1) / (-step) + 1
        } else {
            0
        };

        Ok((0..count)
            .map(|i| (start + i * step) as usize)
            .collect())
    }
}

impl fmt::Display for GuestSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |bound: Option<i64>| bound.map_or("None".to_string(), |b| b.to_string());
        write!(
            f,
            "slice({}, {}, {})",
            part(self.start),
            part(self.stop),
            part(self.step)
        )
    }
}

// ============================================================================
// GuestCallable
// ============================================================================

/// Signature of a guest function
pub type GuestFn = dyn Fn(&[GuestValue]) -> GuestResult<GuestValue>;

/// A guest function, optionally bound to a receiver.
///
/// Equality is structural: two callables are equal when they wrap the same
/// function and are bound to equal receivers, so re-binding the same method
/// to the same object produces an equal callable.
#[derive(Clone)]
pub struct GuestCallable {
    name: SmolStr,
    func: Rc<GuestFn>,
    receiver: Option<Box<GuestValue>>,
}

impl GuestCallable {
    pub fn new<F>(name: impl Into<SmolStr>, func: F) -> Self
    where
        F: Fn(&[GuestValue]) -> GuestResult<GuestValue> + 'static,
    {
        Self {
            name: name.into(),
            func: Rc::new(func),
            receiver: None,
        }
    }

    /// Bind to a receiver; the receiver is passed as the first argument
    pub fn bind(&self, receiver: GuestValue) -> Self {
        Self {
            name: self.name.clone(),
            func: Rc::clone(&self.func),
            receiver: Some(Box::new(receiver)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn receiver(&self) -> Option<&GuestValue> {
        self.receiver.as_deref()
    }

    /// Invoke the callable
    pub fn call(&self, args: &[GuestValue]) -> GuestResult<GuestValue> {
        match &self.receiver {
            Some(receiver) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push((**receiver).clone());
                full.extend_from_slice(args);
                (self.func)(&full)
            }
            None => (self.func)(args),
        }
    }
}

impl PartialEq for GuestCallable {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.func) as *const (),
            Rc::as_ptr(&other.func) as *const (),
        ) && self.receiver == other.receiver
    }
}

impl fmt::Debug for GuestCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestCallable")
            .field("name", &self.name)
            .field("receiver", &self.receiver)
            .finish()
    }
}

// ============================================================================
// repr helpers
// ============================================================================

fn join_reprs(items: &[GuestValue]) -> String {
    items
        .iter()
        .map(GuestValue::repr)
        .collect::<Vec<_>>()
        .join(", ")
}

fn bool_repr(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

pub(crate) fn host_repr(value: &HostValue) -> String {
    match value {
        HostValue::Null => "None".to_string(),
        HostValue::Bool(b) => bool_repr(*b).to_string(),
        HostValue::Single(f) => single_repr(*f),
        HostValue::Double(f) => float_repr(*f),
        HostValue::Char(c) => str_repr(c.encode_utf8(&mut [0u8; 4])),
        HostValue::String(s) => str_repr(s),
        HostValue::Object(obj) => format!("<{} object>", obj.type_name()),
        other => other.to_string(),
    }
}

/// Quote a string the way the guest's `repr` does.
pub(crate) fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Guest `repr` of a double.
pub(crate) fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    shortest_repr(&f.to_string(), &format!("{:e}", f))
}

/// Guest `repr` of a single, using the shortest digits that round-trip as `f32`.
pub(crate) fn single_repr(f: f32) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    shortest_repr(&f.to_string(), &format!("{:e}", f))
}

// Positional notation for decimal exponents in [-4, 16), scientific otherwise.
fn shortest_repr(positional: &str, scientific: &str) -> String {
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (scientific, 0),
    };

    if (-4..16).contains(&exponent) {
        if positional.contains('.') {
            positional.to_string()
        } else {
            format!("{}.0", positional)
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}
