//! Host Arrays
//!
//! Host arrays are fixed-shape, fixed-element-type, row-major buffers with an
//! arbitrary rank and an arbitrary lower bound per dimension. Storage is
//! shared: cloning a [`HostArray`] clones the reference, not the elements.
//!
//! ## Bounds
//!
//! Dimension `d` accepts indices in `[lower_bound(d), upper_bound(d)]` where
//! `upper_bound(d) = lower_bound(d) + length(d) - 1`. An empty dimension has
//! `upper_bound = lower_bound - 1`.
//!
//! ## Failure Model
//!
//! Primitives report failures as [`HostException`]s of the standard types the
//! host itself would throw (`IndexOutOfRangeException`, `RankException`,
//! `InvalidCastException`, ...).

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::exception::{HostException, HostResult};
use crate::types::StdException;
use crate::value::HostValue;

// ============================================================================
// ElementType
// ============================================================================

/// Element type of a host array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementType {
    Bool,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    Char,
    String,
    Object,
}

impl ElementType {
    /// Every element type
    pub const ALL: [ElementType; 14] = [
        ElementType::Bool,
        ElementType::SByte,
        ElementType::Byte,
        ElementType::Int16,
        ElementType::UInt16,
        ElementType::Int32,
        ElementType::UInt32,
        ElementType::Int64,
        ElementType::UInt64,
        ElementType::Single,
        ElementType::Double,
        ElementType::Char,
        ElementType::String,
        ElementType::Object,
    ];

    /// Fully qualified host type name
    pub fn host_name(&self) -> &'static str {
        match self {
            ElementType::Bool => "System.Boolean",
            ElementType::SByte => "System.SByte",
            ElementType::Byte => "System.Byte",
            ElementType::Int16 => "System.Int16",
            ElementType::UInt16 => "System.UInt16",
            ElementType::Int32 => "System.Int32",
            ElementType::UInt32 => "System.UInt32",
            ElementType::Int64 => "System.Int64",
            ElementType::UInt64 => "System.UInt64",
            ElementType::Single => "System.Single",
            ElementType::Double => "System.Double",
            ElementType::Char => "System.Char",
            ElementType::String => "System.String",
            ElementType::Object => "System.Object",
        }
    }

    /// Name the guest language shows for this type
    pub fn guest_name(&self) -> &'static str {
        match self {
            ElementType::Bool => "bool",
            ElementType::SByte => "SByte",
            ElementType::Byte => "Byte",
            ElementType::Int16 => "Int16",
            ElementType::UInt16 => "UInt16",
            ElementType::Int32 => "int",
            ElementType::UInt32 => "UInt32",
            ElementType::Int64 => "long",
            ElementType::UInt64 => "UInt64",
            ElementType::Single => "Single",
            ElementType::Double => "float",
            ElementType::Char => "Char",
            ElementType::String => "str",
            ElementType::Object => "object",
        }
    }

    /// Check if this is an integer type
    pub fn is_integer(&self) -> bool {
        self.integer_range().is_some()
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, ElementType::Single | ElementType::Double)
    }

    /// Check if this is an integer or floating point type
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Inclusive value range of an integer type
    pub fn integer_range(&self) -> Option<(i128, i128)> {
        match self {
            ElementType::SByte => Some((i8::MIN.into(), i8::MAX.into())),
            ElementType::Byte => Some((u8::MIN.into(), u8::MAX.into())),
            ElementType::Int16 => Some((i16::MIN.into(), i16::MAX.into())),
            ElementType::UInt16 => Some((u16::MIN.into(), u16::MAX.into())),
            ElementType::Int32 => Some((i32::MIN.into(), i32::MAX.into())),
            ElementType::UInt32 => Some((u32::MIN.into(), u32::MAX.into())),
            ElementType::Int64 => Some((i64::MIN.into(), i64::MAX.into())),
            ElementType::UInt64 => Some((u64::MIN.into(), u64::MAX.into())),
            _ => None,
        }
    }

    /// Number of significand bits of a floating point type
    pub fn mantissa_bits(&self) -> Option<u32> {
        match self {
            ElementType::Single => Some(f32::MANTISSA_DIGITS),
            ElementType::Double => Some(f64::MANTISSA_DIGITS),
            _ => None,
        }
    }

    /// Value a freshly allocated element holds
    pub fn default_value(&self) -> HostValue {
        match self {
            ElementType::Bool => HostValue::Bool(false),
            ElementType::SByte => HostValue::SByte(0),
            ElementType::Byte => HostValue::Byte(0),
            ElementType::Int16 => HostValue::Int16(0),
            ElementType::UInt16 => HostValue::UInt16(0),
            ElementType::Int32 => HostValue::Int32(0),
            ElementType::UInt32 => HostValue::UInt32(0),
            ElementType::Int64 => HostValue::Int64(0),
            ElementType::UInt64 => HostValue::UInt64(0),
            ElementType::Single => HostValue::Single(0.0),
            ElementType::Double => HostValue::Double(0.0),
            ElementType::Char => HostValue::Char('\0'),
            ElementType::String | ElementType::Object => HostValue::Null,
        }
    }

    /// Check whether a value can be stored without conversion
    pub fn accepts(&self, value: &HostValue) -> bool {
        match (self, value) {
            (ElementType::Object, _) => true,
            (ElementType::String, HostValue::Null) => true,
            (ty, value) => value.element_type() == Some(*ty),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.host_name())
    }
}

// ============================================================================
// HostArray
// ============================================================================

static NEXT_ARRAY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct ArrayStorage {
    element_type: ElementType,
    lengths: Vec<usize>,
    lower_bounds: Vec<i64>,
    data: Vec<HostValue>,
}

impl ArrayStorage {
    fn flat_index(&self, indices: &[i64]) -> HostResult<usize> {
        if indices.len() != self.lengths.len() {
            return Err(HostException::new(
                StdException::ArgumentException,
                "Indices length does not match the array rank.",
            ));
        }

        let mut flat = 0usize;
        for ((&index, &length), &lower) in indices
            .iter()
            .zip(self.lengths.iter())
            .zip(self.lower_bounds.iter())
        {
            let offset = i128::from(index) - i128::from(lower);
            if offset < 0 || offset >= length as i128 {
                return Err(HostException::new(
                    StdException::IndexOutOfRangeException,
                    "Index was outside the bounds of the array.",
                ));
            }
            flat = flat * length + offset as usize;
        }
        Ok(flat)
    }
}

/// Reference to host array storage.
#[derive(Debug, Clone)]
pub struct HostArray {
    id: u64,
    storage: Rc<RefCell<ArrayStorage>>,
}

/// Buffer of `total` elements, or `OutOfMemoryException` when the buffer
/// cannot be allocated.
fn reserve_elements(total: usize) -> HostResult<Vec<HostValue>> {
    let out_of_memory = || {
        HostException::new(
            StdException::OutOfMemoryException,
            "Array dimensions exceeded supported range.",
        )
    };
    let bytes = total
        .checked_mul(mem::size_of::<HostValue>())
        .ok_or_else(out_of_memory)?;
    if bytes > isize::MAX as usize {
        return Err(out_of_memory());
    }

    let mut data = Vec::new();
    data.try_reserve_exact(total).map_err(|_| {
        HostException::new(
            StdException::OutOfMemoryException,
            "Insufficient memory to continue the execution of the program.",
        )
    })?;
    Ok(data)
}

impl HostArray {
    /// Allocate a default-initialized array
    pub fn create_instance(
        element_type: ElementType,
        lengths: &[usize],
        lower_bounds: &[i64],
    ) -> HostResult<Self> {
        let total = Self::checked_total(lengths, lower_bounds)?;
        let mut data = reserve_elements(total)?;
        data.resize(total, element_type.default_value());
        Ok(Self::with_data(element_type, lengths, lower_bounds, data))
    }

    /// Element count of a valid shape
    fn checked_total(lengths: &[usize], lower_bounds: &[i64]) -> HostResult<usize> {
        if lengths.is_empty() {
            return Err(HostException::new(
                StdException::ArgumentException,
                "Arrays must have at least one dimension.",
            ));
        }
        if lengths.len() != lower_bounds.len() {
            return Err(HostException::new(
                StdException::ArgumentException,
                "The length arrays must have the same number of elements.",
            ));
        }
        for (&length, &lower) in lengths.iter().zip(lower_bounds) {
            let upper = i64::try_from(length)
                .ok()
                .and_then(|len| lower.checked_add(len))
                .and_then(|end| end.checked_sub(1));
            if upper.is_none() {
                return Err(HostException::new(
                    StdException::ArgumentOutOfRangeException,
                    "Higher indices will exceed Int64.MaxValue.",
                ));
            }
        }

        lengths
            .iter()
            .try_fold(1usize, |acc, &len| acc.checked_mul(len))
            .ok_or_else(|| {
                HostException::new(
                    StdException::OutOfMemoryException,
                    "Array dimensions exceeded supported range.",
                )
            })
    }

    fn with_data(
        element_type: ElementType,
        lengths: &[usize],
        lower_bounds: &[i64],
        data: Vec<HostValue>,
    ) -> Self {
        let id = NEXT_ARRAY_ID.fetch_add(1, Ordering::Relaxed);
        debug!(id, rank = lengths.len(), ?lengths, ?lower_bounds, element = %element_type, "allocated host array");

        Self {
            id,
            storage: Rc::new(RefCell::new(ArrayStorage {
                element_type,
                lengths: lengths.to_vec(),
                lower_bounds: lower_bounds.to_vec(),
                data,
            })),
        }
    }

    /// Allocate a zero-based one-dimensional array
    pub fn vector(element_type: ElementType, length: usize) -> HostResult<Self> {
        Self::create_instance(element_type, &[length], &[0])
    }

    /// Allocate a one-dimensional array holding `values`
    pub fn from_values(
        element_type: ElementType,
        values: Vec<HostValue>,
        lower_bound: i64,
    ) -> HostResult<Self> {
        if let Some(bad) = values.iter().find(|v| !element_type.accepts(v)) {
            return Err(invalid_cast(bad, element_type));
        }
        let lengths = [values.len()];
        Self::checked_total(&lengths, &[lower_bound])?;
        Ok(Self::with_data(element_type, &lengths, &[lower_bound], values))
    }

    /// Stable identity of the underlying storage
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check whether two handles share storage
    pub fn ptr_eq(&self, other: &HostArray) -> bool {
        Rc::ptr_eq(&self.storage, &other.storage)
    }

    /// Element type
    pub fn element_type(&self) -> ElementType {
        self.storage.borrow().element_type
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.storage.borrow().lengths.len()
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.storage.borrow().data.len()
    }

    /// Check if the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-dimension lengths
    pub fn lengths(&self) -> Vec<usize> {
        self.storage.borrow().lengths.clone()
    }

    /// Per-dimension lower bounds
    pub fn lower_bounds(&self) -> Vec<i64> {
        self.storage.borrow().lower_bounds.clone()
    }

    /// Length of one dimension
    pub fn get_length(&self, dimension: usize) -> HostResult<usize> {
        self.storage
            .borrow()
            .lengths
            .get(dimension)
            .copied()
            .ok_or_else(index_out_of_range)
    }

    /// Lower bound of one dimension
    pub fn get_lower_bound(&self, dimension: usize) -> HostResult<i64> {
        self.storage
            .borrow()
            .lower_bounds
            .get(dimension)
            .copied()
            .ok_or_else(index_out_of_range)
    }

    /// Upper bound of one dimension
    pub fn get_upper_bound(&self, dimension: usize) -> HostResult<i64> {
        let lower = self.get_lower_bound(dimension)?;
        let length = self.get_length(dimension)?;
        // create_instance guarantees lower + length - 1 fits
        Ok(lower + length as i64 - 1)
    }

    /// Read the element at a multi-dimensional index
    pub fn get_value(&self, indices: &[i64]) -> HostResult<HostValue> {
        let storage = self.storage.borrow();
        let flat = storage.flat_index(indices)?;
        Ok(storage.data[flat].clone())
    }

    /// Write the element at a multi-dimensional index
    pub fn set_value(&self, value: HostValue, indices: &[i64]) -> HostResult<()> {
        let mut storage = self.storage.borrow_mut();
        if !storage.element_type.accepts(&value) {
            return Err(invalid_cast(&value, storage.element_type));
        }
        let flat = storage.flat_index(indices)?;
        storage.data[flat] = value;
        Ok(())
    }

    /// Read the element at a row-major position
    pub fn get_flat(&self, position: usize) -> HostResult<HostValue> {
        self.storage
            .borrow()
            .data
            .get(position)
            .cloned()
            .ok_or_else(index_out_of_range)
    }

    /// Write the element at a row-major position
    pub fn set_flat(&self, position: usize, value: HostValue) -> HostResult<()> {
        let mut storage = self.storage.borrow_mut();
        if !storage.element_type.accepts(&value) {
            return Err(invalid_cast(&value, storage.element_type));
        }
        let slot = storage
            .data
            .get_mut(position)
            .ok_or_else(index_out_of_range)?;
        *slot = value;
        Ok(())
    }

    /// Snapshot of all elements in row-major order
    pub fn values(&self) -> Vec<HostValue> {
        self.storage.borrow().data.clone()
    }

    /// Reverse a one-dimensional array in place
    pub fn reverse(&self) -> HostResult<()> {
        let mut storage = self.storage.borrow_mut();
        if storage.lengths.len() != 1 {
            return Err(HostException::new(
                StdException::RankException,
                "Only single dimension arrays are supported here.",
            ));
        }
        storage.data.reverse();
        Ok(())
    }
}

fn invalid_cast(value: &HostValue, element_type: ElementType) -> HostException {
    HostException::new(
        StdException::InvalidCastException,
        format!(
            "Unable to cast object of type '{}' to type '{}'.",
            value.type_name(),
            element_type.host_name()
        ),
    )
}

fn index_out_of_range() -> HostException {
    HostException::new(
        StdException::IndexOutOfRangeException,
        "Index was outside the bounds of the array.",
    )
}
