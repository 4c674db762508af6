//! Foreign Array Adapter
//!
//! [`ForeignArray`] is a guest view of a host array. It never copies the host
//! storage; reads and writes go straight through to the host array, and only
//! slicing, concatenation and repetition allocate new arrays.
//!
//! ## Indexing
//!
//! An index is a tuple with one integer per dimension (a bare integer for
//! one-dimensional arrays). Components are host indices in
//! `[lower_bound, upper_bound]`. When a dimension's lower bound is
//! non-negative, negative components count back from `upper_bound + 1`, so
//! `-1` is its last element. A dimension with a negative lower bound has its
//! own negative indices and takes every component as-is.
//!
//! ## Slicing
//!
//! Only one-dimensional arrays can be sliced. A slice read produces a new
//! array with the configured canonical lower bound; a slice write must supply
//! exactly as many values as the slice selects.
//!
//! ## Type Identity
//!
//! Every array with the same element type reports the same [`ArrayType`],
//! regardless of rank, bounds or how the array was produced.

use std::fmt;

use host_runtime::{ElementType, HostArray, HostException, HostValue};
use tracing::{debug, trace};

use crate::coercion::{
    coerce_element, coerce_lossless, common_element_type, guest_integer, host_to_guest, widen,
};
use crate::error::{GuestErrorKind, GuestException, GuestResult};
use crate::runtime::InteropRuntime;
use crate::value::{GuestSlice, GuestValue};

// ============================================================================
// ArrayType
// ============================================================================

/// Guest-visible type of foreign arrays with a given element type.
#[derive(Debug, PartialEq, Eq)]
pub struct ArrayType {
    element_type: ElementType,
}

impl ArrayType {
    const fn new(element_type: ElementType) -> Self {
        Self { element_type }
    }

    /// The unique type object for an element type
    pub fn of(element_type: ElementType) -> &'static ArrayType {
        // Indexed by ElementType discriminant
        static ARRAY_TYPES: [ArrayType; 14] = [
            ArrayType::new(ElementType::Bool),
            ArrayType::new(ElementType::SByte),
            ArrayType::new(ElementType::Byte),
            ArrayType::new(ElementType::Int16),
            ArrayType::new(ElementType::UInt16),
            ArrayType::new(ElementType::Int32),
            ArrayType::new(ElementType::UInt32),
            ArrayType::new(ElementType::Int64),
            ArrayType::new(ElementType::UInt64),
            ArrayType::new(ElementType::Single),
            ArrayType::new(ElementType::Double),
            ArrayType::new(ElementType::Char),
            ArrayType::new(ElementType::String),
            ArrayType::new(ElementType::Object),
        ];
        &ARRAY_TYPES[element_type as usize]
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Host name of the array type (`System.Int32[]`)
    pub fn host_name(&self) -> String {
        format!("{}[]", self.element_type.host_name())
    }

    /// Identity comparison
    pub fn is(&self, other: &ArrayType) -> bool {
        std::ptr::eq(self, other)
    }
}

impl fmt::Display for ArrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array[{}]", self.element_type.guest_name())
    }
}

// ============================================================================
// ForeignArray
// ============================================================================

/// One resolved component of a multi-index.
#[derive(Debug, Clone, Copy)]
enum IndexComponent {
    Index(i64),
    Slice(GuestSlice),
}

/// What a multi-index selects.
enum Selection {
    Element(Vec<i64>),
    Slice(GuestSlice),
}

/// Guest view of a host array.
#[derive(Clone)]
pub struct ForeignArray {
    rt: InteropRuntime,
    array: HostArray,
    element_type: ElementType,
    lengths: Vec<usize>,
    lower_bounds: Vec<i64>,
}

impl ForeignArray {
    /// Allocate a default-initialized host array
    pub fn create(
        rt: &InteropRuntime,
        element_type: ElementType,
        lengths: &[usize],
        lower_bounds: &[i64],
    ) -> GuestResult<Self> {
        let array = rt
            .host()
            .create_array(element_type, lengths, lower_bounds)
            .map_err(|e| rt.map_host_error(&e))?;
        Ok(Self::import(rt, array))
    }

    /// Wrap an existing host array
    pub fn import(rt: &InteropRuntime, array: HostArray) -> Self {
        Self {
            rt: rt.clone(),
            element_type: array.element_type(),
            lengths: array.lengths(),
            lower_bounds: array.lower_bounds(),
            array,
        }
    }

    /// Build a one-dimensional array from a list, tuple or foreign array.
    ///
    /// Every element must convert to `element_type` without loss.
    pub fn from_sequence(
        rt: &InteropRuntime,
        element_type: ElementType,
        sequence: &GuestValue,
    ) -> GuestResult<Self> {
        let items = sequence_items(sequence)?;
        Self::from_values(rt, element_type, &items)
    }

    /// Build a one-dimensional array from guest values.
    pub fn from_values(
        rt: &InteropRuntime,
        element_type: ElementType,
        values: &[GuestValue],
    ) -> GuestResult<Self> {
        let host_values = values
            .iter()
            .map(|value| coerce_lossless(value, element_type))
            .collect::<GuestResult<Vec<_>>>()?;
        Self::allocate(rt, element_type, host_values)
    }

    fn allocate(
        rt: &InteropRuntime,
        element_type: ElementType,
        values: Vec<HostValue>,
    ) -> GuestResult<Self> {
        let array = HostArray::from_values(element_type, values, rt.config().canonical_lower_bound)
            .map_err(|e| rt.map_host_error(&e))?;
        Ok(Self::import(rt, array))
    }

    fn host_error(&self, exc: HostException) -> GuestException {
        self.rt.map_host_error(&exc)
    }

    /// The underlying host array
    pub fn host_array(&self) -> &HostArray {
        &self.array
    }

    /// Check whether two views share host storage
    pub fn same_storage(&self, other: &ForeignArray) -> bool {
        self.array.ptr_eq(&other.array)
    }

    pub fn array_type(&self) -> &'static ArrayType {
        ArrayType::of(self.element_type)
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn rank(&self) -> usize {
        self.lengths.len()
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn lower_bounds(&self) -> &[i64] {
        &self.lower_bounds
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.lengths.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lower bound of one dimension
    pub fn lower_bound(&self, dimension: usize) -> GuestResult<i64> {
        self.array
            .get_lower_bound(dimension)
            .map_err(|e| self.host_error(e))
    }

    /// Upper bound of one dimension (`lower_bound - 1` when empty)
    pub fn upper_bound(&self, dimension: usize) -> GuestResult<i64> {
        self.array
            .get_upper_bound(dimension)
            .map_err(|e| self.host_error(e))
    }

    // ------------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------------

    fn components(&self, index: &GuestValue) -> GuestResult<Vec<IndexComponent>> {
        let parts: &[GuestValue] = match index {
            GuestValue::Tuple(items) => items,
            single => std::slice::from_ref(single),
        };

        parts
            .iter()
            .map(|part| match part {
                GuestValue::Slice(slice) => Ok(IndexComponent::Slice(*slice)),
                other => match guest_integer(other) {
                    Some(n) => i64::try_from(n).map(IndexComponent::Index).map_err(|_| {
                        GuestException::index_error(format!("index {} is out of range", n))
                    }),
                    None => Err(GuestException::type_error(format!(
                        "array indices must be integers or slices, not {}",
                        other.type_name()
                    ))),
                },
            })
            .collect()
    }

    /// Resolve a multi-index to host indices, or to the slice it selects
    /// from a one-dimensional array.
    fn resolve(&self, index: &GuestValue) -> GuestResult<Selection> {
        let components = self.components(index)?;
        let rank = self.rank();

        if components
            .iter()
            .any(|c| matches!(c, IndexComponent::Slice(_)))
        {
            if rank > 1 {
                return Err(GuestException::not_implemented(
                    "slicing multi-dimensional arrays is not supported",
                ));
            }
            if let [IndexComponent::Slice(slice)] = components.as_slice() {
                return Ok(Selection::Slice(*slice));
            }
        }

        if components.len() != rank {
            return Err(GuestException::type_error(format!(
                "expected {} {}, got {}",
                rank,
                if rank == 1 { "index" } else { "indices" },
                components.len()
            )));
        }

        let mut indices = Vec::with_capacity(rank);
        for (dimension, component) in components.into_iter().enumerate() {
            let IndexComponent::Index(raw) = component else {
                return Err(GuestException::type_error("array indices must be integers"));
            };
            let lower = i128::from(self.lower_bounds[dimension]);
            let upper = lower + self.lengths[dimension] as i128 - 1;
            // Count-back only applies to dimensions without negative indices
            let resolved = if raw < 0 && lower >= 0 {
                upper + 1 + i128::from(raw)
            } else {
                i128::from(raw)
            };
            if resolved < lower || resolved > upper {
                return Err(GuestException::index_error(format!(
                    "index {} is out of range for dimension {} with bounds [{}, {}]",
                    raw, dimension, lower, upper
                )));
            }
            // within [lower, upper], both of which are i64
            indices.push(resolved as i64);
        }
        Ok(Selection::Element(indices))
    }

    /// `self[index]`
    pub fn get_item(&self, index: &GuestValue) -> GuestResult<GuestValue> {
        match self.resolve(index)? {
            Selection::Element(indices) => {
                let value = self
                    .array
                    .get_value(&indices)
                    .map_err(|e| self.host_error(e))?;
                Ok(host_to_guest(&self.rt, &value))
            }
            Selection::Slice(slice) => self.get_slice(&slice).map(GuestValue::Array),
        }
    }

    /// `self[index] = value`
    pub fn set_item(&self, index: &GuestValue, value: &GuestValue) -> GuestResult<()> {
        match self.resolve(index)? {
            Selection::Element(indices) => {
                let host_value = coerce_element(value, self.element_type)?;
                self.array
                    .set_value(host_value, &indices)
                    .map_err(|e| self.host_error(e))
            }
            Selection::Slice(slice) => self.set_slice(&slice, value),
        }
    }

    fn require_vector(&self, operation: &str) -> GuestResult<()> {
        if self.rank() == 1 {
            Ok(())
        } else {
            Err(GuestException::not_implemented(format!(
                "{} is only supported for one-dimensional arrays",
                operation
            )))
        }
    }

    /// Read a slice of a one-dimensional array into a new array
    pub fn get_slice(&self, slice: &GuestSlice) -> GuestResult<ForeignArray> {
        self.require_vector("slicing")?;
        let positions = slice.positions(self.lower_bounds[0], self.lengths[0])?;
        let values = positions
            .into_iter()
            .map(|p| self.array.get_flat(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.host_error(e))?;
        trace!(%slice, selected = values.len(), "array slice");
        Self::allocate(&self.rt, self.element_type, values)
    }

    /// Replace the elements a slice selects.
    ///
    /// The replacement must have exactly as many elements as the slice
    /// selects. All values are converted before any element is written.
    pub fn set_slice(&self, slice: &GuestSlice, values: &GuestValue) -> GuestResult<()> {
        self.require_vector("slice assignment")?;
        let positions = slice.positions(self.lower_bounds[0], self.lengths[0])?;
        let items = sequence_items(values)?;
        if items.len() != positions.len() {
            return Err(GuestException::value_error(format!(
                "attempt to assign sequence of size {} to slice of size {}",
                items.len(),
                positions.len()
            )));
        }

        let converted = items
            .iter()
            .map(|item| coerce_element(item, self.element_type))
            .collect::<GuestResult<Vec<_>>>()?;
        for (position, value) in positions.into_iter().zip(converted) {
            self.array
                .set_flat(position, value)
                .map_err(|e| self.host_error(e))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Sequence operations
    // ------------------------------------------------------------------------

    /// `self + other`
    pub fn concat(&self, other: &ForeignArray) -> GuestResult<ForeignArray> {
        if self.rank() != 1 || other.rank() != 1 {
            return Err(GuestException::not_implemented(
                "concatenation is only supported for one-dimensional arrays",
            ));
        }

        let target = common_element_type(self.element_type, other.element_type).ok_or_else(|| {
            GuestException::not_implemented(format!(
                "cannot concatenate {} and {}",
                self.array_type(),
                other.array_type()
            ))
        })?;

        let values = self
            .array
            .values()
            .iter()
            .chain(other.array.values().iter())
            .map(|value| {
                widen(value, target).ok_or_else(|| {
                    GuestException::not_implemented(format!(
                        "cannot widen {} to {}",
                        value.type_name(),
                        target.host_name()
                    ))
                })
            })
            .collect::<GuestResult<Vec<_>>>()?;

        debug!(
            left = %self.array_type(),
            right = %other.array_type(),
            result = %ArrayType::of(target),
            len = values.len(),
            "concatenated arrays"
        );
        Self::allocate(&self.rt, target, values)
    }

    /// `self * count`
    ///
    /// A non-positive count produces an empty array. A result too large to
    /// allocate raises `MemoryError`.
    pub fn repeat(&self, count: i128) -> GuestResult<ForeignArray> {
        self.require_vector("repetition")?;
        let source = self.array.values();
        if count <= 0 || source.is_empty() {
            return Self::allocate(&self.rt, self.element_type, Vec::new());
        }

        let too_large =
            || GuestException::new(GuestErrorKind::MemoryError, "repeated array is too large");
        let times = usize::try_from(count).map_err(|_| too_large())?;
        let total = source.len().checked_mul(times).ok_or_else(too_large)?;
        let bytes = total
            .checked_mul(std::mem::size_of::<HostValue>())
            .ok_or_else(too_large)?;
        if bytes > isize::MAX as usize {
            return Err(too_large());
        }

        let mut values = Vec::new();
        values.try_reserve_exact(total).map_err(|_| too_large())?;
        for _ in 0..times {
            values.extend_from_slice(&source);
        }
        Self::allocate(&self.rt, self.element_type, values)
    }

    /// Reverse a one-dimensional array in place
    pub fn reverse(&self) -> GuestResult<()> {
        self.array.reverse().map_err(|e| self.host_error(e))
    }

    /// Elements in row-major order
    pub fn iter(&self) -> impl Iterator<Item = GuestValue> + '_ {
        self.array
            .values()
            .into_iter()
            .map(move |value| host_to_guest(&self.rt, &value))
    }

    pub fn to_vec(&self) -> Vec<GuestValue> {
        self.iter().collect()
    }

    /// Guest `repr`
    pub fn repr(&self) -> String {
        if self.rank() != 1 {
            return format!(
                "<{} dimensional {} at 0x{:016X}>",
                self.rank(),
                self.array_type(),
                self.array.id()
            );
        }

        let values = self.array.values();
        let shown = match self.rt.config().repr_max_elements {
            Some(max) => max.min(values.len()),
            None => values.len(),
        };
        let mut parts: Vec<String> = values[..shown]
            .iter()
            .map(|value| host_to_guest(&self.rt, value).repr())
            .collect();
        if shown < values.len() {
            parts.push("...".to_string());
        }
        format!("{}(({}))", self.array_type(), parts.join(", "))
    }
}

fn sequence_items(sequence: &GuestValue) -> GuestResult<Vec<GuestValue>> {
    match sequence {
        GuestValue::Tuple(items) | GuestValue::List(items) => Ok(items.clone()),
        GuestValue::Array(array) => Ok(array.to_vec()),
        other => Err(GuestException::type_error(format!(
            "expected a sequence, got {}",
            other.type_name()
        ))),
    }
}

impl PartialEq for ForeignArray {
    fn eq(&self, other: &Self) -> bool {
        self.element_type == other.element_type
            && self.lengths == other.lengths
            && self.array.values() == other.array.values()
    }
}

impl fmt::Display for ForeignArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl fmt::Debug for ForeignArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignArray")
            .field("type", &self.array_type().to_string())
            .field("lengths", &self.lengths)
            .field("lower_bounds", &self.lower_bounds)
            .finish()
    }
}
