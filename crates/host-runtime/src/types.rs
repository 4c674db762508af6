//! Host Type Registry
//!
//! This module models the host environment's nominal type hierarchy as far as
//! the bridge needs it: type names, single inheritance, constructor signatures
//! and the `abstract` flag.
//!
//! ## Standard Hierarchy
//!
//! Every registry starts out seeded with the standard exception hierarchy
//! (see [`StdException`]). Standard types occupy the first type ids in
//! declaration order, so a [`StdException`] converts to its [`HostTypeId`]
//! without a registry lookup.
//!
//! ## Custom Types
//!
//! Embedders register additional types with [`TypeRegistry::define`]. A type
//! without a parent becomes an extra root; the host can throw instances of
//! such types even though they do not derive from `System.Exception`.

use std::fmt;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;

use crate::value::HostValue;

// ============================================================================
// HostTypeId
// ============================================================================

/// Index of a type inside a [`TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostTypeId(u32);

impl HostTypeId {
    /// Position of this type in its registry
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for HostTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Constructor Signatures
// ============================================================================

/// Kind of a constructor parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// `System.String` (accepts null)
    String,
    /// `System.Int32`
    Int,
    /// `System.Object` (accepts anything)
    Object,
    /// An inner exception (accepts null)
    Exception,
}

impl ParamKind {
    /// Check whether an argument can be bound to a parameter of this kind
    pub fn accepts(&self, value: &HostValue) -> bool {
        match self {
            ParamKind::String => matches!(value, HostValue::String(_) | HostValue::Null),
            ParamKind::Int => matches!(
                value,
                HostValue::SByte(_)
                    | HostValue::Byte(_)
                    | HostValue::Int16(_)
                    | HostValue::UInt16(_)
                    | HostValue::Int32(_)
            ),
            ParamKind::Object => true,
            ParamKind::Exception => match value {
                HostValue::Null => true,
                HostValue::Object(obj) => obj.downcast_ref::<crate::HostException>().is_some(),
                _ => false,
            },
        }
    }
}

/// A named constructor parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name (used as the data key for non-message arguments)
    pub name: SmolStr,
    /// Parameter kind
    pub kind: ParamKind,
}

/// A constructor signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constructor {
    params: Vec<Param>,
}

impl Constructor {
    /// The parameterless constructor
    pub fn empty() -> Self {
        Self::default()
    }

    /// `(string message)`
    pub fn message() -> Self {
        Self::empty().param("message", ParamKind::String)
    }

    /// `(string message, Exception innerException)`
    pub fn message_inner() -> Self {
        Self::message().param("innerException", ParamKind::Exception)
    }

    /// Append a parameter
    pub fn param(mut self, name: impl Into<SmolStr>, kind: ParamKind) -> Self {
        self.params.push(Param {
            name: name.into(),
            kind,
        });
        self
    }

    /// Parameters in declaration order
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Check whether the arguments bind to this signature
    pub fn accepts(&self, args: &[HostValue]) -> bool {
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(param, arg)| param.kind.accepts(arg))
    }

    /// The constructor set every standard exception type exposes
    pub fn standard_set() -> Vec<Constructor> {
        vec![Self::empty(), Self::message(), Self::message_inner()]
    }
}

// ============================================================================
// Standard Exception Hierarchy
// ============================================================================

/// Exception types every host registry knows about.
///
/// Declaration order is significant: it is the type id order, and a parent
/// always precedes its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StdException {
    Exception = 0,
    SystemException,
    ArgumentException,
    ArgumentNullException,
    ArgumentOutOfRangeException,
    ArgumentTypeException,
    ArithmeticException,
    OverflowException,
    DivideByZeroException,
    NotFiniteNumberException,
    IndexOutOfRangeException,
    RankException,
    InvalidCastException,
    InvalidOperationException,
    NotImplementedException,
    NotSupportedException,
    MemberAccessException,
    MissingMemberException,
    MissingMethodException,
    OutOfMemoryException,
    KeyNotFoundException,
    IOException,
    EndOfStreamException,
    ExternalException,
    Win32Exception,
    WarningException,
    DecoderFallbackException,
    EncoderFallbackException,
}

impl StdException {
    /// All standard exceptions in type id order
    pub const ALL: [StdException; 28] = [
        StdException::Exception,
        StdException::SystemException,
        StdException::ArgumentException,
        StdException::ArgumentNullException,
        StdException::ArgumentOutOfRangeException,
        StdException::ArgumentTypeException,
        StdException::ArithmeticException,
        StdException::OverflowException,
        StdException::DivideByZeroException,
        StdException::NotFiniteNumberException,
        StdException::IndexOutOfRangeException,
        StdException::RankException,
        StdException::InvalidCastException,
        StdException::InvalidOperationException,
        StdException::NotImplementedException,
        StdException::NotSupportedException,
        StdException::MemberAccessException,
        StdException::MissingMemberException,
        StdException::MissingMethodException,
        StdException::OutOfMemoryException,
        StdException::KeyNotFoundException,
        StdException::IOException,
        StdException::EndOfStreamException,
        StdException::ExternalException,
        StdException::Win32Exception,
        StdException::WarningException,
        StdException::DecoderFallbackException,
        StdException::EncoderFallbackException,
    ];

    /// Fully qualified host type name
    pub fn name(self) -> &'static str {
        match self {
            StdException::Exception => "System.Exception",
            StdException::SystemException => "System.SystemException",
            StdException::ArgumentException => "System.ArgumentException",
            StdException::ArgumentNullException => "System.ArgumentNullException",
            StdException::ArgumentOutOfRangeException => "System.ArgumentOutOfRangeException",
            StdException::ArgumentTypeException => "System.ArgumentTypeException",
            StdException::ArithmeticException => "System.ArithmeticException",
            StdException::OverflowException => "System.OverflowException",
            StdException::DivideByZeroException => "System.DivideByZeroException",
            StdException::NotFiniteNumberException => "System.NotFiniteNumberException",
            StdException::IndexOutOfRangeException => "System.IndexOutOfRangeException",
            StdException::RankException => "System.RankException",
            StdException::InvalidCastException => "System.InvalidCastException",
            StdException::InvalidOperationException => "System.InvalidOperationException",
            StdException::NotImplementedException => "System.NotImplementedException",
            StdException::NotSupportedException => "System.NotSupportedException",
            StdException::MemberAccessException => "System.MemberAccessException",
            StdException::MissingMemberException => "System.MissingMemberException",
            StdException::MissingMethodException => "System.MissingMethodException",
            StdException::OutOfMemoryException => "System.OutOfMemoryException",
            StdException::KeyNotFoundException => "System.Collections.Generic.KeyNotFoundException",
            StdException::IOException => "System.IO.IOException",
            StdException::EndOfStreamException => "System.IO.EndOfStreamException",
            StdException::ExternalException => "System.Runtime.InteropServices.ExternalException",
            StdException::Win32Exception => "System.ComponentModel.Win32Exception",
            StdException::WarningException => "System.ComponentModel.WarningException",
            StdException::DecoderFallbackException => "System.Text.DecoderFallbackException",
            StdException::EncoderFallbackException => "System.Text.EncoderFallbackException",
        }
    }

    /// Direct base type (`None` for the root)
    pub fn parent(self) -> Option<StdException> {
        use StdException::*;
        match self {
            Exception => None,
            SystemException => Some(Exception),
            ArgumentException => Some(SystemException),
            ArgumentNullException | ArgumentOutOfRangeException | ArgumentTypeException => {
                Some(ArgumentException)
            }
            ArithmeticException => Some(SystemException),
            OverflowException | DivideByZeroException | NotFiniteNumberException => {
                Some(ArithmeticException)
            }
            IndexOutOfRangeException
            | RankException
            | InvalidCastException
            | InvalidOperationException
            | NotImplementedException
            | NotSupportedException
            | MemberAccessException
            | OutOfMemoryException
            | KeyNotFoundException
            | IOException
            | ExternalException
            | WarningException => Some(SystemException),
            MissingMemberException => Some(MemberAccessException),
            MissingMethodException => Some(MissingMemberException),
            EndOfStreamException => Some(IOException),
            Win32Exception => Some(ExternalException),
            DecoderFallbackException | EncoderFallbackException => Some(ArgumentException),
        }
    }

    /// Registry id of this type
    pub fn id(self) -> HostTypeId {
        HostTypeId(self as u32)
    }

    fn constructors(self) -> Vec<Constructor> {
        let mut ctors = Constructor::standard_set();
        match self {
            StdException::ArgumentException => {
                ctors.push(Constructor::message().param("paramName", ParamKind::String));
            }
            StdException::DecoderFallbackException => {
                ctors.push(
                    Constructor::message()
                        .param("bytesUnknown", ParamKind::Object)
                        .param("index", ParamKind::Int),
                );
            }
            StdException::Win32Exception => {
                ctors.push(Constructor::empty().param("error", ParamKind::Int));
            }
            _ => {}
        }
        ctors
    }
}

impl From<StdException> for HostTypeId {
    fn from(std: StdException) -> Self {
        std.id()
    }
}

// ============================================================================
// Type Definitions
// ============================================================================

/// Registered information about one host type.
#[derive(Debug, Clone)]
pub struct HostTypeInfo {
    id: HostTypeId,
    name: SmolStr,
    parent: Option<HostTypeId>,
    constructors: Vec<Constructor>,
    is_abstract: bool,
}

impl HostTypeInfo {
    /// Type id
    pub fn id(&self) -> HostTypeId {
        self.id
    }

    /// Fully qualified name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct base type
    pub fn parent(&self) -> Option<HostTypeId> {
        self.parent
    }

    /// Public constructors
    pub fn constructors(&self) -> &[Constructor] {
        &self.constructors
    }

    /// Whether instances can be constructed directly
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }
}

/// Description of a type to register.
#[derive(Debug, Clone)]
pub struct TypeDef {
    name: SmolStr,
    parent: Option<SmolStr>,
    constructors: Vec<Constructor>,
    is_abstract: bool,
}

impl TypeDef {
    /// A concrete exception-like type with the standard constructor set
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            constructors: Constructor::standard_set(),
            is_abstract: false,
        }
    }

    /// Set the base type by name
    pub fn extends(mut self, parent: impl Into<SmolStr>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Replace the constructor list
    pub fn constructors(mut self, constructors: Vec<Constructor>) -> Self {
        self.constructors = constructors;
        self
    }

    /// Mark the type abstract
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }
}

/// Errors raised while building a registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A type with the same name already exists
    #[error("host type '{name}' is already defined")]
    DuplicateType {
        /// Offending type name
        name: SmolStr,
    },

    /// The declared base type is not registered
    #[error("host type '{name}' extends unknown type '{parent}'")]
    UnknownParent {
        /// Type being defined
        name: SmolStr,
        /// Missing base type
        parent: SmolStr,
    },
}

// ============================================================================
// TypeRegistry
// ============================================================================

/// Registry of host types.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: Vec<HostTypeInfo>,
    by_name: FxHashMap<SmolStr, HostTypeId>,
}

impl TypeRegistry {
    /// Create a registry seeded with the standard exception hierarchy
    pub fn new() -> Self {
        let mut registry = Self {
            types: Vec::with_capacity(StdException::ALL.len()),
            by_name: FxHashMap::default(),
        };

        for std in StdException::ALL {
            let id = registry.push(HostTypeInfo {
                id: HostTypeId(0),
                name: SmolStr::new(std.name()),
                parent: std.parent().map(StdException::id),
                constructors: std.constructors(),
                is_abstract: false,
            });
            debug_assert_eq!(id, std.id());
        }

        registry
    }

    fn push(&mut self, mut info: HostTypeInfo) -> HostTypeId {
        let id = HostTypeId(self.types.len() as u32);
        info.id = id;
        self.by_name.insert(info.name.clone(), id);
        self.types.push(info);
        id
    }

    /// Register a new type
    pub fn define(&mut self, def: TypeDef) -> Result<HostTypeId, RegistryError> {
        if self.by_name.contains_key(&def.name) {
            return Err(RegistryError::DuplicateType { name: def.name });
        }

        let parent = match def.parent {
            Some(parent) => match self.lookup(&parent) {
                Some(id) => Some(id),
                None => {
                    return Err(RegistryError::UnknownParent {
                        name: def.name,
                        parent,
                    })
                }
            },
            None => None,
        };

        Ok(self.push(HostTypeInfo {
            id: HostTypeId(0),
            name: def.name,
            parent,
            constructors: def.constructors,
            is_abstract: def.is_abstract,
        }))
    }

    /// Register a concrete exception type deriving from `parent`
    pub fn define_exception(
        &mut self,
        name: impl Into<SmolStr>,
        parent: impl Into<SmolStr>,
    ) -> Result<HostTypeId, RegistryError> {
        self.define(TypeDef::new(name).extends(parent))
    }

    /// Find a type by its fully qualified name
    pub fn lookup(&self, name: &str) -> Option<HostTypeId> {
        self.by_name.get(name).copied()
    }

    /// Get a type's information
    pub fn get(&self, id: HostTypeId) -> Option<&HostTypeInfo> {
        self.types.get(id.index())
    }

    /// Name of a type, or `"<unknown>"` for ids from another registry
    pub fn name_of(&self, id: HostTypeId) -> &str {
        self.get(id).map(HostTypeInfo::name).unwrap_or("<unknown>")
    }

    /// The type itself followed by its bases, nearest first
    pub fn ancestors(&self, id: HostTypeId) -> Ancestors<'_> {
        Ancestors {
            registry: self,
            next: self.get(id).map(HostTypeInfo::id),
        }
    }

    /// Check whether `id` is `base` or derives from it
    pub fn is_subclass(&self, id: HostTypeId, base: HostTypeId) -> bool {
        self.ancestors(id).any(|ancestor| ancestor == base)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate over all registered types
    pub fn iter(&self) -> impl Iterator<Item = &HostTypeInfo> {
        self.types.iter()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a type and its bases.
pub struct Ancestors<'a> {
    registry: &'a TypeRegistry,
    next: Option<HostTypeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = HostTypeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.registry.get(current).and_then(HostTypeInfo::parent);
        Some(current)
    }
}
