//! # Host Runtime
//!
//! A model of the statically typed host environment that the interop bridge
//! talks to.
//!
//! ## Overview
//!
//! The bridge never reaches into host internals. It only uses the primitives
//! this crate exposes:
//!
//! - Type hierarchy and exception construction ([`TypeRegistry`],
//!   [`HostRuntime::construct_exception`])
//! - Host values ([`HostValue`], [`HostObject`])
//! - Arrays with per-dimension lower bounds ([`HostArray`])
//! - Multicast delegates and event members ([`Delegate`],
//!   [`MulticastDelegate`], [`HostEvent`])
//!
//! ## Threading
//!
//! Host storage is shared through `Rc`/`RefCell`. Nothing in this crate is
//! `Send`; a runtime and everything allocated from it stays on one thread.
//!
//! ## Module Structure
//!
//! - [`types`]: Type registry and the standard exception hierarchy
//! - [`exception`]: Host exception instances
//! - [`value`]: Host values
//! - [`array`]: Host arrays
//! - [`delegate`]: Delegates and events

pub mod array;
pub mod delegate;
pub mod exception;
pub mod types;
pub mod value;

use std::rc::Rc;

use tracing::trace;

pub use array::{ElementType, HostArray};
pub use delegate::{Delegate, HostEvent, HostFn, MulticastDelegate, RemovePolicy};
pub use exception::{HostException, HostResult};
pub use types::{
    Constructor, HostTypeId, HostTypeInfo, Param, ParamKind, RegistryError, StdException,
    TypeDef, TypeRegistry,
};
pub use value::{HostObject, HostValue};

/// Handle to a host environment.
///
/// The type registry is frozen once the runtime is created. Cloning the
/// runtime clones the handle.
#[derive(Debug, Clone)]
pub struct HostRuntime {
    types: Rc<TypeRegistry>,
}

impl HostRuntime {
    /// A runtime with only the standard types
    pub fn new() -> Self {
        Self::with_types(TypeRegistry::new())
    }

    /// A runtime over a custom registry
    pub fn with_types(types: TypeRegistry) -> Self {
        Self {
            types: Rc::new(types),
        }
    }

    /// The type registry
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Construct an exception by running the constructor that binds `args`.
    ///
    /// The first `String` parameter becomes the message (null selects the
    /// type's default message), an `Exception` parameter becomes the inner
    /// exception and every other parameter is stored as auxiliary data under
    /// its parameter name.
    ///
    /// Fails with `MissingMethodException` when the type is unknown, abstract
    /// or has no constructor accepting the arguments.
    pub fn construct_exception(
        &self,
        type_id: HostTypeId,
        args: &[HostValue],
    ) -> HostResult<HostException> {
        let info = self.types.get(type_id).ok_or_else(|| {
            HostException::new(
                StdException::MissingMethodException,
                format!("Type {} is not registered.", type_id),
            )
        })?;

        if info.is_abstract() {
            return Err(HostException::new(
                StdException::MissingMethodException,
                format!("Cannot create an abstract class '{}'.", info.name()),
            ));
        }

        let ctor = info
            .constructors()
            .iter()
            .find(|ctor| ctor.accepts(args))
            .ok_or_else(|| {
                HostException::new(
                    StdException::MissingMethodException,
                    format!("Constructor on type '{}' not found.", info.name()),
                )
            })?;

        trace!(ty = info.name(), arity = ctor.arity(), "constructing host exception");

        let mut exception = HostException::of_type(info);
        let mut message_bound = false;
        for (param, arg) in ctor.params().iter().zip(args) {
            match (param.kind, arg) {
                (ParamKind::String, HostValue::String(text)) if !message_bound => {
                    exception.set_message(text.as_str());
                    message_bound = true;
                }
                (ParamKind::String, HostValue::Null) if !message_bound => {
                    message_bound = true;
                }
                (ParamKind::Exception, HostValue::Object(obj)) => {
                    if let Some(inner) = obj.downcast_ref::<HostException>() {
                        exception = exception.with_inner(inner.clone());
                    }
                }
                (ParamKind::Exception, HostValue::Null) => {}
                _ => exception.set_data(param.name.clone(), arg.clone()),
            }
        }

        Ok(exception)
    }

    /// Allocate an array
    pub fn create_array(
        &self,
        element_type: ElementType,
        lengths: &[usize],
        lower_bounds: &[i64],
    ) -> HostResult<HostArray> {
        HostArray::create_instance(element_type, lengths, lower_bounds)
    }
}

impl Default for HostRuntime {
    fn default() -> Self {
        Self::new()
    }
}
