//! # Host Bridge
//!
//! Adapters that let a dynamically typed guest language use values,
//! exceptions and events of a statically typed host environment as if they
//! were native guest objects.
//!
//! ## Overview
//!
//! - **Exception mapping**: host exceptions surface as guest errors of the
//!   closest mapped kind, and guest errors raised into host code become host
//!   exceptions of a preferred type ([`ExceptionMapper`])
//! - **Foreign arrays**: host arrays of any rank and lower bound with guest
//!   indexing, slicing, concatenation and repetition ([`ForeignArray`])
//! - **Foreign events**: host multicast events as guest subscriber lists
//!   ([`ForeignEvent`])
//! - **Coercion**: scalar conversions with overflow detection
//!   ([`FromGuest`], [`ToGuest`])
//!
//! ## Example
//!
//! ```rust
//! use host_bridge::{ForeignArray, GuestValue, InteropRuntime};
//! use host_runtime::{ElementType, HostRuntime};
//!
//! let rt = InteropRuntime::new(HostRuntime::new());
//! let a = ForeignArray::from_values(&rt, ElementType::Int32, &[GuestValue::Int(0), GuestValue::Int(10)]).unwrap();
//! let b = a.repeat(2).unwrap();
//!
//! assert_eq!(b.repr(), "Array[int]((0, 10, 0, 10))");
//! assert_eq!(b.get_item(&GuestValue::Int(-1)).unwrap(), GuestValue::Int(10));
//! ```
//!
//! ## Threading
//!
//! Everything here is single-threaded and synchronous. Adapters share host
//! storage through `Rc`, so none of the types are `Send`.
//!
//! ## Module Structure
//!
//! - [`error`]: Guest error kinds and exceptions
//! - [`value`]: Guest values, slices and callables
//! - [`coercion`]: Conversion traits and element coercion
//! - [`exception_map`]: Exception taxonomy mapping
//! - [`foreign_array`]: Foreign array adapter
//! - [`foreign_event`]: Foreign event adapter
//! - [`config`]: Bridge configuration
//! - [`runtime`]: Shared adapter context

pub mod coercion;
pub mod config;
pub mod error;
pub mod exception_map;
pub mod foreign_array;
pub mod foreign_event;
pub mod runtime;
pub mod value;

// Re-export main types for convenience
pub use coercion::{FromGuest, ToGuest};
pub use config::BridgeConfig;
pub use error::{GuestErrorKind, GuestException, GuestResult};
pub use exception_map::{ErrorKindMapping, ExceptionMapper, MappingDirection};
pub use foreign_array::{ArrayType, ForeignArray};
pub use foreign_event::{BoundEvent, ForeignEvent};
pub use runtime::InteropRuntime;
pub use value::{GuestCallable, GuestSlice, GuestValue};
