//! Exception Taxonomy Mapping
//!
//! Translates errors between host exception types and guest error kinds.
//!
//! ## Mapping Table
//!
//! A process-wide table pairs host type names with guest kinds. Most entries
//! work in both directions; a few are one-way:
//!
//! - host to guest only: legacy host types that share a guest kind with a
//!   preferred type (`System.SystemException`, `System.InvalidCastException`)
//! - guest to host only: guest kinds raised into the host as a more general
//!   type (`StopIteration` becomes `System.Exception`)
//!
//! ## Resolution
//!
//! [`ExceptionMapper::new`] resolves every registered host type to the guest
//! kind of its nearest mapped ancestor, and every guest kind to the preferred
//! host type of its nearest mapped guest ancestor. Mapping an exception is a
//! table lookup afterwards.
//!
//! ## Round Trips
//!
//! A guest exception raised into the host is attached to the host exception's
//! auxiliary data. When that host exception comes back, the original guest
//! exception is returned unchanged. Likewise a `HostError` raised back into
//! the host yields the host exception it wraps.

use std::sync::OnceLock;

use host_runtime::{
    ElementType, HostArray, HostException, HostObject, HostRuntime, HostTypeId, HostValue,
    StdException,
};
use rustc_hash::FxHashMap;
use tracing::{debug, instrument, trace, warn};

use crate::coercion::to_host_value;
use crate::error::{GuestErrorKind, GuestException};

/// Auxiliary data key holding the guest exception a host exception was
/// raised from
pub const GUEST_EXCEPTION_KEY: &str = "GuestException";

/// Auxiliary data key holding a guest payload no constructor accepted
pub const GUEST_ARGS_KEY: &str = "GuestArgs";

// ============================================================================
// Mapping Table
// ============================================================================

/// Direction(s) a mapping entry applies in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingDirection {
    Both,
    HostToGuest,
    GuestToHost,
}

/// One host type / guest kind pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorKindMapping {
    pub host: &'static str,
    pub guest: GuestErrorKind,
    pub direction: MappingDirection,
}

impl ErrorKindMapping {
    const fn new(host: &'static str, guest: GuestErrorKind, direction: MappingDirection) -> Self {
        Self {
            host,
            guest,
            direction,
        }
    }

    pub fn maps_host_to_guest(&self) -> bool {
        self.direction != MappingDirection::GuestToHost
    }

    pub fn maps_guest_to_host(&self) -> bool {
        self.direction != MappingDirection::HostToGuest
    }
}

struct MappingTable {
    entries: Vec<ErrorKindMapping>,
    host_to_guest: FxHashMap<&'static str, GuestErrorKind>,
    guest_to_host: FxHashMap<GuestErrorKind, &'static str>,
}

fn table() -> &'static MappingTable {
    static TABLE: OnceLock<MappingTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        use GuestErrorKind::*;
        use MappingDirection::*;

        let entries = vec![
            ErrorKindMapping::new("System.Exception", Exception, Both),
            ErrorKindMapping::new("System.SystemException", StandardError, HostToGuest),
            ErrorKindMapping::new("System.IO.IOException", IOError, Both),
            ErrorKindMapping::new("System.MissingMemberException", AttributeError, Both),
            ErrorKindMapping::new("System.ComponentModel.Win32Exception", WindowsError, Both),
            ErrorKindMapping::new("System.IO.EndOfStreamException", EOFError, Both),
            ErrorKindMapping::new("System.NotImplementedException", NotImplementedError, Both),
            ErrorKindMapping::new("System.IndexOutOfRangeException", IndexError, Both),
            ErrorKindMapping::new("System.ArithmeticException", ArithmeticError, Both),
            ErrorKindMapping::new("System.OverflowException", OverflowError, Both),
            ErrorKindMapping::new("System.DivideByZeroException", ZeroDivisionError, Both),
            ErrorKindMapping::new("System.ArgumentException", ValueError, Both),
            ErrorKindMapping::new("System.ArgumentTypeException", TypeError, Both),
            ErrorKindMapping::new("System.InvalidCastException", TypeError, HostToGuest),
            ErrorKindMapping::new("System.Text.DecoderFallbackException", UnicodeDecodeError, Both),
            ErrorKindMapping::new("System.Text.EncoderFallbackException", UnicodeEncodeError, Both),
            ErrorKindMapping::new("System.ComponentModel.WarningException", Warning, Both),
            ErrorKindMapping::new("System.OutOfMemoryException", MemoryError, Both),
            ErrorKindMapping::new(
                "System.Collections.Generic.KeyNotFoundException",
                KeyError,
                Both,
            ),
            ErrorKindMapping::new("System.Exception", StopIteration, GuestToHost),
        ];

        let mut host_to_guest = FxHashMap::default();
        let mut guest_to_host = FxHashMap::default();
        for entry in &entries {
            if entry.maps_host_to_guest() {
                host_to_guest.insert(entry.host, entry.guest);
            }
            if entry.maps_guest_to_host() {
                guest_to_host.insert(entry.guest, entry.host);
            }
        }

        MappingTable {
            entries,
            host_to_guest,
            guest_to_host,
        }
    })
}

/// The static mapping table
pub fn mapping_table() -> &'static [ErrorKindMapping] {
    &table().entries
}

// ============================================================================
// ExceptionMapper
// ============================================================================

/// Bidirectional mapper between host exceptions and guest errors, resolved
/// against one host registry.
#[derive(Debug)]
pub struct ExceptionMapper {
    host: HostRuntime,
    /// Guest kind per host type id
    resolved: Vec<Option<GuestErrorKind>>,
    /// Preferred host type per guest kind
    preferred: FxHashMap<GuestErrorKind, HostTypeId>,
}

impl ExceptionMapper {
    /// Resolve the mapping table against the host's registry
    pub fn new(host: &HostRuntime) -> Self {
        let table = table();
        let types = host.types();

        // Parents are always registered before their children
        let mut resolved: Vec<Option<GuestErrorKind>> = Vec::with_capacity(types.len());
        for info in types.iter() {
            let kind = table
                .host_to_guest
                .get(info.name())
                .copied()
                .or_else(|| info.parent().and_then(|p| resolved.get(p.index()).copied().flatten()));
            resolved.push(kind);
        }

        let mut preferred = FxHashMap::default();
        for kind in GuestErrorKind::ALL {
            let direct = table
                .guest_to_host
                .get(&kind)
                .and_then(|name| types.lookup(name));
            let inherited = || kind.parent().and_then(|p| preferred.get(&p).copied());
            let id = direct
                .or_else(inherited)
                .unwrap_or_else(|| StdException::Exception.id());
            preferred.insert(kind, id);
        }

        debug!(
            host_types = resolved.len(),
            mapped = resolved.iter().filter(|k| k.is_some()).count(),
            "resolved exception mapping"
        );

        Self {
            host: host.clone(),
            resolved,
            preferred,
        }
    }

    /// Guest kind a host type resolves to (`None` when no ancestor is mapped)
    pub fn guest_kind_for(&self, host_type: HostTypeId) -> Option<GuestErrorKind> {
        self.resolved.get(host_type.index()).copied().flatten()
    }

    /// Host type a guest kind is raised as
    pub fn preferred_host_type(&self, kind: GuestErrorKind) -> HostTypeId {
        self.preferred
            .get(&kind)
            .copied()
            .unwrap_or_else(|| StdException::Exception.id())
    }

    /// Translate a host exception for the guest.
    #[instrument(level = "trace", skip_all, fields(ty = exc.type_name()))]
    pub fn to_guest(&self, exc: &HostException) -> GuestException {
        if let Some(original) = attached_guest_exception(exc) {
            trace!("returning attached guest exception");
            return original;
        }

        let registered = self.host.types().get(exc.host_type());
        let kind = match registered {
            Some(info) if info.name() == exc.type_name() => self.guest_kind_for(exc.host_type()),
            _ => None,
        };

        match kind {
            Some(kind) => {
                trace!(kind = kind.name(), "mapped host exception");
                GuestException::new(kind, exc.message()).with_cause(exc.clone())
            }
            None => {
                debug!("no guest kind for host exception; wrapping as HostError");
                GuestException::new(GuestErrorKind::HostError, exc.to_string())
                    .with_cause(exc.clone())
            }
        }
    }

    /// Translate a guest exception for the host.
    ///
    /// Never fails: when no constructor of the preferred type accepts the
    /// payload, construction falls back to the parameterless constructor,
    /// then to the nearest constructible ancestor, then to the host root.
    #[instrument(level = "trace", skip_all, fields(kind = exc.kind().name()))]
    pub fn to_host(&self, exc: &GuestException) -> HostException {
        if exc.kind() == GuestErrorKind::HostError {
            if let Some(cause) = exc.cause() {
                return cause.clone();
            }
        }

        let target = self.preferred_host_type(exc.kind());
        let payload: Vec<HostValue> = if !exc.args().is_empty() {
            exc.args().iter().map(to_host_value).collect()
        } else if !exc.message().is_empty() {
            vec![HostValue::String(exc.message().into())]
        } else {
            Vec::new()
        };

        let mut host_exc = match self.host.construct_exception(target, &payload) {
            Ok(host_exc) => host_exc,
            Err(_) => self.construct_fallback(target, exc, payload),
        };

        host_exc.set_data(
            GUEST_EXCEPTION_KEY,
            HostValue::Object(HostObject::new("GuestException", exc.clone())),
        );
        host_exc
    }

    fn construct_fallback(
        &self,
        target: HostTypeId,
        exc: &GuestException,
        payload: Vec<HostValue>,
    ) -> HostException {
        let types = self.host.types();
        let constructed = types
            .ancestors(target)
            .find_map(|id| self.host.construct_exception(id, &[]).ok().map(|e| (id, e)));

        let mut host_exc = match constructed {
            Some((id, host_exc)) => {
                debug!(
                    preferred = types.name_of(target),
                    constructed = types.name_of(id),
                    "no constructor accepts the guest payload; attaching it as data"
                );
                host_exc
            }
            None => {
                warn!(
                    preferred = types.name_of(target),
                    "no constructible host type; raising as the host root"
                );
                HostException::new(StdException::Exception, exc.message())
            }
        };

        if !exc.message().is_empty() {
            host_exc.set_message(exc.message());
        }
        if !payload.is_empty() {
            let len = payload.len();
            match HostArray::from_values(ElementType::Object, payload, 0) {
                Ok(args) => host_exc.set_data(
                    GUEST_ARGS_KEY,
                    HostValue::Object(HostObject::new("System.Object[]", args)),
                ),
                Err(e) => warn!(
                    guest = %exc.kind(),
                    len,
                    error = %e,
                    "dropped guest payload that could not be stored as exception data"
                ),
            }
        }
        host_exc
    }
}

fn attached_guest_exception(exc: &HostException) -> Option<GuestException> {
    match exc.data_value(GUEST_EXCEPTION_KEY)? {
        HostValue::Object(obj) => obj.downcast_ref::<GuestException>().cloned(),
        _ => None,
    }
}
