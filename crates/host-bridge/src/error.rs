//! Guest Error Model
//!
//! Guest errors are raised as [`GuestException`]s. Each carries a
//! [`GuestErrorKind`], a message, the positional `args` payload the guest
//! constructed it with and, for errors that originated in the host, the host
//! exception as an inspectable cause.
//!
//! ## Kind Hierarchy
//!
//! Guest kinds form their own single-inheritance tree, which is what guest
//! `except` clauses match against:
//!
//! ```text
//! BaseException
//! └── Exception
//!     ├── StopIteration
//!     ├── Warning
//!     ├── HostError
//!     └── StandardError
//!         ├── ArithmeticError (OverflowError, ZeroDivisionError)
//!         ├── AttributeError
//!         ├── EnvironmentError (IOError, OSError > WindowsError)
//!         ├── EOFError
//!         ├── LookupError (IndexError, KeyError)
//!         ├── MemoryError
//!         ├── RuntimeError (NotImplementedError)
//!         ├── TypeError
//!         └── ValueError > UnicodeError (UnicodeDecodeError, UnicodeEncodeError)
//! ```

use std::fmt;

use host_runtime::HostException;
use thiserror::Error;

use crate::value::GuestValue;

/// Result type for guest-facing operations
pub type GuestResult<T> = Result<T, GuestException>;

// ============================================================================
// GuestErrorKind
// ============================================================================

/// A guest error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GuestErrorKind {
    BaseException,
    Exception,
    StopIteration,
    StandardError,
    Warning,
    /// Host exception with no guest counterpart
    HostError,
    ArithmeticError,
    OverflowError,
    ZeroDivisionError,
    AttributeError,
    EnvironmentError,
    IOError,
    OSError,
    WindowsError,
    EOFError,
    LookupError,
    IndexError,
    KeyError,
    MemoryError,
    RuntimeError,
    NotImplementedError,
    TypeError,
    ValueError,
    UnicodeError,
    UnicodeDecodeError,
    UnicodeEncodeError,
}

impl GuestErrorKind {
    /// Every guest kind, parents before children
    pub const ALL: [GuestErrorKind; 26] = [
        GuestErrorKind::BaseException,
        GuestErrorKind::Exception,
        GuestErrorKind::StopIteration,
        GuestErrorKind::StandardError,
        GuestErrorKind::Warning,
        GuestErrorKind::HostError,
        GuestErrorKind::ArithmeticError,
        GuestErrorKind::OverflowError,
        GuestErrorKind::ZeroDivisionError,
        GuestErrorKind::AttributeError,
        GuestErrorKind::EnvironmentError,
        GuestErrorKind::IOError,
        GuestErrorKind::OSError,
        GuestErrorKind::WindowsError,
        GuestErrorKind::EOFError,
        GuestErrorKind::LookupError,
        GuestErrorKind::IndexError,
        GuestErrorKind::KeyError,
        GuestErrorKind::MemoryError,
        GuestErrorKind::RuntimeError,
        GuestErrorKind::NotImplementedError,
        GuestErrorKind::TypeError,
        GuestErrorKind::ValueError,
        GuestErrorKind::UnicodeError,
        GuestErrorKind::UnicodeDecodeError,
        GuestErrorKind::UnicodeEncodeError,
    ];

    /// Name the guest sees
    pub fn name(self) -> &'static str {
        use GuestErrorKind::*;
        match self {
            BaseException => "BaseException",
            Exception => "Exception",
            StopIteration => "StopIteration",
            StandardError => "StandardError",
            Warning => "Warning",
            HostError => "HostError",
            ArithmeticError => "ArithmeticError",
            OverflowError => "OverflowError",
            ZeroDivisionError => "ZeroDivisionError",
            AttributeError => "AttributeError",
            EnvironmentError => "EnvironmentError",
            IOError => "IOError",
            OSError => "OSError",
            WindowsError => "WindowsError",
            EOFError => "EOFError",
            LookupError => "LookupError",
            IndexError => "IndexError",
            KeyError => "KeyError",
            MemoryError => "MemoryError",
            RuntimeError => "RuntimeError",
            NotImplementedError => "NotImplementedError",
            TypeError => "TypeError",
            ValueError => "ValueError",
            UnicodeError => "UnicodeError",
            UnicodeDecodeError => "UnicodeDecodeError",
            UnicodeEncodeError => "UnicodeEncodeError",
        }
    }

    /// Direct base kind (`None` for `BaseException`)
    pub fn parent(self) -> Option<GuestErrorKind> {
        use GuestErrorKind::*;
        match self {
            BaseException => None,
            Exception => Some(BaseException),
            StopIteration | StandardError | Warning | HostError => Some(Exception),
            ArithmeticError | AttributeError | EnvironmentError | EOFError | LookupError
            | MemoryError | RuntimeError | TypeError | ValueError => Some(StandardError),
            OverflowError | ZeroDivisionError => Some(ArithmeticError),
            IOError | OSError => Some(EnvironmentError),
            WindowsError => Some(OSError),
            IndexError | KeyError => Some(LookupError),
            NotImplementedError => Some(RuntimeError),
            UnicodeError => Some(ValueError),
            UnicodeDecodeError | UnicodeEncodeError => Some(UnicodeError),
        }
    }

    /// The kind itself followed by its bases, nearest first
    pub fn ancestors(self) -> impl Iterator<Item = GuestErrorKind> {
        std::iter::successors(Some(self), |kind| kind.parent())
    }

    /// Check whether `self` is `base` or derives from it
    pub fn is_subkind_of(self, base: GuestErrorKind) -> bool {
        self.ancestors().any(|kind| kind == base)
    }

    /// Find a kind by its guest name
    pub fn from_name(name: &str) -> Option<GuestErrorKind> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for GuestErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// GuestException
// ============================================================================

/// A raised guest error.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct GuestException {
    kind: GuestErrorKind,
    message: String,
    args: Vec<GuestValue>,
    #[source]
    cause: Option<HostException>,
}

impl GuestException {
    /// Create an exception whose payload is its message
    pub fn new(kind: GuestErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let args = if message.is_empty() {
            Vec::new()
        } else {
            vec![GuestValue::Str(message.as_str().into())]
        };
        Self {
            kind,
            message,
            args,
            cause: None,
        }
    }

    /// Create an exception from an explicit `args` payload.
    ///
    /// The message is the single argument when there is exactly one string
    /// argument, otherwise the `repr` of the argument tuple.
    pub fn with_args(kind: GuestErrorKind, args: Vec<GuestValue>) -> Self {
        let message = match args.as_slice() {
            [] => String::new(),
            [GuestValue::Str(text)] => text.to_string(),
            [single] => single.repr(),
            _ => GuestValue::Tuple(args.clone()).repr(),
        };
        Self {
            kind,
            message,
            args,
            cause: None,
        }
    }

    /// Attach the host exception this error came from
    pub fn with_cause(mut self, cause: HostException) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Error kind
    pub fn kind(&self) -> GuestErrorKind {
        self.kind
    }

    /// Message text
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Positional payload
    pub fn args(&self) -> &[GuestValue] {
        &self.args
    }

    /// Host exception this error was mapped from
    pub fn cause(&self) -> Option<&HostException> {
        self.cause.as_ref()
    }

    /// Guest `isinstance` check against a kind
    pub fn is_instance(&self, kind: GuestErrorKind) -> bool {
        self.kind.is_subkind_of(kind)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::IndexError, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::ValueError, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::NotImplementedError, message)
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::OverflowError, message)
    }

    pub fn key_error(message: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::KeyError, message)
    }

    /// Raised when a non-callable value is invoked
    pub fn not_callable(type_name: &str) -> Self {
        Self::type_error(format!("{} is not callable", type_name))
    }
}

impl PartialEq for GuestException {
    fn eq(&self, other: &Self) -> bool {
        let same_cause = match (&self.cause, &other.cause) {
            (None, None) => true,
            (Some(a), Some(b)) => a.host_type() == b.host_type() && a.message() == b.message(),
            _ => false,
        };
        self.kind == other.kind
            && self.message == other.message
            && self.args == other.args
            && same_cause
    }
}
