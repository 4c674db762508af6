//! Delegates and Events
//!
//! The host's multicast-subscription primitive:
//!
//! - [`Delegate`]: a single invokable target (a function, optionally bound to
//!   a receiver)
//! - [`MulticastDelegate`]: an immutable, ordered invocation list
//! - [`HostEvent`]: an event member holding the current invocation list and
//!   exposing add/remove/raise
//!
//! Invocation is synchronous and sequential. The first handler that fails
//! aborts the rest and its exception propagates to whoever raised the event.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use smol_str::SmolStr;
use tracing::trace;

use crate::exception::{HostException, HostResult};
use crate::types::StdException;
use crate::value::HostValue;

/// Signature of a host-invokable function
pub type HostFn = dyn Fn(&[HostValue]) -> HostResult<HostValue>;

// ============================================================================
// Delegate
// ============================================================================

/// A single delegate target.
///
/// Two delegates are equal when they wrap the same function and are bound to
/// equal receivers.
#[derive(Clone)]
pub struct Delegate {
    method_name: SmolStr,
    method: Rc<HostFn>,
    target: Option<HostValue>,
}

impl Delegate {
    /// Create an unbound delegate
    pub fn new<F>(method_name: impl Into<SmolStr>, method: F) -> Self
    where
        F: Fn(&[HostValue]) -> HostResult<HostValue> + 'static,
    {
        Self {
            method_name: method_name.into(),
            method: Rc::new(method),
            target: None,
        }
    }

    /// Create a delegate from an already shared function
    pub fn from_shared(method_name: impl Into<SmolStr>, method: Rc<HostFn>) -> Self {
        Self {
            method_name: method_name.into(),
            method,
            target: None,
        }
    }

    /// Bind the delegate to a receiver
    pub fn with_target(mut self, target: HostValue) -> Self {
        self.target = Some(target);
        self
    }

    /// Name of the wrapped method
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Bound receiver
    pub fn target(&self) -> Option<&HostValue> {
        self.target.as_ref()
    }

    /// Invoke the target
    pub fn invoke(&self, args: &[HostValue]) -> HostResult<HostValue> {
        (self.method)(args)
    }
}

impl PartialEq for Delegate {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.method) as *const (),
            Rc::as_ptr(&other.method) as *const (),
        ) && self.target == other.target
    }
}

impl fmt::Debug for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegate")
            .field("method", &self.method_name)
            .field("target", &self.target)
            .finish()
    }
}

// ============================================================================
// MulticastDelegate
// ============================================================================

/// An ordered invocation list.
#[derive(Debug, Clone, PartialEq)]
pub struct MulticastDelegate {
    invocation_list: Vec<Delegate>,
}

impl MulticastDelegate {
    /// A list with one delegate
    pub fn single(delegate: Delegate) -> Self {
        Self {
            invocation_list: vec![delegate],
        }
    }

    /// Append a delegate to an optional list
    pub fn combine(existing: Option<MulticastDelegate>, delegate: Delegate) -> Self {
        match existing {
            Some(mut list) => {
                list.invocation_list.push(delegate);
                list
            }
            None => Self::single(delegate),
        }
    }

    /// Remove the last occurrence of `delegate`.
    ///
    /// Returns `None` when the resulting list is empty.
    pub fn remove(mut self, delegate: &Delegate) -> Option<MulticastDelegate> {
        if let Some(pos) = self.invocation_list.iter().rposition(|d| d == delegate) {
            self.invocation_list.remove(pos);
        }
        if self.invocation_list.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    /// Check if the list contains `delegate`
    pub fn contains(&self, delegate: &Delegate) -> bool {
        self.invocation_list.contains(delegate)
    }

    /// Delegates in invocation order
    pub fn invocation_list(&self) -> &[Delegate] {
        &self.invocation_list
    }

    /// Number of delegates
    pub fn len(&self) -> usize {
        self.invocation_list.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.invocation_list.is_empty()
    }

    /// Invoke every delegate in order, returning the last result
    pub fn invoke(&self, args: &[HostValue]) -> HostResult<HostValue> {
        let mut result = HostValue::Null;
        for delegate in &self.invocation_list {
            trace!(method = %delegate.method_name, "invoking delegate");
            result = delegate.invoke(args)?;
        }
        Ok(result)
    }
}

// ============================================================================
// HostEvent
// ============================================================================

/// How an event reacts to removing a handler that was never added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovePolicy {
    /// Removing an absent handler does nothing
    #[default]
    Lenient,
    /// Removing an absent handler throws `KeyNotFoundException`
    RequirePresent,
}

/// A host event member.
#[derive(Debug)]
pub struct HostEvent {
    name: SmolStr,
    handlers: RefCell<Option<MulticastDelegate>>,
    remove_policy: RemovePolicy,
}

impl HostEvent {
    /// Create an event with no handlers
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            handlers: RefCell::new(None),
            remove_policy: RemovePolicy::default(),
        }
    }

    /// Set the removal policy
    pub fn with_remove_policy(mut self, policy: RemovePolicy) -> Self {
        self.remove_policy = policy;
        self
    }

    /// Event name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Removal policy
    pub fn remove_policy(&self) -> RemovePolicy {
        self.remove_policy
    }

    /// `add` accessor
    pub fn add(&self, delegate: Delegate) {
        let mut handlers = self.handlers.borrow_mut();
        let current = handlers.take();
        *handlers = Some(MulticastDelegate::combine(current, delegate));
    }

    /// `remove` accessor
    pub fn remove(&self, delegate: &Delegate) -> HostResult<()> {
        let mut handlers = self.handlers.borrow_mut();
        let present = handlers.as_ref().is_some_and(|list| list.contains(delegate));

        if !present {
            return match self.remove_policy {
                RemovePolicy::Lenient => Ok(()),
                RemovePolicy::RequirePresent => Err(HostException::new(
                    StdException::KeyNotFoundException,
                    format!(
                        "The handler '{}' is not subscribed to event '{}'.",
                        delegate.method_name(),
                        self.name
                    ),
                )),
            };
        }

        *handlers = handlers.take().and_then(|list| list.remove(delegate));
        Ok(())
    }

    /// Current invocation list
    pub fn handlers(&self) -> Option<MulticastDelegate> {
        self.handlers.borrow().clone()
    }

    /// Number of subscribed handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.borrow().as_ref().map_or(0, MulticastDelegate::len)
    }

    /// Invoke the current invocation list
    pub fn raise(&self, args: &[HostValue]) -> HostResult<()> {
        // Snapshot so handlers may add/remove while the event is running
        let Some(handlers) = self.handlers() else {
            return Ok(());
        };
        trace!(event = %self.name, handlers = handlers.len(), "raising host event");
        handlers.invoke(args).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter(hits: &Rc<Cell<u32>>) -> Delegate {
        let hits = Rc::clone(hits);
        Delegate::new("count", move |_| {
            hits.set(hits.get() + 1);
            Ok(HostValue::Null)
        })
    }

    #[test]
    fn test_delegate_equality() {
        let hits = Rc::new(Cell::new(0));
        let a = counter(&hits);
        let b = a.clone();
        let c = counter(&hits);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a.clone().with_target(HostValue::Int32(1)), a);
    }

    #[test]
    fn test_multicast_remove_last_occurrence() {
        let hits = Rc::new(Cell::new(0));
        let a = counter(&hits);
        let b = counter(&hits);
        let list = MulticastDelegate::combine(None, a.clone());
        let list = MulticastDelegate::combine(Some(list), b.clone());
        let list = MulticastDelegate::combine(Some(list), a.clone());

        let list = list.remove(&a).unwrap();
        assert_eq!(list.invocation_list(), &[a.clone(), b.clone()]);

        let list = list.remove(&a).unwrap().remove(&b);
        assert!(list.is_none());
    }

    #[test]
    fn test_event_raise_order_and_abort() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let event = HostEvent::new("Act");

        let first = {
            let log = Rc::clone(&log);
            Delegate::new("first", move |_| {
                log.borrow_mut().push("first");
                Ok(HostValue::Null)
            })
        };
        let failing = Delegate::new("failing", |_| {
            Err(HostException::new(StdException::InvalidOperationException, "nope"))
        });
        let last = {
            let log = Rc::clone(&log);
            Delegate::new("last", move |_| {
                log.borrow_mut().push("last");
                Ok(HostValue::Null)
            })
        };

        event.add(first);
        event.add(failing);
        event.add(last);

        let err = event.raise(&[]).unwrap_err();
        assert_eq!(err.host_type(), StdException::InvalidOperationException.id());
        assert_eq!(*log.borrow(), vec!["first"]);
    }

    #[test]
    fn test_event_remove_policy() {
        let hits = Rc::new(Cell::new(0));
        let lenient = HostEvent::new("Lenient");
        assert!(lenient.remove(&counter(&hits)).is_ok());

        let strict = HostEvent::new("Strict").with_remove_policy(RemovePolicy::RequirePresent);
        let err = strict.remove(&counter(&hits)).unwrap_err();
        assert_eq!(err.host_type(), StdException::KeyNotFoundException.id());

        let handler = counter(&hits);
        strict.add(handler.clone());
        strict.raise(&[]).unwrap();
        strict.remove(&handler).unwrap();
        strict.raise(&[]).unwrap();
        assert_eq!(hits.get(), 1);
        assert_eq!(strict.handler_count(), 0);
    }
}
