//! Foreign Event Adapter
//!
//! [`ForeignEvent`] exposes a multicast subscription point to the guest as
//! an ordered, duplicate-permitting subscriber list.
//!
//! An event is either:
//!
//! - **bound** to a host [`HostEvent`]: every subscription is mirrored into
//!   the host invocation list as a delegate, so the host raising the event
//!   reaches guest subscribers, or
//! - **unbound**: a guest-defined event whose subscribers live only in the
//!   adapter.
//!
//! Guest subscribers always run in subscription order with identical
//! arguments; the first failure aborts the rest and propagates to whoever
//! fired the event.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use host_runtime::{Delegate, HostEvent, HostValue, RemovePolicy};
use smol_str::SmolStr;
use tracing::{debug, trace};

use crate::coercion::{host_to_guest, to_host_value};
use crate::error::{GuestException, GuestResult};
use crate::runtime::InteropRuntime;
use crate::value::{GuestCallable, GuestValue};

struct HostBinding {
    event: Rc<HostEvent>,
    /// One delegate per guest subscriber, in the same order
    delegates: RefCell<Vec<Delegate>>,
}

struct EventInner {
    rt: InteropRuntime,
    name: SmolStr,
    /// Created on first subscription
    subscribers: RefCell<Option<Vec<GuestCallable>>>,
    binding: Option<HostBinding>,
}

/// Guest view of a multicast event.
#[derive(Clone)]
pub struct ForeignEvent {
    inner: Rc<EventInner>,
}

impl ForeignEvent {
    /// A guest-defined event with no host counterpart
    pub fn unbound(rt: &InteropRuntime, name: impl Into<SmolStr>) -> Self {
        Self::build(rt, name.into(), None)
    }

    /// An adapter over a host event member
    pub fn bind(rt: &InteropRuntime, event: Rc<HostEvent>) -> Self {
        let name = SmolStr::new(event.name());
        Self::build(
            rt,
            name,
            Some(HostBinding {
                event,
                delegates: RefCell::new(Vec::new()),
            }),
        )
    }

    fn build(rt: &InteropRuntime, name: SmolStr, binding: Option<HostBinding>) -> Self {
        Self {
            inner: Rc::new(EventInner {
                rt: rt.clone(),
                name,
                subscribers: RefCell::new(None),
                binding,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_bound(&self) -> bool {
        self.inner.binding.is_some()
    }

    /// The host event this adapter is bound to
    pub fn host_event(&self) -> Option<&Rc<HostEvent>> {
        self.inner.binding.as_ref().map(|binding| &binding.event)
    }

    /// Policy applied when removing a callable that is not subscribed
    pub fn remove_policy(&self) -> RemovePolicy {
        match &self.inner.binding {
            Some(binding) => binding.event.remove_policy(),
            None => self.inner.rt.config().unbound_remove_policy,
        }
    }

    /// Check whether two adapters are the same event
    pub fn ptr_eq(&self, other: &ForeignEvent) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Snapshot of the subscriber list
    pub fn subscribers(&self) -> Vec<GuestCallable> {
        self.inner.subscribers.borrow().clone().unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().as_ref().map_or(0, Vec::len)
    }

    /// `event += callable`
    pub fn subscribe(&self, callable: GuestCallable) {
        if let Some(binding) = &self.inner.binding {
            let delegate = self.host_delegate(&callable);
            binding.event.add(delegate.clone());
            binding.delegates.borrow_mut().push(delegate);
        }

        let mut subscribers = self.inner.subscribers.borrow_mut();
        let list = subscribers.get_or_insert_with(Vec::new);
        list.push(callable);
        debug!(event = %self.inner.name, subscribers = list.len(), "subscribed");
    }

    /// `event -= callable`
    ///
    /// Removes the first subscriber equal to `callable`. Removing a callable
    /// that is not subscribed does nothing unless the remove policy requires
    /// presence, in which case it raises `KeyError`.
    pub fn unsubscribe(&self, callable: &GuestCallable) -> GuestResult<()> {
        let position = self
            .inner
            .subscribers
            .borrow()
            .as_ref()
            .and_then(|list| list.iter().position(|s| s == callable));

        let Some(position) = position else {
            return match self.remove_policy() {
                RemovePolicy::Lenient => Ok(()),
                RemovePolicy::RequirePresent => Err(GuestException::key_error(format!(
                    "{} is not subscribed to {}",
                    callable.name(),
                    self.inner.name
                ))),
            };
        };

        // Both lists change only after the host accepts the removal
        if let Some(binding) = &self.inner.binding {
            let delegate = binding.delegates.borrow()[position].clone();
            binding
                .event
                .remove(&delegate)
                .map_err(|e| self.inner.rt.map_host_error(&e))?;
            binding.delegates.borrow_mut().remove(position);
        }

        let mut subscribers = self.inner.subscribers.borrow_mut();
        if let Some(list) = subscribers.as_mut() {
            list.remove(position);
            debug!(event = %self.inner.name, subscribers = list.len(), "unsubscribed");
        }
        Ok(())
    }

    /// Invoke every subscriber in order with the same arguments.
    ///
    /// Bound events are raised through the host, so host-side handlers run
    /// as well and guest failures cross the host boundary and back.
    pub fn fire(&self, args: &[GuestValue]) -> GuestResult<()> {
        if let Some(binding) = &self.inner.binding {
            let host_args: Vec<HostValue> = args.iter().map(to_host_value).collect();
            return binding
                .event
                .raise(&host_args)
                .map_err(|e| self.inner.rt.map_host_error(&e));
        }

        // Subscribing or unsubscribing while firing affects the next firing
        let snapshot = self.subscribers();
        for subscriber in &snapshot {
            trace!(event = %self.inner.name, subscriber = subscriber.name(), "invoking subscriber");
            subscriber.call(args)?;
        }
        Ok(())
    }

    /// The raw multi-subscriber accessor
    pub fn raw_accessor(&self) -> GuestValue {
        GuestValue::BoundEvent(BoundEvent {
            event: self.clone(),
        })
    }

    fn host_delegate(&self, callable: &GuestCallable) -> Delegate {
        let rt = self.inner.rt.clone();
        let target = callable.clone();
        Delegate::new(callable.name(), move |args: &[HostValue]| {
            let guest_args: Vec<GuestValue> = args.iter().map(|a| host_to_guest(&rt, a)).collect();
            target
                .call(&guest_args)
                .map(|result| to_host_value(&result))
                .map_err(|e| rt.map_guest_error(&e))
        })
    }
}

impl fmt::Debug for ForeignEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignEvent")
            .field("name", &self.inner.name)
            .field("bound", &self.is_bound())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// BoundEvent
// ============================================================================

/// The value the guest sees when it reads an event member directly.
///
/// It can be subscribed to through its event but cannot be invoked.
#[derive(Clone)]
pub struct BoundEvent {
    event: ForeignEvent,
}

impl BoundEvent {
    pub fn name(&self) -> &str {
        self.event.name()
    }

    pub fn event(&self) -> &ForeignEvent {
        &self.event
    }
}

impl PartialEq for BoundEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event.ptr_eq(&other.event)
    }
}

impl fmt::Debug for BoundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundEvent({})", self.event.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuestErrorKind;
    use host_runtime::HostRuntime;
    use pretty_assertions::assert_eq;

    fn runtime() -> InteropRuntime {
        InteropRuntime::new(HostRuntime::new())
    }

    fn recorder(log: &Rc<RefCell<Vec<String>>>, tag: &'static str) -> GuestCallable {
        let log = Rc::clone(log);
        GuestCallable::new(tag, move |args| {
            log.borrow_mut()
                .push(format!("{}{}", tag, GuestValue::Tuple(args.to_vec()).repr()));
            Ok(GuestValue::None)
        })
    }

    #[test]
    fn test_lazy_subscriber_list() {
        let event = ForeignEvent::unbound(&runtime(), "Changed");
        assert_eq!(event.subscriber_count(), 0);
        assert!(event.inner.subscribers.borrow().is_none());
        event.fire(&[]).unwrap();
    }

    #[test]
    fn test_duplicates_fire_separately() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let event = ForeignEvent::unbound(&runtime(), "Changed");
        let f = recorder(&log, "f");

        event.subscribe(f.clone());
        event.subscribe(f.clone());
        event.fire(&[GuestValue::Int(1)]).unwrap();
        assert_eq!(*log.borrow(), vec!["f(1,)", "f(1,)"]);

        event.unsubscribe(&f).unwrap();
        assert_eq!(event.subscriber_count(), 1);
    }

    #[test]
    fn test_unsubscribe_while_firing() {
        let rt = runtime();
        let event = ForeignEvent::unbound(&rt, "Once");
        let log = Rc::new(RefCell::new(Vec::new()));
        let second = recorder(&log, "second");

        let remover = {
            let event = event.clone();
            let second = second.clone();
            GuestCallable::new("remover", move |_| {
                event.unsubscribe(&second)?;
                Ok(GuestValue::None)
            })
        };

        event.subscribe(remover);
        event.subscribe(second);
        event.fire(&[]).unwrap();
        assert_eq!(*log.borrow(), vec!["second()"]);

        log.borrow_mut().clear();
        event.fire(&[]).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_bound_event_mirrors_host_list() {
        let rt = runtime();
        let host_event = Rc::new(HostEvent::new("Clicked"));
        let event = ForeignEvent::bind(&rt, Rc::clone(&host_event));
        let log = Rc::new(RefCell::new(Vec::new()));
        let f = recorder(&log, "f");

        event.subscribe(f.clone());
        assert_eq!(host_event.handler_count(), 1);

        host_event.raise(&[HostValue::Int32(7)]).unwrap();
        assert_eq!(*log.borrow(), vec!["f(7,)"]);

        event.unsubscribe(&f).unwrap();
        assert_eq!(host_event.handler_count(), 0);
    }

    #[test]
    fn test_bound_event_error_round_trip() {
        let rt = runtime();
        let event = ForeignEvent::bind(&rt, Rc::new(HostEvent::new("Failing")));
        let original = GuestException::value_error("handler failed");
        let raised = original.clone();
        event.subscribe(GuestCallable::new("boom", move |_| Err(raised.clone())));

        let err = event.fire(&[]).unwrap_err();
        assert_eq!(err, original);
    }

    #[test]
    fn test_bound_remove_policy_from_host() {
        let rt = runtime();
        let host_event =
            Rc::new(HostEvent::new("Strict").with_remove_policy(RemovePolicy::RequirePresent));
        let event = ForeignEvent::bind(&rt, host_event);
        let stranger = GuestCallable::new("stranger", |_| Ok(GuestValue::None));

        let err = event.unsubscribe(&stranger).unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::KeyError);
    }

    #[test]
    fn test_failed_host_removal_keeps_lists_in_step() {
        let rt = runtime();
        let host_event =
            Rc::new(HostEvent::new("Strict").with_remove_policy(RemovePolicy::RequirePresent));
        let event = ForeignEvent::bind(&rt, Rc::clone(&host_event));
        let log = Rc::new(RefCell::new(Vec::new()));
        let handler = recorder(&log, "handler");
        event.subscribe(handler.clone());

        // host code drops the delegate behind the guest's back
        let delegate = host_event.handlers().unwrap().invocation_list()[0].clone();
        host_event.remove(&delegate).unwrap();

        for _ in 0..2 {
            let err = event.unsubscribe(&handler).unwrap_err();
            assert_eq!(err.kind(), GuestErrorKind::KeyError);
            assert_eq!(event.subscriber_count(), 1);
        }

        host_event.add(delegate);
        event.unsubscribe(&handler).unwrap();
        assert_eq!(event.subscriber_count(), 0);
        assert_eq!(host_event.handler_count(), 0);
    }

    #[test]
    fn test_raw_accessor_not_callable() {
        let event = ForeignEvent::unbound(&runtime(), "Changed");
        let raw = event.raw_accessor();

        let err = raw.call(&[]).unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::TypeError);
        assert_eq!(err.message(), "BoundEvent is not callable");
        assert_eq!(raw, event.raw_accessor());
    }
}
