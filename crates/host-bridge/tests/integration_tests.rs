//! Integration tests for the host bridge.
//!
//! These tests drive the adapters the way a guest evaluator would, through
//! the public API only.

use std::cell::RefCell;
use std::rc::Rc;

use host_bridge::{
    BridgeConfig, ForeignArray, ForeignEvent, GuestCallable, GuestErrorKind, GuestException,
    GuestSlice, GuestValue, InteropRuntime,
};
use host_runtime::{
    ElementType, HostEvent, HostObject, HostRuntime, HostValue, RemovePolicy, StdException,
    TypeDef, TypeRegistry,
};
use pretty_assertions::assert_eq;

fn runtime() -> InteropRuntime {
    InteropRuntime::new(HostRuntime::new())
}

fn int_array(rt: &InteropRuntime, values: impl IntoIterator<Item = i128>) -> ForeignArray {
    let items: Vec<GuestValue> = values.into_iter().map(GuestValue::Int).collect();
    ForeignArray::from_values(rt, ElementType::Int32, &items).unwrap()
}

// ============================================================================
// Exception Mapping
// ============================================================================

mod exceptions {
    use super::*;
    use pretty_assertions::assert_eq;
    use host_bridge::exception_map::{mapping_table, GUEST_ARGS_KEY};
    use host_runtime::HostException;

    #[test]
    fn test_direct_mappings() {
        let rt = runtime();
        for entry in mapping_table().iter().filter(|m| m.maps_host_to_guest()) {
            let id = rt.host().types().lookup(entry.host).unwrap();
            let exc = rt.host().construct_exception(id, &[]).unwrap();
            assert_eq!(rt.map_host_error(&exc).kind(), entry.guest, "{}", entry.host);
        }
    }

    #[test]
    fn test_unmapped_subtype_uses_nearest_ancestor() {
        let rt = runtime();
        let exc = HostException::new(StdException::NotFiniteNumberException, "nan");
        let guest = rt.map_host_error(&exc);

        assert_eq!(guest.kind(), GuestErrorKind::ArithmeticError);
        assert_eq!(guest.message(), "nan");
        assert_eq!(
            guest.cause().map(HostException::host_type),
            Some(StdException::NotFiniteNumberException.id())
        );
    }

    #[test]
    fn test_custom_subtype_resolution() {
        let mut types = TypeRegistry::new();
        let quota = types
            .define_exception("Acme.QuotaExceeded", "System.OverflowException")
            .unwrap();
        let nested = types
            .define_exception("Acme.HardQuotaExceeded", "Acme.QuotaExceeded")
            .unwrap();
        let rt = InteropRuntime::new(HostRuntime::with_types(types));

        assert_eq!(rt.mapper().guest_kind_for(quota), Some(GuestErrorKind::OverflowError));
        assert_eq!(rt.mapper().guest_kind_for(nested), Some(GuestErrorKind::OverflowError));

        let exc = rt.host().construct_exception(nested, &[]).unwrap();
        assert!(rt.map_host_error(&exc).is_instance(GuestErrorKind::ArithmeticError));
    }

    #[test]
    fn test_host_error_wraps_unrelated_root() {
        let mut types = TypeRegistry::new();
        let fault = types.define(TypeDef::new("Native.AccessViolation")).unwrap();
        let rt = InteropRuntime::new(HostRuntime::with_types(types));

        let exc = rt
            .host()
            .construct_exception(fault, &[HostValue::String("read at 0x0".into())])
            .unwrap();
        let guest = rt.map_host_error(&exc);

        assert_eq!(guest.kind(), GuestErrorKind::HostError);
        assert!(guest.is_instance(GuestErrorKind::Exception));
        assert!(!guest.is_instance(GuestErrorKind::StandardError));
        assert_eq!(guest.cause().map(HostException::message), Some("read at 0x0"));
    }

    #[test]
    fn test_stop_iteration_is_host_root() {
        let rt = runtime();
        let host = rt.map_guest_error(&GuestException::new(GuestErrorKind::StopIteration, ""));

        assert_eq!(host.host_type(), StdException::Exception.id());
        assert!(rt
            .host()
            .types()
            .is_subclass(host.host_type(), StdException::Exception.id()));
    }

    #[test]
    fn test_guest_kinds_raise_as_preferred_types() {
        let rt = runtime();
        let cases = [
            (GuestErrorKind::IndexError, StdException::IndexOutOfRangeException),
            (GuestErrorKind::TypeError, StdException::ArgumentTypeException),
            (GuestErrorKind::KeyError, StdException::KeyNotFoundException),
            (GuestErrorKind::OverflowError, StdException::OverflowException),
            (GuestErrorKind::NotImplementedError, StdException::NotImplementedException),
            (GuestErrorKind::LookupError, StdException::Exception),
            (GuestErrorKind::RuntimeError, StdException::Exception),
        ];

        for (kind, expected) in cases {
            let host = rt.map_guest_error(&GuestException::new(kind, "x"));
            assert_eq!(host.host_type(), expected.id(), "{}", kind);
            assert_eq!(host.message(), "x");
        }
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let rt = runtime();
        let original = GuestException::with_args(
            GuestErrorKind::KeyError,
            vec![GuestValue::Str("missing".into())],
        );

        let host = rt.map_guest_error(&original);
        let back = rt.map_host_error(&host);
        assert_eq!(back, original);
    }

    #[test]
    fn test_unicode_decode_payload_attached_as_data() {
        let rt = runtime();
        let payload = vec![
            GuestValue::Str("utf-8".into()),
            GuestValue::Str("\u{ff}".into()),
            GuestValue::Int(0),
            GuestValue::Int(1),
            GuestValue::Str("invalid start byte".into()),
        ];
        let guest = GuestException::with_args(GuestErrorKind::UnicodeDecodeError, payload);
        let host = rt.map_guest_error(&guest);

        assert_eq!(host.host_type(), StdException::DecoderFallbackException.id());
        let Some(HostValue::Object(args)) = host.data_value(GUEST_ARGS_KEY) else {
            panic!("payload not attached: {:?}", host.data());
        };
        let args = args.downcast_ref::<host_runtime::HostArray>().unwrap();
        assert_eq!(args.len(), 5);
        assert_eq!(args.get_flat(0).unwrap(), HostValue::String("utf-8".into()));
    }

    #[test]
    fn test_payload_binding_constructor() {
        let rt = runtime();
        let bytes = GuestValue::Host(HostValue::Object(HostObject::new("System.Byte[]", vec![0xffu8])));
        let guest = GuestException::with_args(
            GuestErrorKind::UnicodeDecodeError,
            vec![GuestValue::Str("bad byte".into()), bytes, GuestValue::Int(4)],
        );
        let host = rt.map_guest_error(&guest);

        assert_eq!(host.host_type(), StdException::DecoderFallbackException.id());
        assert_eq!(host.message(), "bad byte");
        assert_eq!(host.data_value("index"), Some(&HostValue::Int32(4)));
        assert!(host.data_value(GUEST_ARGS_KEY).is_none());
    }
}

// ============================================================================
// Foreign Arrays
// ============================================================================

mod arrays {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_concat_length_and_prefix() {
        let rt = runtime();
        let a = int_array(&rt, [1, 2, 3]);
        let b = int_array(&rt, [4, 5]);
        let c = a.concat(&b).unwrap();

        assert_eq!(c.len(), a.len() + b.len());
        assert_eq!(&c.to_vec()[..a.len()], a.to_vec().as_slice());
        assert_eq!(c.repr(), "Array[int]((1, 2, 3, 4, 5))");
        assert!(c.array_type().is(a.array_type()));
    }

    #[test]
    fn test_concat_widening() {
        let rt = runtime();
        let ints = int_array(&rt, [1]);
        let doubles =
            ForeignArray::from_values(&rt, ElementType::Double, &[GuestValue::Float(0.5)]).unwrap();
        let longs =
            ForeignArray::from_values(&rt, ElementType::Int64, &[GuestValue::Int(7)]).unwrap();

        let mixed = ints.concat(&doubles).unwrap();
        assert_eq!(mixed.element_type(), ElementType::Double);
        assert_eq!(mixed.repr(), "Array[float]((1.0, 0.5))");

        let wide = ints.concat(&longs).unwrap();
        assert_eq!(wide.element_type(), ElementType::Int64);

        let err = longs.concat(&doubles).unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::NotImplementedError);
    }

    #[test]
    fn test_repeat_lengths() {
        let rt = runtime();
        let a = int_array(&rt, [1, 2]);

        let tripled = a.repeat(3).unwrap();
        assert_eq!(tripled.len(), 6);
        assert_eq!(tripled.repr(), "Array[int]((1, 2, 1, 2, 1, 2))");

        for n in [0, -1, -100] {
            let empty = a.repeat(n).unwrap();
            assert_eq!(empty.len(), 0);
            assert!(empty.array_type().is(a.array_type()));
        }
    }

    #[test]
    fn test_repeat_too_large_is_memory_error() {
        let rt = runtime();
        let a = int_array(&rt, [1]);
        for n in [i128::from(i64::MAX), 1 << 100] {
            let err = a.repeat(n).unwrap_err();
            assert_eq!(err.kind(), GuestErrorKind::MemoryError, "count {}", n);
        }

        let empty = int_array(&rt, []);
        let repeated = empty.repeat(i128::from(i64::MAX)).unwrap();
        assert_eq!(repeated.len(), 0);
        assert!(repeated.array_type().is(empty.array_type()));
    }

    #[test]
    fn test_lower_bound_edges() {
        let rt = runtime();
        for (lower, len) in [(5i64, 4usize), (0, 3), (-2, 5)] {
            let a = ForeignArray::create(&rt, ElementType::Int32, &[len], &[lower]).unwrap();
            let last = lower + len as i64 - 1;

            assert_eq!(a.upper_bound(0).unwrap(), last);
            a.set_item(&GuestValue::from(last), &GuestValue::Int(42)).unwrap();
            assert_eq!(a.get_item(&GuestValue::from(last)).unwrap(), GuestValue::Int(42));
            assert_eq!(a.get_item(&GuestValue::from(lower)).unwrap(), GuestValue::Int(0));

            for bad in [lower - 1, lower + len as i64] {
                let err = a.get_item(&GuestValue::from(bad)).unwrap_err();
                assert_eq!(err.kind(), GuestErrorKind::IndexError, "index {}", bad);
            }
        }
    }

    #[test]
    fn test_negative_lower_bound_indices_are_absolute() {
        let rt = runtime();
        let a = ForeignArray::create(&rt, ElementType::Int32, &[5], &[-2]).unwrap();
        for i in -2..=2 {
            a.set_item(&GuestValue::Int(i), &GuestValue::Int(100 + i + 2)).unwrap();
        }

        assert_eq!(a.repr(), "Array[int]((100, 101, 102, 103, 104))");
        assert_eq!(a.get_item(&GuestValue::Int(-2)).unwrap(), GuestValue::Int(100));
        assert_eq!(a.get_item(&GuestValue::Int(-1)).unwrap(), GuestValue::Int(101));

        let head = a.get_item(&GuestValue::Slice(GuestSlice::new(Some(-2), Some(0), None)));
        let GuestValue::Array(head) = head.unwrap() else {
            panic!("slice read should produce an array");
        };
        assert_eq!(head.to_vec(), vec![GuestValue::Int(100), GuestValue::Int(101)]);
    }

    #[test]
    fn test_lower_bounds_do_not_affect_equality() {
        let rt = runtime();
        let zero = ForeignArray::create(&rt, ElementType::Int32, &[3], &[0]).unwrap();
        let five = ForeignArray::create(&rt, ElementType::Int32, &[3], &[5]).unwrap();
        for i in 0..3 {
            zero.set_item(&GuestValue::Int(i), &GuestValue::Int(i * 10)).unwrap();
            five.set_item(&GuestValue::Int(i + 5), &GuestValue::Int(i * 10)).unwrap();
        }

        assert_eq!(zero, five);
        assert_eq!(zero.repr(), five.repr());
    }

    #[test]
    fn test_extended_slice_assignment_length() {
        let rt = runtime();
        let a = int_array(&rt, 0..20);
        let evens = GuestSlice::new(None, None, Some(2));
        let eleven = GuestValue::List((0..11).map(GuestValue::Int).collect());

        let err = a.set_slice(&evens, &eleven).unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::ValueError);
        assert_eq!(a.get_item(&GuestValue::Int(0)).unwrap(), GuestValue::Int(0));

        let ten = GuestValue::List((0..10).map(|_| GuestValue::Int(-1)).collect());
        a.set_item(&GuestValue::Slice(evens), &ten).unwrap();
        assert_eq!(a.get_item(&GuestValue::Int(18)).unwrap(), GuestValue::Int(-1));
        assert_eq!(a.get_item(&GuestValue::Int(19)).unwrap(), GuestValue::Int(19));
    }

    #[test]
    fn test_slice_assignment_converts_before_writing() {
        let rt = runtime();
        let a = ForeignArray::create(&rt, ElementType::Byte, &[3], &[0]).unwrap();
        let values = GuestValue::Tuple(vec![
            GuestValue::Int(1),
            GuestValue::Int(2),
            GuestValue::Int(999),
        ]);

        let err = a.set_slice(&GuestSlice::full(), &values).unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::OverflowError);
        assert_eq!(a.to_vec(), vec![GuestValue::Int(0); 3]);
    }

    #[test]
    fn test_multi_dimensional_access() {
        let rt = runtime();
        let grid = ForeignArray::create(&rt, ElementType::Int32, &[2, 3], &[1, 10]).unwrap();
        let at = |r: i128, c: i128| GuestValue::Tuple(vec![GuestValue::Int(r), GuestValue::Int(c)]);

        grid.set_item(&at(2, 12), &GuestValue::Int(9)).unwrap();
        assert_eq!(grid.get_item(&at(-1, -1)).unwrap(), GuestValue::Int(9));
        assert_eq!(grid.get_item(&at(1, 10)).unwrap(), GuestValue::Int(0));

        let err = grid.get_item(&at(0, 10)).unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::IndexError);

        let err = grid.get_item(&GuestValue::Int(1)).unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::TypeError);

        assert_eq!(grid.len(), 6);
        assert!(grid.repr().starts_with("<2 dimensional Array[int] at 0x"));
    }

    #[test]
    fn test_multi_dimensional_slicing_not_implemented() {
        let rt = runtime();
        let grid = ForeignArray::create(&rt, ElementType::Int32, &[2, 2], &[0, 0]).unwrap();
        let row = GuestValue::Tuple(vec![GuestValue::Int(0), GuestValue::Slice(GuestSlice::full())]);

        let err = grid.get_item(&row).unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::NotImplementedError);

        let err = grid
            .set_item(&row, &GuestValue::List(vec![GuestValue::Int(1), GuestValue::Int(2)]))
            .unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::NotImplementedError);

        let err = grid.get_slice(&GuestSlice::full()).unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::NotImplementedError);

        let vector = int_array(&rt, [1]);
        assert_eq!(grid.concat(&vector).unwrap_err().kind(), GuestErrorKind::NotImplementedError);
        assert_eq!(vector.concat(&grid).unwrap_err().kind(), GuestErrorKind::NotImplementedError);
        assert_eq!(grid.repeat(2).unwrap_err().kind(), GuestErrorKind::NotImplementedError);
    }

    #[test]
    fn test_construction_is_lossless() {
        let rt = runtime();
        let err = ForeignArray::from_sequence(
            &rt,
            ElementType::Int32,
            &GuestValue::List(vec![GuestValue::Int(1), GuestValue::Float(1.5)]),
        )
        .unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::TypeError);

        let floats = ForeignArray::from_sequence(
            &rt,
            ElementType::Double,
            &GuestValue::Tuple(vec![GuestValue::Int(1), GuestValue::Bool(true)]),
        )
        .unwrap();
        assert_eq!(floats.to_vec(), vec![GuestValue::Float(1.0), GuestValue::Float(1.0)]);
    }

    #[test]
    fn test_type_identity_across_operations() {
        let rt = runtime();
        let a = int_array(&rt, [1, 2, 3]);
        let grid = ForeignArray::create(&rt, ElementType::Int32, &[1, 1], &[0, 0]).unwrap();
        let produced = [
            a.get_slice(&GuestSlice::new(Some(1), None, None)).unwrap(),
            a.concat(&a).unwrap(),
            a.repeat(2).unwrap(),
            a.repeat(0).unwrap(),
        ];

        for array in &produced {
            assert!(array.array_type().is(a.array_type()));
        }
        assert!(grid.array_type().is(a.array_type()));
    }

    #[test]
    fn test_canonical_lower_bound_config() {
        let rt = InteropRuntime::with_config(
            HostRuntime::new(),
            BridgeConfig::new().with_canonical_lower_bound(1),
        );
        let a = int_array(&rt, [7, 8]);

        assert_eq!(a.lower_bound(0).unwrap(), 1);
        assert_eq!(a.get_item(&GuestValue::Int(1)).unwrap(), GuestValue::Int(7));
        assert_eq!(a.repeat(2).unwrap().lower_bounds(), &[1]);
    }

    #[test]
    fn test_nested_arrays_round_trip() {
        let rt = runtime();
        let outer = ForeignArray::create(&rt, ElementType::Object, &[1], &[0]).unwrap();
        let inner = int_array(&rt, [1, 2]);

        outer.set_item(&GuestValue::Int(0), &GuestValue::Array(inner.clone())).unwrap();
        let GuestValue::Array(back) = outer.get_item(&GuestValue::Int(0)).unwrap() else {
            panic!("expected a foreign array");
        };
        assert!(back.same_storage(&inner));
        assert_eq!(outer.repr(), "Array[object]((Array[int]((1, 2))))");
    }
}

// ============================================================================
// Foreign Events
// ============================================================================

mod events {
    use super::*;
    use pretty_assertions::assert_eq;

    type Log = Rc<RefCell<Vec<(String, Vec<GuestValue>)>>>;

    fn recorder(log: &Log, name: &'static str) -> GuestCallable {
        let log = Rc::clone(log);
        GuestCallable::new(name, move |args| {
            log.borrow_mut().push((name.to_string(), args.to_vec()));
            Ok(GuestValue::None)
        })
    }

    fn names(log: &Log) -> Vec<String> {
        log.borrow().iter().map(|(name, _)| name.clone()).collect()
    }

    #[test]
    fn test_fire_order_and_unsubscribe() {
        let log: Log = Rc::default();
        let event = ForeignEvent::unbound(&runtime(), "Changed");
        let f1 = recorder(&log, "f1");
        let f2 = recorder(&log, "f2");

        event.subscribe(f1.clone());
        event.subscribe(f2.clone());
        let args = [GuestValue::Int(1), GuestValue::Str("x".into())];
        event.fire(&args).unwrap();

        assert_eq!(names(&log), vec!["f1", "f2"]);
        for (_, received) in log.borrow().iter() {
            assert_eq!(received.as_slice(), &args);
        }

        log.borrow_mut().clear();
        event.unsubscribe(&f1).unwrap();
        event.fire(&args).unwrap();
        assert_eq!(names(&log), vec!["f2"]);
    }

    #[test]
    fn test_bound_method_equality_for_unsubscribe() {
        let log: Log = Rc::default();
        let event = ForeignEvent::unbound(&runtime(), "Changed");
        let method = recorder(&log, "on_changed");

        event.subscribe(method.bind(GuestValue::Int(1)));
        event.subscribe(method.bind(GuestValue::Int(2)));
        event.unsubscribe(&method.bind(GuestValue::Int(1))).unwrap();
        event.fire(&[]).unwrap();

        let receivers: Vec<GuestValue> = log.borrow().iter().map(|(_, args)| args[0].clone()).collect();
        assert_eq!(receivers, vec![GuestValue::Int(2)]);
    }

    #[test]
    fn test_first_failure_aborts_firing() {
        let log: Log = Rc::default();
        let event = ForeignEvent::unbound(&runtime(), "Changed");
        event.subscribe(recorder(&log, "before"));
        event.subscribe(GuestCallable::new("fails", |_| {
            Err(GuestException::value_error("nope"))
        }));
        event.subscribe(recorder(&log, "after"));

        let err = event.fire(&[]).unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::ValueError);
        assert_eq!(names(&log), vec!["before"]);
    }

    #[test]
    fn test_absent_removal_policies() {
        let stranger = GuestCallable::new("stranger", |_| Ok(GuestValue::None));

        let lenient = ForeignEvent::unbound(&runtime(), "Lenient");
        assert!(lenient.unsubscribe(&stranger).is_ok());

        let strict_rt = InteropRuntime::with_config(
            HostRuntime::new(),
            BridgeConfig::new().with_unbound_remove_policy(RemovePolicy::RequirePresent),
        );
        let strict = ForeignEvent::unbound(&strict_rt, "Strict");
        let err = strict.unsubscribe(&stranger).unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::KeyError);
    }

    #[test]
    fn test_raw_accessor_is_not_callable() {
        let event = ForeignEvent::unbound(&runtime(), "Changed");
        event.subscribe(GuestCallable::new("noop", |_| Ok(GuestValue::None)));

        let err = event.raw_accessor().call(&[]).unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::TypeError);
        assert_eq!(err.message(), "BoundEvent is not callable");
    }

    #[test]
    fn test_bound_event_runs_host_and_guest_handlers() {
        let rt = runtime();
        let host_event = Rc::new(HostEvent::new("Tick"));
        let host_calls = Rc::new(RefCell::new(Vec::new()));
        {
            let host_calls = Rc::clone(&host_calls);
            host_event.add(host_runtime::Delegate::new("native", move |args| {
                host_calls.borrow_mut().push(args.to_vec());
                Ok(HostValue::Null)
            }));
        }

        let log: Log = Rc::default();
        let event = ForeignEvent::bind(&rt, Rc::clone(&host_event));
        event.subscribe(recorder(&log, "guest"));
        event.fire(&[GuestValue::Int(3)]).unwrap();

        assert_eq!(*host_calls.borrow(), vec![vec![HostValue::Int32(3)]]);
        assert_eq!(log.borrow()[0].1, vec![GuestValue::Int(3)]);
    }

    #[test]
    fn test_host_failure_reaches_guest_caller() {
        let rt = runtime();
        let host_event = Rc::new(HostEvent::new("Tick"));
        host_event.add(host_runtime::Delegate::new("native", |_| {
            Err(host_runtime::HostException::new(
                StdException::IndexOutOfRangeException,
                "native handler failed",
            ))
        }));

        let event = ForeignEvent::bind(&rt, host_event);
        let err = event.fire(&[]).unwrap_err();
        assert_eq!(err.kind(), GuestErrorKind::IndexError);
        assert_eq!(err.message(), "native handler failed");
    }
}
