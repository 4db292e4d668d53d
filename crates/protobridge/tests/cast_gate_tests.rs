//! Argument classification and conversion at native call boundaries

mod common;

use protobridge::{
    ArgClass, BridgeConfig, BridgeError, CastGate, ErrorKind, ForeignMessage, MessageArg,
    MessageProxy, ParamSpec, Value,
};

/// A message implemented outside the bridge that can serialize itself
#[derive(Debug)]
struct WireOnly {
    type_name: &'static str,
    bytes: Vec<u8>,
}

impl ForeignMessage for WireOnly {
    fn type_name(&self) -> Option<String> {
        Some(self.type_name.to_string())
    }

    fn serialize(&self) -> Option<Vec<u8>> {
        Some(self.bytes.clone())
    }
}

/// Claims a type name but cannot produce bytes
#[derive(Debug)]
struct Opaque;

impl ForeignMessage for Opaque {
    fn type_name(&self) -> Option<String> {
        Some("protobridge.test.IntMessage".to_string())
    }

    fn serialize(&self) -> Option<Vec<u8>> {
        None
    }
}

fn int_message(value: i32) -> MessageProxy {
    MessageProxy::with_fields(&common::descriptor("IntMessage"), [("value", value)]).unwrap()
}

#[test]
fn test_exact_type_passes_by_reference() {
    let gate = CastGate::default();
    let spec = ParamSpec::exact(&common::descriptor("IntMessage")).mutable();
    let arg = Value::from(int_message(1));
    assert_eq!(gate.classify(&arg, &spec), ArgClass::Exact);

    let cast = gate.cast(&arg, &spec).unwrap();
    assert!(matches!(cast, MessageArg::ByRef(_)));
    cast.proxy().unwrap().set_field("value", 2).unwrap();
    assert_eq!(arg.as_message().unwrap().get_field("value").unwrap(), Value::from(2));
}

#[test]
fn test_abstract_parameter() {
    let gate = CastGate::default();
    let spec = ParamSpec::any_message();
    let arg = Value::from(common::new_message("BaseMessage"));
    assert_eq!(gate.classify(&arg, &spec), ArgClass::Abstract);
    assert!(matches!(gate.cast(&arg, &spec).unwrap(), MessageArg::Abstract(_)));
}

#[test]
fn test_same_name_other_pool_is_converted() {
    let gate = CastGate::default();
    let spec = ParamSpec::exact(&common::descriptor("IntMessage"));
    let other = MessageProxy::with_fields(&common::base_only_descriptor("IntMessage"), [("value", 3)])
        .unwrap();
    let arg = Value::from(other.clone());
    assert_eq!(gate.classify(&arg, &spec), ArgClass::ForeignCompatible);

    let cast = gate.cast(&arg, &spec).unwrap();
    assert!(cast.is_copy());
    let copy = cast.into_proxy().unwrap();
    assert_eq!(copy.descriptor(), &common::descriptor("IntMessage"));
    assert_eq!(copy.get_field("value").unwrap(), Value::from(3));

    // the copy is private
    copy.set_field("value", 4).unwrap();
    assert_eq!(other.get_field("value").unwrap(), Value::from(3));
}

#[test]
fn test_foreign_object_is_converted() {
    let gate = CastGate::default();
    let spec = ParamSpec::exact(&common::descriptor("IntMessage"));
    let bytes = int_message(9).serialize(true).unwrap();
    let arg = Value::foreign(WireOnly {
        type_name: "protobridge.test.IntMessage",
        bytes,
    });
    assert_eq!(gate.classify(&arg, &spec), ArgClass::ForeignCompatible);
    let copy = gate.cast(&arg, &spec).unwrap().into_proxy().unwrap();
    assert_eq!(copy.get_field("value").unwrap(), Value::from(9));

    let err = gate.cast(&Value::foreign(Opaque), &spec).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}

#[test]
fn test_no_implicit_copy_rejects_conversion() {
    let gate = CastGate::default();
    let spec = ParamSpec::exact(&common::descriptor("IntMessage")).no_implicit_copy();
    let other = MessageProxy::new(&common::base_only_descriptor("IntMessage"));
    let err = gate.cast(&Value::from(other), &spec).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);

    // exact matches are still fine
    assert!(gate.cast(&Value::from(int_message(1)), &spec).is_ok());
}

#[test]
fn test_oversized_conversion_fails_loudly() {
    let gate = CastGate::with_config(BridgeConfig::new().with_max_conversion_bytes(1));
    let spec = ParamSpec::exact(&common::descriptor("IntMessage"));
    let other =
        MessageProxy::with_fields(&common::base_only_descriptor("IntMessage"), [("value", 300)])
            .unwrap();
    let err = gate.cast(&Value::from(other), &spec).unwrap_err();
    assert!(matches!(
        err,
        BridgeError::ConversionOverflow { size: 3, limit: 1, .. }
    ));
}

#[test]
fn test_null_and_other_arguments() {
    let gate = CastGate::default();
    let spec = ParamSpec::exact(&common::descriptor("IntMessage"));
    assert_eq!(gate.classify(&Value::None, &spec), ArgClass::Null);
    assert_eq!(gate.cast(&Value::None, &spec).unwrap_err().kind(), ErrorKind::TypeMismatch);
    assert!(matches!(
        gate.cast(&Value::None, &spec.clone().nullable()).unwrap(),
        MessageArg::Null
    ));

    for other in [Value::from(1), Value::from("x"), Value::from(common::new_message("BaseMessage"))] {
        assert_eq!(gate.classify(&other, &spec), ArgClass::Other);
        assert_eq!(gate.cast(&other, &spec).unwrap_err().kind(), ErrorKind::TypeMismatch);
    }
}

#[test]
fn test_const_view_and_mutable_parameters() {
    let gate = CastGate::default();
    let message = int_message(5);
    let view = Value::from(message.const_view());

    let read_only = ParamSpec::exact(&common::descriptor("IntMessage"));
    assert!(matches!(gate.cast(&view, &read_only).unwrap(), MessageArg::ByRef(_)));

    let mutable = read_only.clone().mutable();
    let copy = gate.cast(&view, &mutable).unwrap();
    assert!(copy.is_copy());
    copy.proxy().unwrap().set_field("value", 6).unwrap();
    assert_eq!(message.get_field("value").unwrap(), Value::from(5));

    let strict = mutable.no_implicit_copy();
    assert_eq!(gate.cast(&view, &strict).unwrap_err().kind(), ErrorKind::TypeMismatch);
}

#[test]
fn test_enum_arguments() {
    let color = common::linked()
        .get_enum_by_name("protobridge.test.Color")
        .unwrap();
    let lenient = CastGate::with_config(BridgeConfig::new());
    assert_eq!(lenient.cast_enum_arg(&Value::from(1), &color, None).unwrap(), 1);
    assert_eq!(lenient.cast_enum_arg(&Value::from("BLUE"), &color, None).unwrap(), 2);
    assert_eq!(
        lenient.cast_enum_arg(&Value::from(5), &color, None).unwrap_err().kind(),
        ErrorKind::InvalidEnumValue
    );
    assert_eq!(
        lenient.cast_enum_arg(&Value::from(1), &color, Some(true)).unwrap_err().kind(),
        ErrorKind::TypeMismatch
    );

    let strict = CastGate::with_config(BridgeConfig::new().with_strict_enums(true));
    assert!(strict.cast_enum_arg(&Value::from(1), &color, None).is_err());
    assert_eq!(strict.cast_enum_arg(&Value::from("GREEN"), &color, None).unwrap(), 1);
}
