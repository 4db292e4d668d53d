//! Repeated and map container proxies

mod common;

use protobridge::{ErrorKind, MessageProxy, SliceSpec, Value};

fn ints(message: &MessageProxy) -> protobridge::RepeatedScalar {
    message.repeated_scalar("repeated_int_value").unwrap()
}

#[test]
fn test_sequence_history() {
    let message = common::new_message("TestMessage");
    let list = ints(&message);
    list.extend([8, 7]).unwrap();

    list.insert(1, 2).unwrap();
    assert_eq!(list.to_string(), "[8, 2, 7]");
    list.extend([6, 5]).unwrap();
    assert_eq!(list.to_string(), "[8, 2, 7, 6, 5]");
    list.set_slice(SliceSpec::range(0, 2), [1, 1, 1]).unwrap();
    assert_eq!(list.to_string(), "[1, 1, 1, 7, 6, 5]");
    list.append(4).unwrap();
    list.delete(0).unwrap();
    list.set(-1, 3).unwrap();
    let expected: Vec<Value> = [1, 1, 7, 6, 5, 3].into_iter().map(Value::from).collect();
    assert_eq!(list.to_vec().unwrap(), expected);
}

#[test]
fn test_container_reflects_later_writes() {
    let message = common::new_message("TestMessage");
    let list = ints(&message);
    let again = ints(&message);
    list.append(1).unwrap();
    assert_eq!(again.len().unwrap(), 1);
    assert_eq!(message.get_field("repeated_int_value").unwrap(), Value::list([1]));
}

#[test]
fn test_indexing_errors() {
    let message = common::new_message("TestMessage");
    let list = ints(&message);
    list.extend([1, 2]).unwrap();
    let err = list.get(2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    assert_eq!(err.path(), Some("repeated_int_value"));
    assert_eq!(list.get(-2).unwrap(), Value::from(1));
    assert_eq!(list.pop(Some(0)).unwrap(), Value::from(1));
    list.clear().unwrap();
    assert_eq!(list.pop(None).unwrap_err().kind(), ErrorKind::IndexOutOfRange);
}

#[test]
fn test_element_type_is_checked_before_mutation() {
    let message = common::new_message("TestMessage");
    let list = ints(&message);
    list.append(1).unwrap();
    assert_eq!(list.append("x").unwrap_err().kind(), ErrorKind::TypeMismatch);
    assert_eq!(list.set(0, 1.5).unwrap_err().kind(), ErrorKind::TypeMismatch);
    assert_eq!(
        list.set_slice(SliceSpec::full(), vec![Value::from(1), Value::from("x")])
            .unwrap_err()
            .kind(),
        ErrorKind::TypeMismatch
    );
    assert_eq!(list.to_string(), "[1]");
}

#[test]
fn test_repeated_message_add_and_mutate() {
    let message = common::new_message("TestMessage");
    let items = message.repeated_message("repeated_int_message").unwrap();
    let first = items.add([("value", 6)]).unwrap();
    items.add_default().unwrap().set_field("value", 7).unwrap();
    assert_eq!(items.to_string(), "[value:6, value:7]");

    first.set_field("value", 60).unwrap();
    assert_eq!(items.get(0).unwrap().get_field("value").unwrap(), Value::from(60));

    let err = items.add([("bogus", 1)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchField);
    assert_eq!(items.len().unwrap(), 2);
}

#[test]
fn test_repeated_message_elements_are_not_assignable() {
    let message = common::new_message("TestMessage");
    let items = message.repeated_message("repeated_int_message").unwrap();
    items.add_default().unwrap();
    let err = items
        .set(0, common::new_message("IntMessage"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAssignable);
}

#[test]
fn test_repeated_message_append_copies() {
    let message = common::new_message("TestMessage");
    let items = message.repeated_message("repeated_int_message").unwrap();
    let source = MessageProxy::with_fields(&common::descriptor("IntMessage"), [("value", 1)]).unwrap();
    items.append(source.clone()).unwrap();
    source.set_field("value", 2).unwrap();
    assert_eq!(items.get(0).unwrap().get_field("value").unwrap(), Value::from(1));

    let err = items.append(common::new_message("BaseMessage")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}

#[test]
fn test_removal_under_live_element_proxies() {
    let message = common::new_message("TestMessage");
    let items = message.repeated_message("repeated_int_message").unwrap();
    for value in 0..3 {
        items.add([("value", value)]).unwrap();
    }

    let middle = items.get(1).unwrap();
    // removing after the live element is fine
    items.delete(2).unwrap();
    // removing at or before it would re-point the proxy
    assert_eq!(items.delete(0).unwrap_err().kind(), ErrorKind::UnsupportedOperation);
    assert_eq!(items.pop(Some(1)).unwrap_err().kind(), ErrorKind::UnsupportedOperation);
    assert_eq!(items.clear().unwrap_err().kind(), ErrorKind::UnsupportedOperation);
    assert_eq!(
        message.clear_field("repeated_int_message").unwrap_err().kind(),
        ErrorKind::UnsupportedOperation
    );
    assert_eq!(items.len().unwrap(), 2);
    assert_eq!(middle.get_field("value").unwrap(), Value::from(1));

    drop(middle);
    let popped = items.pop(Some(0)).unwrap();
    assert_eq!(popped.get_field("value").unwrap(), Value::from(0));
    assert_eq!(items.len().unwrap(), 1);
    items.clear().unwrap();
    assert!(items.is_empty().unwrap());
}

/// Add a child to `nesting`'s `children` and tag it through `base_msg.id`
fn add_child(nesting: &MessageProxy, id: i32) -> MessageProxy {
    let child = nesting.repeated_message("children").unwrap().add_default().unwrap();
    child.message("base_msg").unwrap().set_field("id", id).unwrap();
    child
}

fn child_id(child: &MessageProxy) -> Value {
    child.message("base_msg").unwrap().get_field("id").unwrap()
}

#[test]
fn test_clearing_a_message_field_with_live_elements_below() {
    let message = common::new_message("TestMessage");
    let nesting = message.message("nesting").unwrap();
    let first = add_child(&nesting, 1);

    let err = message.clear_field("nesting").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert_eq!(err.path(), Some("nesting.children"));
    assert_eq!(message.clear().unwrap_err().kind(), ErrorKind::UnsupportedOperation);

    // nothing was dropped, so the proxy still sees its own element
    let second = add_child(&nesting, 99);
    assert_eq!(child_id(&first), Value::from(1));
    assert_eq!(child_id(&second), Value::from(99));

    drop(first);
    drop(second);
    message.clear_field("nesting").unwrap();
    assert_eq!(nesting.repeated_message("children").unwrap().len().unwrap(), 0);
}

#[test]
fn test_switching_oneof_with_live_elements_below() {
    let message = common::new_message("TestMessage");
    let first = add_child(&message.message("nesting_choice").unwrap(), 1);

    let err = message.set_field("text_choice", "x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert_eq!(message.which_oneof("choice").unwrap().as_deref(), Some("nesting_choice"));
    assert_eq!(child_id(&first), Value::from(1));

    drop(first);
    message.set_field("text_choice", "x").unwrap();
    assert_eq!(message.which_oneof("choice").unwrap().as_deref(), Some("text_choice"));
}

#[test]
fn test_dropping_a_message_extension_with_live_elements_below() {
    let key = common::extension_key("nesting_ext");
    let base = common::new_message("BaseMessage");
    let ext = base.get_extension(&key).unwrap().into_message().unwrap();
    let first = add_child(&ext, 1);

    assert_eq!(
        base.clear_extension(&key).unwrap_err().kind(),
        ErrorKind::UnsupportedOperation
    );
    let replacement = common::new_message("NestingMessage");
    assert_eq!(
        base.set_extension(&key, replacement.clone()).unwrap_err().kind(),
        ErrorKind::UnsupportedOperation
    );
    assert_eq!(child_id(&first), Value::from(1));

    drop(first);
    base.set_extension(&key, replacement).unwrap();
    assert_eq!(ext.repeated_message("children").unwrap().len().unwrap(), 0);
    base.clear_extension(&key).unwrap();
    assert!(!base.has_extension(&key).unwrap());
}

#[test]
fn test_removing_map_values_with_live_elements_below() {
    let message = common::new_message("TestMessage");
    let map = message.map_field("nesting_map").unwrap();
    let first = add_child(&map.get(1).unwrap().into_message().unwrap(), 1);
    map.get(2).unwrap();

    // other keys are unaffected
    map.delete(2).unwrap();
    assert_eq!(map.delete(1).unwrap_err().kind(), ErrorKind::UnsupportedOperation);
    assert_eq!(map.clear().unwrap_err().kind(), ErrorKind::UnsupportedOperation);
    assert_eq!(
        message.clear_field("nesting_map").unwrap_err().kind(),
        ErrorKind::UnsupportedOperation
    );
    assert_eq!(map.len().unwrap(), 1);
    assert_eq!(child_id(&first), Value::from(1));

    drop(first);
    map.delete(1).unwrap();
    assert!(map.is_empty().unwrap());
}

#[test]
fn test_message_map_lookup_shares_the_parent_root() {
    let message = common::new_message("TestMessage");
    let map = message.map_field("int_message_map").unwrap();
    map.get(3).unwrap();

    let entry = map.get_or(3, Value::None).unwrap().into_message().unwrap();
    assert_eq!(entry.owner(), message.owner());
    assert_eq!(entry.path(), "int_message_map");
    assert_eq!(map.get_or(4, Value::None).unwrap(), Value::None);
    assert_eq!(map.len().unwrap(), 1);
}

#[test]
fn test_repeated_message_slices() {
    let message = common::new_message("TestMessage");
    let items = message.repeated_message("repeated_int_message").unwrap();
    for value in 0..4 {
        items.add([("value", value)]).unwrap();
    }
    let odd: Vec<_> = items
        .slice(SliceSpec::new(Some(1), None, Some(2)))
        .unwrap()
        .iter()
        .map(|m| m.get_field("value").unwrap())
        .collect();
    assert_eq!(odd, vec![Value::from(1), Value::from(3)]);

    items.delete_slice(SliceSpec::range(2, 4)).unwrap();
    assert_eq!(items.to_string(), "[value:0, value:1]");
}

#[test]
fn test_scalar_map() {
    let message = common::new_message("TestMessage");
    let map = message.map_field("string_int_map").unwrap();
    map.set("a", 1).unwrap();
    map.update([("b", 2), ("a", 3)]).unwrap();
    assert_eq!(map.to_string(), "{'a': 3, 'b': 2}");
    assert_eq!(map.len().unwrap(), 2);

    // non-text key is rejected before anything changes
    let err = map.set(5, 5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    assert_eq!(map.len().unwrap(), 2);

    map.clear().unwrap();
    assert_eq!(map.len().unwrap(), 0);
}

#[test]
fn test_update_matches_sequential_assignment() {
    let pairs = [("k1", 1), ("k2", 2), ("k1", 9)];
    let a = common::new_message("TestMessage");
    a.map_field("string_int_map").unwrap().update(pairs).unwrap();
    let b = common::new_message("TestMessage");
    let map = b.map_field("string_int_map").unwrap();
    for (k, v) in pairs {
        map.set(k, v).unwrap();
    }
    assert_eq!(a, b);
}

#[test]
fn test_message_map_values_are_live() {
    let message = common::new_message("TestMessage");
    let map = message.map_field("int_message_map").unwrap();

    let entry = map.get(7).unwrap().into_message().unwrap();
    assert!(map.contains(7).unwrap());
    entry.set_field("value", 70).unwrap();
    assert_eq!(
        map.get(7).unwrap().as_message().unwrap().get_field("value").unwrap(),
        Value::from(70)
    );

    let err = map.set(8, common::new_message("IntMessage")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAssignable);
    let err = map.set(8, common::new_message("BaseMessage")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    assert!(!map.contains(8).unwrap());

    assert_eq!(map.get_or(9, Value::None).unwrap(), Value::None);
    assert!(!map.contains(9).unwrap());
}

#[test]
fn test_map_views_are_dynamic() {
    let message = common::new_message("TestMessage");
    let map = message.map_field("string_int_map").unwrap();
    let items = map.items();
    map.set("z", 26).unwrap();
    map.set("a", 1).unwrap();
    assert_eq!(
        items.to_vec().unwrap(),
        vec![(Value::from("a"), Value::from(1)), (Value::from("z"), Value::from(26))]
    );
    map.delete("z").unwrap();
    assert_eq!(items.len().unwrap(), 1);
}
