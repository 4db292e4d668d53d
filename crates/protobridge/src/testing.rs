//! Small schema shared by unit tests

use prost_reflect::{DescriptorPool, MessageDescriptor};
use prost_types::{
    field_descriptor_proto::{Label, Type},
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, MessageOptions,
};

pub(crate) fn field(
    name: &str,
    number: i32,
    label: Label,
    ty: Type,
    type_name: Option<&str>,
) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(label as i32),
        r#type: Some(ty as i32),
        type_name: type_name.map(str::to_string),
        ..Default::default()
    }
}

/// `unit.Leaf { int32 value = 1; }`, `unit.Outer { Leaf leaf = 1; repeated Leaf
/// leaves = 2; string label = 3; map<string, int32> counts = 4; Kind kind = 5;
/// repeated int32 numbers = 6; }`
pub(crate) fn pool() -> DescriptorPool {
    let counts_entry = DescriptorProto {
        name: Some("CountsEntry".to_string()),
        field: vec![
            field("key", 1, Label::Optional, Type::String, None),
            field("value", 2, Label::Optional, Type::Int32, None),
        ],
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };
    let file = FileDescriptorProto {
        name: Some("unit.proto".to_string()),
        package: Some("unit".to_string()),
        syntax: Some("proto2".to_string()),
        enum_type: vec![EnumDescriptorProto {
            name: Some("Kind".to_string()),
            value: ["ZERO", "ONE", "TWO"]
                .iter()
                .enumerate()
                .map(|(i, name)| EnumValueDescriptorProto {
                    name: Some(name.to_string()),
                    number: Some(i as i32),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }],
        message_type: vec![
            DescriptorProto {
                name: Some("Leaf".to_string()),
                field: vec![field("value", 1, Label::Optional, Type::Int32, None)],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("Outer".to_string()),
                field: vec![
                    field("leaf", 1, Label::Optional, Type::Message, Some(".unit.Leaf")),
                    field("leaves", 2, Label::Repeated, Type::Message, Some(".unit.Leaf")),
                    field("label", 3, Label::Optional, Type::String, None),
                    field(
                        "counts",
                        4,
                        Label::Repeated,
                        Type::Message,
                        Some(".unit.Outer.CountsEntry"),
                    ),
                    field("kind", 5, Label::Optional, Type::Enum, Some(".unit.Kind")),
                    field("numbers", 6, Label::Repeated, Type::Int32, None),
                ],
                nested_type: vec![counts_entry],
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    let mut pool = DescriptorPool::new();
    pool.add_file_descriptor_proto(file)
        .expect("unit test schema is valid");
    pool
}

pub(crate) fn outer() -> MessageDescriptor {
    pool()
        .get_message_by_name("unit.Outer")
        .expect("unit.Outer exists")
}
