//! Shared schema for integration tests
//!
//! `protobridge/test.proto` (package `protobridge.test`, proto2):
//!
//! ```text
//! enum Color { RED = 0; GREEN = 1; BLUE = 2; }
//! message IntMessage { optional int32 value = 1; }
//! message BaseMessage { optional int32 id = 1; extensions 1000 to 1999; }
//! message NestingMessage { optional BaseMessage base_msg = 1; repeated NestingMessage children = 2; }
//! message TestMessage {
//!   optional string string_value = 1;
//!   optional int32 int_value = 2;
//!   optional IntMessage int_message = 3;
//!   repeated int32 repeated_int_value = 4;
//!   repeated IntMessage repeated_int_message = 5;
//!   map<string, int32> string_int_map = 6;
//!   map<int32, IntMessage> int_message_map = 7;
//!   optional Color color = 8;
//!   oneof choice { string text_choice = 9; int32 int_choice = 10; NestingMessage nesting_choice = 15; }
//!   optional double double_value = 11;
//!   optional bytes bytes_value = 12;
//!   optional uint32 uint_value = 13;
//!   optional float float_value = 14;
//!   optional NestingMessage nesting = 16;
//!   map<int32, NestingMessage> nesting_map = 17;
//! }
//! ```
//!
//! `protobridge/ext.proto` extends `BaseMessage` with `int_ext = 1001`,
//! `repeated_int_ext = 1002`, `int_message_ext = 1003` and
//! `nesting_ext = 1004` (a `NestingMessage`).

#![allow(dead_code)]

use once_cell::sync::Lazy;
use prost_reflect::{DescriptorPool, ExtensionDescriptor, MessageDescriptor};
use prost_types::{
    field_descriptor_proto::{Label, Type},
    descriptor_proto::ExtensionRange,
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, MessageOptions, OneofDescriptorProto,
};
use protobridge::{DescriptorResolver, ExtensionKey, MessageProxy};

pub const PACKAGE: &str = "protobridge.test";

/// Pool linking both files, registered with the global resolver
static LINKED: Lazy<DescriptorPool> = Lazy::new(|| {
    let pool = build_pool(true);
    DescriptorResolver::global().add_pool(&pool);
    pool
});

/// Pool with only the base file; never registered
static BASE_ONLY: Lazy<DescriptorPool> = Lazy::new(|| build_pool(false));

fn field(name: &str, number: i32, label: Label, ty: Type, type_name: Option<&str>) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(label as i32),
        r#type: Some(ty as i32),
        type_name: type_name.map(str::to_string),
        ..Default::default()
    }
}

fn map_entry(name: &str, key: Type, value: Type, value_type: Option<&str>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: vec![
            field("key", 1, Label::Optional, key, None),
            field("value", 2, Label::Optional, value, value_type),
        ],
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

fn base_file() -> FileDescriptorProto {
    let mut choice_text = field("text_choice", 9, Label::Optional, Type::String, None);
    choice_text.oneof_index = Some(0);
    let mut choice_int = field("int_choice", 10, Label::Optional, Type::Int32, None);
    choice_int.oneof_index = Some(0);
    let mut choice_nesting = field(
        "nesting_choice",
        15,
        Label::Optional,
        Type::Message,
        Some(".protobridge.test.NestingMessage"),
    );
    choice_nesting.oneof_index = Some(0);

    let mut test_message = message(
        "TestMessage",
        vec![
            field("string_value", 1, Label::Optional, Type::String, None),
            field("int_value", 2, Label::Optional, Type::Int32, None),
            field("int_message", 3, Label::Optional, Type::Message, Some(".protobridge.test.IntMessage")),
            field("repeated_int_value", 4, Label::Repeated, Type::Int32, None),
            field(
                "repeated_int_message",
                5,
                Label::Repeated,
                Type::Message,
                Some(".protobridge.test.IntMessage"),
            ),
            field(
                "string_int_map",
                6,
                Label::Repeated,
                Type::Message,
                Some(".protobridge.test.TestMessage.StringIntMapEntry"),
            ),
            field(
                "int_message_map",
                7,
                Label::Repeated,
                Type::Message,
                Some(".protobridge.test.TestMessage.IntMessageMapEntry"),
            ),
            field("color", 8, Label::Optional, Type::Enum, Some(".protobridge.test.Color")),
            choice_text,
            choice_int,
            choice_nesting,
            field("double_value", 11, Label::Optional, Type::Double, None),
            field("bytes_value", 12, Label::Optional, Type::Bytes, None),
            field("uint_value", 13, Label::Optional, Type::Uint32, None),
            field("float_value", 14, Label::Optional, Type::Float, None),
            field("nesting", 16, Label::Optional, Type::Message, Some(".protobridge.test.NestingMessage")),
            field(
                "nesting_map",
                17,
                Label::Repeated,
                Type::Message,
                Some(".protobridge.test.TestMessage.NestingMapEntry"),
            ),
        ],
    );
    test_message.nested_type = vec![
        map_entry("StringIntMapEntry", Type::String, Type::Int32, None),
        map_entry(
            "IntMessageMapEntry",
            Type::Int32,
            Type::Message,
            Some(".protobridge.test.IntMessage"),
        ),
        map_entry(
            "NestingMapEntry",
            Type::Int32,
            Type::Message,
            Some(".protobridge.test.NestingMessage"),
        ),
    ];
    test_message.oneof_decl = vec![OneofDescriptorProto {
        name: Some("choice".to_string()),
        ..Default::default()
    }];

    let mut base = message("BaseMessage", vec![field("id", 1, Label::Optional, Type::Int32, None)]);
    base.extension_range = vec![ExtensionRange {
        start: Some(1000),
        end: Some(2000),
        ..Default::default()
    }];

    FileDescriptorProto {
        name: Some("protobridge/test.proto".to_string()),
        package: Some(PACKAGE.to_string()),
        syntax: Some("proto2".to_string()),
        enum_type: vec![EnumDescriptorProto {
            name: Some("Color".to_string()),
            value: ["RED", "GREEN", "BLUE"]
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
            message("IntMessage", vec![field("value", 1, Label::Optional, Type::Int32, None)]),
            base,
            message(
                "NestingMessage",
                vec![
                    field("base_msg", 1, Label::Optional, Type::Message, Some(".protobridge.test.BaseMessage")),
                    field(
                        "children",
                        2,
                        Label::Repeated,
                        Type::Message,
                        Some(".protobridge.test.NestingMessage"),
                    ),
                ],
            ),
            test_message,
        ],
        ..Default::default()
    }
}

fn extension_file() -> FileDescriptorProto {
    let extend = |mut f: FieldDescriptorProto| {
        f.extendee = Some(".protobridge.test.BaseMessage".to_string());
        f
    };
    FileDescriptorProto {
        name: Some("protobridge/ext.proto".to_string()),
        package: Some(PACKAGE.to_string()),
        syntax: Some("proto2".to_string()),
        dependency: vec!["protobridge/test.proto".to_string()],
        extension: vec![
            extend(field("int_ext", 1001, Label::Optional, Type::Int32, None)),
            extend(field("repeated_int_ext", 1002, Label::Repeated, Type::Int32, None)),
            extend(field(
                "int_message_ext",
                1003,
                Label::Optional,
                Type::Message,
                Some(".protobridge.test.IntMessage"),
            )),
            extend(field(
                "nesting_ext",
                1004,
                Label::Optional,
                Type::Message,
                Some(".protobridge.test.NestingMessage"),
            )),
        ],
        ..Default::default()
    }
}

fn build_pool(with_extensions: bool) -> DescriptorPool {
    let mut pool = DescriptorPool::new();
    pool.add_file_descriptor_proto(base_file())
        .expect("base schema is valid");
    if with_extensions {
        pool.add_file_descriptor_proto(extension_file())
            .expect("extension schema is valid");
    }
    pool
}

/// Pool with both files; also registered with the global resolver
pub fn linked() -> &'static DescriptorPool {
    &LINKED
}

/// Pool without the extension file
pub fn base_only() -> &'static DescriptorPool {
    &BASE_ONLY
}

pub fn descriptor(name: &str) -> MessageDescriptor {
    linked()
        .get_message_by_name(&format!("{}.{}", PACKAGE, name))
        .unwrap_or_else(|| panic!("{} is in the test schema", name))
}

pub fn base_only_descriptor(name: &str) -> MessageDescriptor {
    base_only()
        .get_message_by_name(&format!("{}.{}", PACKAGE, name))
        .unwrap_or_else(|| panic!("{} is in the test schema", name))
}

pub fn extension(name: &str) -> ExtensionDescriptor {
    linked()
        .get_extension_by_name(&format!("{}.{}", PACKAGE, name))
        .unwrap_or_else(|| panic!("{} is in the test schema", name))
}

pub fn extension_key(name: &str) -> ExtensionKey {
    ExtensionKey::new(extension(name))
}

pub fn new_message(name: &str) -> MessageProxy {
    MessageProxy::new(&descriptor(name))
}
