//! Text form of native messages
//!
//! Formatting is prost-reflect's. The multi-line form ends every non-empty
//! output with a newline; the compact form is a single line.

use prost_reflect::text_format::FormatOptions;
use prost_reflect::DynamicMessage;

/// Multi-line text form
pub fn to_text(message: &DynamicMessage) -> String {
    let mut text = message.to_text_format_with_options(&FormatOptions::new().pretty(true));
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

/// Single-line text form
pub fn to_text_compact(message: &DynamicMessage) -> String {
    message.to_text_format()
}

#[cfg(test)]
mod tests {
    use prost_reflect::{MapKey, Value};

    use super::*;
    use crate::testing;

    fn populated() -> DynamicMessage {
        let outer = testing::outer();
        let mut message = DynamicMessage::new(outer.clone());
        message.set_field_by_name("label", Value::String("hi".into()));
        let leaf_fd = outer.get_field_by_name("leaf").unwrap();
        message
            .get_field_mut(&leaf_fd)
            .as_message_mut()
            .unwrap()
            .set_field_by_name("value", Value::I32(5));
        message.set_field_by_name("numbers", Value::List(vec![Value::I32(1), Value::I32(2)]));
        message.set_field_by_name("kind", Value::EnumNumber(2));
        message
    }

    #[test]
    fn test_multiline_form() {
        assert_eq!(
            to_text(&populated()),
            "leaf {\n  value: 5\n}\nlabel: \"hi\"\nkind: TWO\nnumbers: [1, 2]\n"
        );
        assert_eq!(to_text(&DynamicMessage::new(testing::outer())), "");
    }

    #[test]
    fn test_compact_form() {
        assert_eq!(
            to_text_compact(&populated()),
            "leaf{value:5},label:\"hi\",kind:TWO,numbers:[1,2]"
        );
    }

    #[test]
    fn test_map_entry() {
        let outer = testing::outer();
        let mut message = DynamicMessage::new(outer.clone());
        let counts = outer.get_field_by_name("counts").unwrap();
        message
            .get_field_mut(&counts)
            .as_map_mut()
            .unwrap()
            .insert(MapKey::String("a".into()), Value::I32(1));
        assert_eq!(
            to_text(&message),
            "counts: [{\n  key: \"a\"\n  value: 1\n}]\n"
        );
    }
}
