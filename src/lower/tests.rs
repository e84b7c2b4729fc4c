use std::sync::Arc;

use prost_types::field_descriptor_proto::{Label, Type};

use super::*;
use crate::reporter::CollectReporter;

fn lower_ok(source: &str) -> FileDescriptorProto {
    lower_with_source_info(source, false)
}

fn lower_with_source_info(source: &str, include_source_info: bool) -> FileDescriptorProto {
    let handler = Handler::new(Arc::new(CollectReporter::new()));
    let file = crate::parse::parse("test.proto", source, &handler).expect("file should parse");
    lower(&file, &handler, include_source_info).expect("file should lower")
}

fn location<'a>(
    descriptor: &'a FileDescriptorProto,
    path: &[i32],
) -> &'a prost_types::source_code_info::Location {
    descriptor
        .source_code_info
        .as_ref()
        .expect("source info is generated")
        .location
        .iter()
        .find(|location| location.path == path)
        .unwrap_or_else(|| panic!("no location for path {:?}", path))
}

#[test]
fn scalar_and_named_fields() {
    let descriptor = lower_ok(
        r#"syntax = "proto3";
package my.pkg;
message Foo {
    int32 a = 1;
    repeated string b = 2;
    .other.Bar bar = 3;
    Baz baz = 4;
}
"#,
    );

    assert_eq!(descriptor.name(), "test.proto");
    assert_eq!(descriptor.package(), "my.pkg");
    assert_eq!(descriptor.syntax(), "proto3");

    let message = &descriptor.message_type[0];
    assert_eq!(message.name(), "Foo");

    assert_eq!(message.field[0].name(), "a");
    assert_eq!(message.field[0].number(), 1);
    assert_eq!(message.field[0].r#type(), Type::Int32);
    assert_eq!(message.field[0].label(), Label::Optional);
    assert_eq!(message.field[0].json_name(), "a");

    assert_eq!(message.field[1].label(), Label::Repeated);
    assert_eq!(message.field[1].r#type(), Type::String);

    assert_eq!(message.field[2].type_name(), ".other.Bar");
    assert!(message.field[2].r#type.is_none());
    assert_eq!(message.field[3].type_name(), "Baz");
}

#[test]
fn json_names_are_camel_case() {
    let descriptor = lower_ok(
        r#"syntax = "proto3";
message Foo {
    string foo_bar_baz = 1;
    string already = 2 [json_name = "overridden"];
}
"#,
    );

    let message = &descriptor.message_type[0];
    assert_eq!(message.field[0].json_name(), "fooBarBaz");
    assert_eq!(message.field[1].json_name(), "overridden");
}

#[test]
fn proto2_defaults() {
    let descriptor = lower_ok(
        r#"syntax = "proto2";
message Foo {
    optional bool flag = 1 [default = false];
    optional int32 count = 2 [default = -5];
    optional string name = 3 [default = "abc"];
    optional Mode mode = 4 [default = MODE_FAST];
}
enum Mode {
    MODE_FAST = 0;
}
"#,
    );

    let message = &descriptor.message_type[0];
    assert_eq!(message.field[0].default_value(), "false");
    assert_eq!(message.field[1].default_value(), "-5");
    assert_eq!(message.field[2].default_value(), "abc");
    assert_eq!(message.field[3].default_value(), "MODE_FAST");
    assert_eq!(message.field[0].options, None);
}

#[test]
fn map_fields_generate_entry_messages() {
    let descriptor = lower_ok(
        r#"syntax = "proto3";
message Foo {
    map<string, Foo> foo_map = 1;
}
"#,
    );

    let message = &descriptor.message_type[0];
    let field = &message.field[0];
    assert_eq!(field.label(), Label::Repeated);
    assert_eq!(field.type_name(), "FooMapEntry");

    let entry = &message.nested_type[0];
    assert_eq!(entry.name(), "FooMapEntry");
    assert_eq!(entry.options.as_ref().unwrap().map_entry, Some(true));
    assert_eq!(entry.field[0].name(), "key");
    assert_eq!(entry.field[0].r#type(), Type::String);
    assert_eq!(entry.field[1].name(), "value");
    assert_eq!(entry.field[1].type_name(), "Foo");
}

#[test]
fn proto3_optional_creates_synthetic_oneof() {
    let descriptor = lower_ok(
        r#"syntax = "proto3";
message Foo {
    optional int32 a = 1;
    oneof kind {
        string name = 2;
    }
}
"#,
    );

    let message = &descriptor.message_type[0];
    assert_eq!(message.oneof_decl.len(), 2);
    assert_eq!(message.oneof_decl[0].name(), "kind");
    assert_eq!(message.oneof_decl[1].name(), "_a");

    let optional = &message.field[0];
    assert_eq!(optional.proto3_optional, Some(true));
    assert_eq!(optional.oneof_index, Some(1));

    let oneof_field = &message.field[1];
    assert_eq!(oneof_field.name(), "name");
    assert_eq!(oneof_field.oneof_index, Some(0));
    assert!(oneof_field.proto3_optional.is_none());
}

#[test]
fn uninterpreted_options_are_encoded() {
    let descriptor = lower_ok(
        r#"syntax = "proto3";
import "google/protobuf/descriptor.proto";
message Foo {
    option (.foo) = "foo";
    option (bar) = 123;
    option (quz).inner = -7;
    option deprecated = true;
}
"#,
    );

    let options = descriptor.message_type[0].options.as_ref().unwrap();
    let uninterpreted = &options.uninterpreted_option;
    assert_eq!(uninterpreted.len(), 4);

    assert_eq!(uninterpreted[0].name[0].name_part, ".foo");
    assert!(uninterpreted[0].name[0].is_extension);
    assert_eq!(uninterpreted[0].string_value(), &b"foo"[..]);

    assert_eq!(uninterpreted[1].name[0].name_part, "bar");
    assert!(uninterpreted[1].name[0].is_extension);
    assert_eq!(uninterpreted[1].positive_int_value(), 123);

    assert_eq!(uninterpreted[2].name[1].name_part, "inner");
    assert!(!uninterpreted[2].name[1].is_extension);
    assert_eq!(uninterpreted[2].negative_int_value(), -7);

    assert!(!uninterpreted[3].name[0].is_extension);
    assert_eq!(uninterpreted[3].identifier_value(), "true");
}

#[test]
fn extensions_record_the_extendee() {
    let descriptor = lower_ok(
        r#"syntax = "proto2";
import "google/protobuf/descriptor.proto";
extend google.protobuf.MessageOptions {
    optional string foo = 30303;
}
"#,
    );

    let ext = &descriptor.extension[0];
    assert_eq!(ext.name(), "foo");
    assert_eq!(ext.extendee(), "google.protobuf.MessageOptions");
    assert_eq!(ext.number(), 30303);
}

#[test]
fn reserved_and_extension_ranges() {
    let descriptor = lower_ok(
        r#"syntax = "proto2";
message Foo {
    reserved 2, 9 to 11, 100 to max;
    reserved "old", "older";
    extensions 1000 to max;
}
enum Bar {
    BAR_UNKNOWN = 0;
    reserved 5, 10 to max;
}
"#,
    );

    let message = &descriptor.message_type[0];
    let ranges: Vec<(i32, i32)> = message
        .reserved_range
        .iter()
        .map(|range| (range.start(), range.end()))
        .collect();
    assert_eq!(
        ranges,
        vec![(2, 3), (9, 12), (100, 536_870_912)],
    );
    assert_eq!(message.reserved_name, vec!["old", "older"]);
    assert_eq!(message.extension_range[0].start(), 1000);
    assert_eq!(message.extension_range[0].end(), 536_870_912);

    let value = &descriptor.enum_type[0];
    let ranges: Vec<(i32, i32)> = value
        .reserved_range
        .iter()
        .map(|range| (range.start(), range.end()))
        .collect();
    assert_eq!(ranges, vec![(5, 5), (10, i32::MAX)]);
}

#[test]
fn field_numbers_are_validated() {
    let handler = Handler::new(Arc::new(CollectReporter::new()));
    let file = crate::parse::parse(
        "test.proto",
        "syntax = \"proto3\";\nmessage Foo {\n    int32 a = 536870912;\n}\n",
        &handler,
    )
    .expect("file should parse");

    let err = lower(&file, &handler, false).expect_err("number is out of range");
    assert!(err
        .diagnostics()
        .any(|diagnostic| diagnostic.message().contains("field numbers")));
}

#[test]
fn source_info_spans_and_comments() {
    let descriptor = lower_with_source_info(
        "syntax = \"proto3\";\nmessage Foo {\n  // leading comments\n  .Foo foo = 1;\n}\n",
        true,
    );

    // The message spans lines 2-5 (zero based 1..4).
    let message = location(&descriptor, &[4, 0]);
    assert_eq!(message.span, vec![1, 0, 4, 1]);

    let field = location(&descriptor, &[4, 0, 2, 0]);
    assert_eq!(field.leading_comments(), " leading comments\n");
    assert_eq!(field.span, vec![3, 2, 15]);

    let name = location(&descriptor, &[4, 0, 2, 0, 1]);
    assert_eq!(name.span, vec![3, 7, 10]);
}

#[test]
fn source_info_detached_comments() {
    let descriptor = lower_with_source_info(
        "syntax = \"proto3\";\n\n// detached\n\n// leading\nmessage Foo {} // trailing\n",
        true,
    );

    let message = location(&descriptor, &[4, 0]);
    assert_eq!(message.leading_detached_comments, vec![" detached\n"]);
    assert_eq!(message.leading_comments(), " leading\n");
    assert_eq!(message.trailing_comments(), " trailing\n");
}

#[test]
fn source_info_is_omitted_unless_requested() {
    let descriptor = lower_ok("syntax = \"proto3\";\nmessage Foo {}\n");
    assert!(descriptor.source_code_info.is_none());
}
