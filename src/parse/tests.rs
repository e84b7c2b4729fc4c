use std::sync::Arc;

use super::*;
use crate::{
    ast::{Constant, Definition, ImportKind, OptionNamePart, Syntax, Ty},
    reporter::{CollectReporter, FailFastReporter},
};

fn parse_ok(source: &str) -> FileNode {
    let handler = Handler::new(Arc::new(CollectReporter::new()));
    parse("test.proto", source, &handler).expect("file should parse")
}

fn parse_err(source: &str) -> ParseError {
    let handler = Handler::new(Arc::new(CollectReporter::new()));
    parse("test.proto", source, &handler).expect_err("file should not parse")
}

#[test]
fn file_shape() {
    let file = parse_ok(
        r#"syntax = "proto3";

package my.pkg;

import "dep.proto";
import public "pub.proto";
import weak "weak.proto";

option java_package = "com.example";

message Foo {
    int32 a = 1;
    repeated string b = 2;
    .Bar bar = 3;
}
"#,
    );

    assert_eq!(file.syntax, Syntax::Proto3);
    assert_eq!(file.package.as_ref().unwrap().name.to_string(), "my.pkg");
    assert_eq!(
        file.dependencies().collect::<Vec<_>>(),
        vec!["dep.proto", "pub.proto", "weak.proto"],
    );
    assert_eq!(file.imports[0].kind, None);
    assert_eq!(file.imports[1].kind, Some(ImportKind::Public));
    assert_eq!(file.imports[2].kind, Some(ImportKind::Weak));
    assert_eq!(file.options.len(), 1);

    let message = match &file.definitions[0] {
        Definition::Message(message) => message,
        other => panic!("expected a message, got {:?}", other),
    };
    assert_eq!(message.name.value, "Foo");
    assert_eq!(message.body.fields.len(), 3);
    assert!(matches!(message.body.fields[0].ty, Ty::Int32));
    assert_eq!(message.body.fields[1].number.value, 2);
    match &message.body.fields[2].ty {
        Ty::Named(name) => assert_eq!(name.to_string(), ".Bar"),
        other => panic!("expected a named type, got {:?}", other),
    }
}

#[test]
fn missing_syntax_defaults_to_proto2() {
    let file = parse_ok("message Foo { optional int32 a = 1; }");
    assert_eq!(file.syntax, Syntax::Proto2);
    assert!(file.syntax_span.is_none());
}

#[test]
fn custom_option_names() {
    let file = parse_ok(
        r#"syntax = "proto3";
message Foo {
    option (.foo) = "foo";
    option (bar).baz = 123;
}
"#,
    );

    let message = match &file.definitions[0] {
        Definition::Message(message) => message,
        other => panic!("expected a message, got {:?}", other),
    };

    let first = &message.body.options[0];
    match &first.name[0] {
        OptionNamePart::Extension(name) => assert_eq!(name.to_string(), ".foo"),
        other => panic!("expected an extension name, got {:?}", other),
    }
    assert!(matches!(&first.value, Constant::Str(value) if value.value == b"foo"));

    let second = &message.body.options[1];
    assert_eq!(second.name.len(), 2);
    match &second.name[1] {
        OptionNamePart::Ident(ident) => assert_eq!(ident.value, "baz"),
        other => panic!("expected a plain name, got {:?}", other),
    }
    assert!(matches!(&second.value, Constant::Int(int) if int.value == 123 && !int.negative));
}

#[test]
fn oneof_map_enum_service() {
    let file = parse_ok(
        r#"syntax = "proto3";
message Foo {
    oneof kind {
        string name = 1;
        int64 id = 2;
    }
    map<string, Foo> entries = 3;
    reserved 5, 9 to 11;
    reserved "old";
}
enum E {
    E_UNKNOWN = 0;
    E_NEGATIVE = -1;
}
service Svc {
    rpc Get (Foo) returns (stream Foo);
}
"#,
    );

    let message = match &file.definitions[0] {
        Definition::Message(message) => message,
        other => panic!("expected a message, got {:?}", other),
    };
    assert_eq!(message.body.oneofs[0].fields.len(), 2);
    assert_eq!(message.body.map_fields[0].name.value, "entries");
    assert_eq!(message.body.reserved.len(), 2);

    let value = match &file.definitions[1] {
        Definition::Enum(value) => value,
        other => panic!("expected an enum, got {:?}", other),
    };
    assert_eq!(value.values[1].name.value, "E_NEGATIVE");
    assert!(value.values[1].value.negative);

    let service = match &file.definitions[2] {
        Definition::Service(service) => service,
        other => panic!("expected a service, got {:?}", other),
    };
    assert!(!service.methods[0].is_client_streaming);
    assert!(service.methods[0].is_server_streaming);
}

#[test]
fn extend_block() {
    let file = parse_ok(
        r#"syntax = "proto2";
extend google.protobuf.MessageOptions {
    optional string foo = 30303;
}
"#,
    );

    let ext = match &file.definitions[0] {
        Definition::Extension(ext) => ext,
        other => panic!("expected an extension, got {:?}", other),
    };
    assert_eq!(ext.extendee.to_string(), "google.protobuf.MessageOptions");
    assert_eq!(ext.fields[0].name.value, "foo");
}

#[test]
fn reconstructs_source_from_file_info() {
    let source = "syntax = \"proto3\";\n\n// detached\n\n// leading\nmessage Foo { // trailing\n\tint32 a = 1; /* block */\n}\n// final\n";
    let file = parse_ok(source);
    let info = file.file_info();

    let mut reconstructed = String::new();
    for token in info.tokens() {
        reconstructed.push_str(token.leading_whitespace());
        reconstructed.push_str(token.raw_text());
    }
    assert_eq!(reconstructed, source);
}

#[test]
fn comment_attribution() {
    let source = "syntax = \"proto3\"; // trailing syntax\n// leading message\nmessage Foo {\n}\n";
    let file = parse_ok(source);
    let info = file.file_info();

    // `;` of the syntax statement holds the trailing comment.
    let (_, end) = file.syntax_span.unwrap();
    let trailing = info.token(end).trailing_comments();
    assert_eq!(trailing.len(), 1);
    assert_eq!(trailing.get(0).raw_text(), "// trailing syntax\n");

    let message = match &file.definitions[0] {
        Definition::Message(message) => message,
        other => panic!("expected a message, got {:?}", other),
    };
    let leading = info.token(message.start).leading_comments();
    assert_eq!(leading.len(), 1);
    assert_eq!(leading.get(0).raw_text(), "// leading message\n");
}

#[test]
fn final_comments_attach_to_eof() {
    let source = "syntax = \"proto3\";\n// final words\n";
    let file = parse_ok(source);
    let info = file.file_info();

    let leading = info.token(file.eof).leading_comments();
    assert_eq!(leading.len(), 1);
    assert_eq!(leading.get(0).raw_text(), "// final words\n");
}

#[test]
fn recovers_to_gather_several_errors() {
    let err = parse_err(
        r#"syntax = "proto3";
message Foo {
    int32 = 1;
}
message 42 {}
"#,
    );

    assert!(err.diagnostics().count() >= 2);
}

#[test]
fn fail_fast_stops_at_first_error() {
    let handler = Handler::new(Arc::new(FailFastReporter::new()));
    let err = parse(
        "test.proto",
        "message Foo {\n    int32 = 1;\n}\nmessage 42 {}\n",
        &handler,
    )
    .expect_err("file should not parse");

    assert_eq!(err.diagnostics().count(), 1);
}

#[test]
fn unknown_syntax_is_an_error() {
    let err = parse_err("syntax = \"proto4\";");
    let diagnostic = err.diagnostics().next().unwrap();
    assert!(diagnostic.message().contains("unknown syntax"));
}

#[test]
fn error_positions_are_one_based() {
    let err = parse_err("syntax = \"proto3\";\nmessage {}\n");
    let pos = err.position().expect("position is known");
    assert_eq!(pos.line, 2);
    assert_eq!(pos.col, 9);
}

#[test]
fn groups_are_rejected() {
    let err = parse_err(
        "syntax = \"proto2\";\nmessage Foo {\n  optional group Bar = 1 {}\n}\n",
    );
    assert!(err
        .diagnostics()
        .any(|diagnostic| diagnostic.message().contains("group")));
}
