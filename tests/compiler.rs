use std::{fs, path::Path};

use prost_types::{
    field_descriptor_proto::{Label, Type},
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto,
};
use protoforge::{CancellationToken, Compiler, SourceResolver, StandardImportsResolver};
use tempfile::TempDir;

fn with_current_dir(path: impl AsRef<Path>, f: impl FnOnce()) {
    use std::{
        env::{current_dir, set_current_dir},
        sync::Mutex,
    };

    use once_cell::sync::Lazy;
    use scopeguard::defer;

    static CURRENT_DIR_LOCK: Lazy<Mutex<()>> = Lazy::new(Default::default);

    let _lock = CURRENT_DIR_LOCK
        .lock()
        .unwrap_or_else(|err| err.into_inner());

    let prev_dir = current_dir().unwrap();
    defer!({
        let _ = set_current_dir(prev_dir);
    });

    set_current_dir(path).unwrap();
    f();
}

#[test]
fn compile_from_include_paths() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bar.proto"), "syntax = \"proto3\";\nmessage Bar {}\n").unwrap();
    fs::write(
        dir.path().join("root.proto"),
        "syntax = \"proto3\";\nimport \"bar.proto\";\nmessage Foo {\n  Bar bar = 1;\n}\n",
    )
    .unwrap();

    let files = protoforge::compile(["root.proto"], [dir.path()]).unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name(), "root.proto");

    let message = files[0].messages().next().unwrap();
    let field = message.fields().next().unwrap();
    assert_eq!(field.name(), "bar");
    assert_eq!(
        field.kind().as_message().map(|message| message.full_name().to_owned()),
        Some("Bar".to_owned()),
    );
}

#[test]
fn descriptors_match_expected_output() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("root.proto"),
        "syntax = \"proto3\";\nmessage Foo {\n  optional int32 a = 1;\n}\n",
    )
    .unwrap();

    let resolver = StandardImportsResolver::new(
        SourceResolver::new().with_import_paths([dir.path().to_owned()]),
    );
    let files = Compiler::new(resolver)
        .compile(&CancellationToken::new(), ["root.proto"])
        .unwrap();

    similar_asserts::assert_eq!(
        files[0].file_descriptor_proto(),
        &FileDescriptorProto {
            name: Some("root.proto".to_owned()),
            syntax: Some("proto3".to_owned()),
            message_type: vec![DescriptorProto {
                name: Some("Foo".to_owned()),
                field: vec![FieldDescriptorProto {
                    name: Some("a".to_owned()),
                    number: Some(1),
                    label: Some(Label::Optional as i32),
                    r#type: Some(Type::Int32 as i32),
                    json_name: Some("a".to_owned()),
                    oneof_index: Some(0),
                    proto3_optional: Some(true),
                    ..Default::default()
                }],
                oneof_decl: vec![prost_types::OneofDescriptorProto {
                    name: Some("_a".to_owned()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        },
    );
}

#[test]
fn compile_relative_to_current_dir() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.proto"), "syntax = \"proto3\";\nmessage A {}\n").unwrap();

    with_current_dir(&dir, || {
        // With no import paths the resolver opens the literal path.
        let resolver = SourceResolver::new();
        let files = Compiler::new(resolver)
            .compile(&CancellationToken::new(), ["a.proto"])
            .unwrap();
        assert_eq!(files[0].name(), "a.proto");
    });
}

#[test]
fn missing_files_report_not_found() {
    let dir = TempDir::new().unwrap();
    let err = protoforge::compile(["nope.proto"], [dir.path()]).unwrap_err();
    assert!(err.is_file_not_found());
}

#[test]
fn standard_imports_compile_from_the_registry() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("root.proto"),
        "syntax = \"proto3\";\nimport \"google/protobuf/timestamp.proto\";\nmessage Event {\n  google.protobuf.Timestamp at = 1;\n}\n",
    )
    .unwrap();

    let files = protoforge::compile(["root.proto"], [dir.path()]).unwrap();
    let field = files[0].messages().next().unwrap().fields().next().unwrap();
    assert_eq!(
        field.kind().as_message().map(|message| message.full_name().to_owned()),
        Some("google.protobuf.Timestamp".to_owned()),
    );
}

#[test]
fn parse_and_reprint_round_trip() {
    // Printing every token's leading whitespace and raw text reproduces the
    // input exactly, comments included.
    let source = "syntax = \"proto3\";\n\n// A service.\nservice Svc {\n\trpc Call (In) returns (Out); // unary\n}\n\nmessage In {}\nmessage Out {}\n";

    let handler = protoforge::Handler::new(std::sync::Arc::new(protoforge::CollectReporter::new()));
    let file = protoforge::parse("svc.proto", source, &handler).unwrap();

    let mut printed = String::new();
    for token in file.file_info().tokens() {
        printed.push_str(token.leading_whitespace());
        printed.push_str(token.raw_text());
    }
    similar_asserts::assert_eq!(printed, source);
}
