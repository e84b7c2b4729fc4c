//! The registry of standard imports shipped with the compiler.
//!
//! The well-known files are vendored as source under `protobuf/` and
//! compiled into a shared descriptor pool the first time one is requested.

use std::sync::Arc;

use once_cell::sync::Lazy;
use prost_reflect::{DescriptorPool, FileDescriptor};

use crate::{
    lower,
    parse,
    reporter::{CollectReporter, Handler},
};

macro_rules! include_proto {
    ($name:literal) => {
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/protobuf/google/protobuf/",
            $name
        ))
    };
}

/// Vendored well-known files, in dependency order so each can be added to the
/// pool as it is compiled.
const STANDARD_IMPORTS: &[(&str, &str)] = &[
    (
        "google/protobuf/descriptor.proto",
        include_proto!("descriptor.proto"),
    ),
    ("google/protobuf/any.proto", include_proto!("any.proto")),
    (
        "google/protobuf/duration.proto",
        include_proto!("duration.proto"),
    ),
    ("google/protobuf/empty.proto", include_proto!("empty.proto")),
    (
        "google/protobuf/field_mask.proto",
        include_proto!("field_mask.proto"),
    ),
    (
        "google/protobuf/source_context.proto",
        include_proto!("source_context.proto"),
    ),
    ("google/protobuf/struct.proto", include_proto!("struct.proto")),
    (
        "google/protobuf/timestamp.proto",
        include_proto!("timestamp.proto"),
    ),
    (
        "google/protobuf/wrappers.proto",
        include_proto!("wrappers.proto"),
    ),
    ("google/protobuf/type.proto", include_proto!("type.proto")),
    ("google/protobuf/api.proto", include_proto!("api.proto")),
    (
        "google/protobuf/compiler/plugin.proto",
        include_proto!("compiler/plugin.proto"),
    ),
];

static POOL: Lazy<DescriptorPool> = Lazy::new(|| {
    let mut pool = DescriptorPool::new();
    for (name, source) in STANDARD_IMPORTS {
        let handler = Handler::new(Arc::new(CollectReporter::new()));
        let file = parse::parse(name, source, &handler)
            .unwrap_or_else(|err| panic!("failed to parse standard import '{}': {}", name, err));
        let proto = lower::lower(&file, &handler, false)
            .unwrap_or_else(|err| panic!("failed to lower standard import '{}': {}", name, err));
        pool.add_file_descriptor_proto(proto)
            .unwrap_or_else(|err| panic!("failed to link standard import '{}': {}", name, err));
    }
    pool
});

/// Looks up a well-known file by name, returning its linked descriptor.
pub(crate) fn standard_import(name: &str) -> Option<FileDescriptor> {
    if !STANDARD_IMPORTS.iter().any(|(known, _)| *known == name) {
        return None;
    }
    POOL.get_file_by_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_descriptor_proto() {
        let desc = standard_import("google/protobuf/descriptor.proto").unwrap();
        assert_eq!(desc.name(), "google/protobuf/descriptor.proto");
        assert_eq!(desc.package_name(), "google.protobuf");
        assert!(desc
            .messages()
            .any(|message| message.name() == "FileDescriptorProto"));
    }

    #[test]
    fn registry_links_transitive_imports() {
        let desc = standard_import("google/protobuf/api.proto").unwrap();
        assert_eq!(
            desc.dependencies()
                .map(|dep| dep.name().to_owned())
                .collect::<Vec<_>>(),
            vec![
                "google/protobuf/source_context.proto".to_owned(),
                "google/protobuf/type.proto".to_owned(),
            ],
        );
    }

    #[test]
    fn unknown_files_are_not_standard() {
        assert!(standard_import("google/protobuf/unknown.proto").is_none());
        assert!(standard_import("test.proto").is_none());
    }
}
