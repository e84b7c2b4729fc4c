use std::{collections::HashMap, io::Read};

use super::*;

fn read_source(result: SearchResult) -> String {
    match result {
        SearchResult::Source(mut reader) => {
            let mut source = String::new();
            reader.read_to_string(&mut source).unwrap();
            source
        }
        other => panic!("expected a source result, got {:?}", other),
    }
}

fn memory_resolver(sources: &[(&str, &str)]) -> SourceResolver {
    let sources: HashMap<String, String> = sources
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect();
    SourceResolver::new().with_accessor(source_accessor_from_map(sources))
}

#[test]
fn function_resolver_delegates() {
    let resolver = |path: &str| -> Result<SearchResult, Error> {
        if path == "test.proto" {
            Ok(SearchResult::source("message Foo {}"))
        } else {
            Err(Error::file_not_found(path))
        }
    };

    assert_eq!(
        read_source(resolver.find_file_by_path("test.proto").unwrap()),
        "message Foo {}",
    );
    assert!(resolver
        .find_file_by_path("other.proto")
        .unwrap_err()
        .is_file_not_found());
}

#[test]
fn composite_returns_first_success() {
    let mut composite = CompositeResolver::new();
    composite.add(|path: &str| -> Result<SearchResult, Error> {
        Err(Error::new(format!("first failed on {}", path)))
    });
    composite.add(|_: &str| -> Result<SearchResult, Error> {
        Ok(SearchResult::source("from second"))
    });
    composite.add(|_: &str| -> Result<SearchResult, Error> {
        panic!("the third resolver is never consulted")
    });

    let result = composite.find_file_by_path("test.proto").unwrap();
    assert_eq!(read_source(result), "from second");
}

#[test]
fn composite_returns_first_error() {
    let mut composite = CompositeResolver::new();
    composite
        .add(|_: &str| -> Result<SearchResult, Error> { Err(Error::new("first error")) });
    composite
        .add(|_: &str| -> Result<SearchResult, Error> { Err(Error::new("second error")) });

    let err = composite.find_file_by_path("test.proto").unwrap_err();
    assert_eq!(err.to_string(), "first error");
}

#[test]
fn empty_composite_reports_not_found() {
    let composite = CompositeResolver::new();
    let err = composite.find_file_by_path("test.proto").unwrap_err();
    assert!(err.is_file_not_found());
}

#[test]
fn source_resolver_uses_literal_path_without_import_paths() {
    let resolver = memory_resolver(&[("x.proto", "literal")]);

    let result = resolver.find_file_by_path("x.proto").unwrap();
    assert_eq!(read_source(result), "literal");

    let err = resolver.find_file_by_path("missing.proto").unwrap_err();
    assert!(err.is_file_not_found());
}

#[test]
fn source_resolver_searches_import_paths_in_order() {
    let resolver = memory_resolver(&[("/a/both.proto", "from a"), ("/b/both.proto", "from b")])
        .with_import_paths(["/a", "/b"]);

    let result = resolver.find_file_by_path("both.proto").unwrap();
    assert_eq!(read_source(result), "from a");
}

#[test]
fn source_resolver_falls_through_missing_import_paths() {
    let resolver =
        memory_resolver(&[("/b/x.proto", "from b")]).with_import_paths(["/a", "/b"]);

    let result = resolver.find_file_by_path("x.proto").unwrap();
    assert_eq!(read_source(result), "from b");

    let err = resolver.find_file_by_path("missing.proto").unwrap_err();
    assert!(err.is_file_not_found());
}

#[test]
fn source_resolver_fails_fast_on_other_errors() {
    let resolver = SourceResolver::new()
        .with_import_paths(["/a", "/b"])
        .with_accessor(|path: &Path| {
            if path.starts_with("/a") {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
            } else {
                Ok(Box::new(io::Cursor::new(Vec::new())) as Box<dyn Read + Send>)
            }
        });

    let err = resolver.find_file_by_path("x.proto").unwrap_err();
    assert!(!err.is_file_not_found());
    assert!(err.to_string().contains("/a/x.proto"));
}

#[test]
fn standard_imports_fill_in_missing_files() {
    let resolver = StandardImportsResolver::new(memory_resolver(&[("x.proto", "mine")]));

    match resolver
        .find_file_by_path("google/protobuf/descriptor.proto")
        .unwrap()
    {
        SearchResult::Desc(desc) => {
            assert_eq!(desc.name(), "google/protobuf/descriptor.proto")
        }
        other => panic!("expected a linked descriptor, got {:?}", other),
    }

    // Unknown files keep the inner resolver's error.
    let err = resolver.find_file_by_path("missing.proto").unwrap_err();
    assert!(err.is_file_not_found());
}

#[test]
fn standard_imports_never_override_the_inner_resolver() {
    let resolver = StandardImportsResolver::new(memory_resolver(&[(
        "google/protobuf/descriptor.proto",
        "shadowed",
    )]));

    let result = resolver
        .find_file_by_path("google/protobuf/descriptor.proto")
        .unwrap();
    assert_eq!(read_source(result), "shadowed");
}
