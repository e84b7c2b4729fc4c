//! A protobuf compiler front-end.
//!
//! Given a set of `.proto` files, the compiler resolves each file and its
//! transitive imports through a [`Resolver`], advances every file through
//! the stage pipeline (source → AST → descriptor proto → linked descriptor),
//! and returns fully linked [`FileDescriptor`](prost_reflect::FileDescriptor)s.
//!
//! For convenient compilation from the file system, see [`compile()`]. For
//! more options, custom resolvers, cancellation and parallelism control, see
//! [`Compiler`].
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), protoforge::Error> {
//! let files = protoforge::compile(["root.proto"], ["."])?;
//! assert_eq!(files[0].name(), "root.proto");
//! # Ok(())
//! # }
//! ```
//!
//! Compiling from memory, with the standard imports available:
//!
//! ```
//! # use std::collections::HashMap;
//! # use protoforge::{CancellationToken, Compiler, SourceResolver, StandardImportsResolver,
//! #     source_accessor_from_map};
//! # fn main() -> Result<(), protoforge::Error> {
//! let sources = HashMap::from([(
//!     "root.proto".to_owned(),
//!     "syntax = \"proto3\"; message Foo {}".to_owned(),
//! )]);
//! let resolver = StandardImportsResolver::new(
//!     SourceResolver::new().with_accessor(source_accessor_from_map(sources)),
//! );
//!
//! let files = Compiler::new(resolver).compile(&CancellationToken::new(), ["root.proto"])?;
//! assert_eq!(files[0].name(), "root.proto");
//! # Ok(())
//! # }
//! ```
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod ast;

mod compile;
mod error;
mod link;
mod lower;
mod parse;
mod reporter;
mod resolve;

pub use self::compile::{CancellationToken, Compiler};
pub use self::error::Error;
pub use self::link::link;
pub use self::lower::lower;
pub use self::parse::{parse, ParseError};
pub use self::reporter::{
    CollectReporter, Diagnostic, FailFastReporter, Handler, Level, Reporter,
};
pub use self::resolve::{
    source_accessor_from_map, Accessor, CompositeResolver, Resolver, SearchResult, SourceResolver,
    StandardImportsResolver,
};

pub(crate) const MAX_FILE_LEN: usize = i32::MAX as usize;

/// Convenience function for compiling a set of protobuf files from the file
/// system.
///
/// Files are searched for in the given include paths, standard imports such
/// as `google/protobuf/descriptor.proto` resolve against the built-in
/// registry, and source info is included in the returned descriptors. For
/// control over these choices use [`Compiler`] directly.
pub fn compile<F, P, I, Q>(
    files: F,
    includes: I,
) -> Result<Vec<prost_reflect::FileDescriptor>, Error>
where
    F: IntoIterator<Item = P>,
    P: AsRef<str>,
    I: IntoIterator<Item = Q>,
    Q: Into<std::path::PathBuf>,
{
    let resolver =
        StandardImportsResolver::new(SourceResolver::new().with_import_paths(includes));

    let mut compiler = Compiler::new(resolver);
    compiler.include_source_info(true);
    compiler.compile(&CancellationToken::new(), files)
}
