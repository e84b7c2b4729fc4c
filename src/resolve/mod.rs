//! Interfaces for locating protobuf files by their logical path.
//!
//! A [`Resolver`] maps the forward-slash paths used in `import` statements to
//! a [`SearchResult`]: source text, a parsed AST, a descriptor proto, or a
//! fully linked descriptor. The compiler picks the pipeline up from whichever
//! stage the resolver can supply.

mod standard;
#[cfg(test)]
mod tests;

use std::{
    collections::HashMap,
    fmt, fs,
    io::{self, Read},
    path::{Path, PathBuf},
    sync::Arc,
};

use prost_reflect::FileDescriptor;
use prost_types::FileDescriptorProto;

use crate::{ast::FileNode, Error};

/// Information a [`Resolver`] can supply about a file, at one of four stages
/// of compilation.
///
/// Stages above the one returned are skipped: a [`SearchResult::Desc`]
/// bypasses the pipeline entirely.
pub enum SearchResult {
    /// The source text of the file. The compiler will parse it.
    Source(Box<dyn Read + Send>),
    /// A parsed syntax tree. The compiler will lower it to a descriptor
    /// proto.
    Ast(FileNode),
    /// An unlinked descriptor proto. The compiler will link it against its
    /// dependencies.
    Proto(FileDescriptorProto),
    /// A fully linked descriptor. The compiler has no work left for this
    /// file.
    Desc(FileDescriptor),
}

impl SearchResult {
    /// Wraps source text held in memory.
    pub fn source(source: impl Into<String>) -> Self {
        SearchResult::Source(Box::new(io::Cursor::new(source.into().into_bytes())))
    }
}

impl fmt::Debug for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchResult::Source(_) => f.debug_tuple("Source").finish(),
            SearchResult::Ast(ast) => f.debug_tuple("Ast").field(&ast.name()).finish(),
            SearchResult::Proto(proto) => f.debug_tuple("Proto").field(&proto.name()).finish(),
            SearchResult::Desc(desc) => f.debug_tuple("Desc").field(&desc.name()).finish(),
        }
    }
}

/// A strategy for locating protobuf files.
///
/// The compiler resolves every requested path, seed files and imports alike,
/// through a single resolver. Resolvers must be thread-safe: paths are
/// resolved from worker threads during parallel compilation.
pub trait Resolver: Send + Sync {
    /// Searches for information about the given logical path.
    ///
    /// # Errors
    ///
    /// If no information is available, implementations should return
    /// [`Error::file_not_found()`].
    fn find_file_by_path(&self, path: &str) -> Result<SearchResult, Error>;
}

impl<F> Resolver for F
where
    F: Fn(&str) -> Result<SearchResult, Error> + Send + Sync,
{
    fn find_file_by_path(&self, path: &str) -> Result<SearchResult, Error> {
        (self)(path)
    }
}

impl Resolver for Box<dyn Resolver> {
    fn find_file_by_path(&self, path: &str) -> Result<SearchResult, Error> {
        (**self).find_file_by_path(path)
    }
}

impl<R> Resolver for Arc<R>
where
    R: Resolver + ?Sized,
{
    fn find_file_by_path(&self, path: &str) -> Result<SearchResult, Error> {
        (**self).find_file_by_path(path)
    }
}

/// A [`Resolver`] which consults a sequence of other resolvers in order.
///
/// The first resolver that can supply a result wins. If none can, the error
/// returned by the *first* resolver is returned; an empty sequence reports
/// every file as not found.
#[derive(Default)]
pub struct CompositeResolver {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl CompositeResolver {
    /// Creates a new, empty `CompositeResolver`.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a resolver, searched after all previously-added ones.
    pub fn add<R>(&mut self, resolver: R)
    where
        R: Resolver + 'static,
    {
        self.resolvers.push(Box::new(resolver));
    }
}

impl Resolver for CompositeResolver {
    fn find_file_by_path(&self, path: &str) -> Result<SearchResult, Error> {
        let mut first_err = None;
        for resolver in &self.resolvers {
            match resolver.find_file_by_path(path) {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }

        Err(first_err.unwrap_or_else(|| Error::file_not_found(path)))
    }
}

impl fmt::Debug for CompositeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeResolver")
            .field("resolvers", &self.resolvers.len())
            .finish()
    }
}

/// A function returning a file's contents, used by [`SourceResolver`] in
/// place of the file system.
pub type Accessor = dyn Fn(&Path) -> io::Result<Box<dyn Read + Send>> + Send + Sync;

/// A [`Resolver`] which supplies source code, searching an optional list of
/// import paths.
///
/// With no import paths the requested path is passed to the accessor as-is;
/// otherwise each import path is joined with the requested path and tried in
/// order, moving on only when the candidate does not exist.
pub struct SourceResolver {
    import_paths: Vec<PathBuf>,
    accessor: Box<Accessor>,
}

impl SourceResolver {
    /// Creates a resolver reading from the file system relative to the
    /// current directory.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the list of import paths to search.
    pub fn with_import_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.import_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the file system with a custom accessor.
    ///
    /// The accessor is expected to surface [`io::ErrorKind::NotFound`] for
    /// missing files so that the remaining import paths are tried.
    pub fn with_accessor<A>(mut self, accessor: A) -> Self
    where
        A: Fn(&Path) -> io::Result<Box<dyn Read + Send>> + Send + Sync + 'static,
    {
        self.accessor = Box::new(accessor);
        self
    }
}

impl Default for SourceResolver {
    fn default() -> Self {
        SourceResolver {
            import_paths: Vec::new(),
            accessor: Box::new(|path: &Path| {
                let file = fs::File::open(path)?;
                Ok(Box::new(file) as Box<dyn Read + Send>)
            }),
        }
    }
}

impl Resolver for SourceResolver {
    fn find_file_by_path(&self, path: &str) -> Result<SearchResult, Error> {
        if self.import_paths.is_empty() {
            return match (self.accessor)(Path::new(path)) {
                Ok(reader) => Ok(SearchResult::Source(reader)),
                Err(err) => Err(Error::open_file(PathBuf::from(path), err)),
            };
        }

        let mut not_found = None;
        for import_path in &self.import_paths {
            let candidate = import_path.join(path);
            match (self.accessor)(&candidate) {
                Ok(reader) => return Ok(SearchResult::Source(reader)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    not_found = Some((candidate, err));
                }
                Err(err) => return Err(Error::open_file(candidate, err)),
            }
        }

        let (candidate, err) = not_found.expect("import paths are not empty");
        Err(Error::open_file(candidate, err))
    }
}

impl fmt::Debug for SourceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceResolver")
            .field("import_paths", &self.import_paths)
            .finish_non_exhaustive()
    }
}

/// Returns an [`Accessor`] serving file contents from the given map. Keys are
/// the paths the accessor is queried with; absent keys report
/// [`io::ErrorKind::NotFound`].
pub fn source_accessor_from_map(
    sources: HashMap<String, String>,
) -> impl Fn(&Path) -> io::Result<Box<dyn Read + Send>> + Send + Sync + 'static {
    move |path: &Path| {
        let contents = path
            .to_str()
            .and_then(|path| sources.get(path))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("'{}' does not exist", path.display()),
                )
            })?;
        Ok(Box::new(io::Cursor::new(contents.clone().into_bytes())) as Box<dyn Read + Send>)
    }
}

/// A [`Resolver`] which falls back to the standard imports shipped with the
/// compiler, such as `google/protobuf/descriptor.proto`.
///
/// The wrapped resolver is always consulted first; the registry never
/// overrides its successful results.
#[derive(Debug)]
pub struct StandardImportsResolver<R> {
    inner: R,
}

impl<R> StandardImportsResolver<R> {
    /// Wraps a resolver with the standard-imports fallback.
    pub fn new(inner: R) -> Self {
        StandardImportsResolver { inner }
    }
}

impl<R> Resolver for StandardImportsResolver<R>
where
    R: Resolver,
{
    fn find_file_by_path(&self, path: &str) -> Result<SearchResult, Error> {
        match self.inner.find_file_by_path(path) {
            Ok(result) => Ok(result),
            Err(err) => match standard::standard_import(path) {
                Some(desc) => Ok(SearchResult::Desc(desc)),
                None => Err(err),
            },
        }
    }
}
