//! The abstract syntax tree for protobuf source files.
//!
//! Every node records the first and last terminal token it covers as
//! [`TokenId`] handles into the file's [`FileInfo`], so spans and attributed
//! comments can be recovered at any later stage.

mod file_info;

pub use self::file_info::{
    CommentId, CommentInfo, Comments, FileInfo, SourcePos, TokenId, TokenInfo,
};

use std::{fmt, sync::Arc};

/// A parsed protobuf source file, together with the position index built
/// while lexing it.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub(crate) info: Arc<FileInfo>,
    pub syntax: Syntax,
    /// Tokens of the `syntax = "..."` declaration, if present.
    pub syntax_span: Option<(TokenId, TokenId)>,
    pub package: Option<Package>,
    pub imports: Vec<Import>,
    pub options: Vec<OptionNode>,
    pub definitions: Vec<Definition>,
    /// The synthetic end-of-file token.
    pub eof: TokenId,
}

impl FileNode {
    /// Returns the position index for this file.
    pub fn file_info(&self) -> &Arc<FileInfo> {
        &self.info
    }

    /// Returns the logical path this file was parsed from.
    pub fn name(&self) -> &str {
        self.info.name()
    }

    /// The names of all files imported by this file, in declaration order.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().map(|import| import.value.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Syntax {
    Proto2,
    Proto3,
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Syntax::Proto2 => write!(f, "proto2"),
            Syntax::Proto3 => write!(f, "proto3"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Definition {
    Message(Message),
    Enum(Enum),
    Service(Service),
    Extension(Extension),
}

#[derive(Debug, Clone)]
pub struct Ident {
    pub value: String,
    pub token: TokenId,
}

#[derive(Debug, Clone)]
pub struct FullIdent {
    pub parts: Vec<Ident>,
}

impl fmt::Display for FullIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i != 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", part.value)?;
        }
        Ok(())
    }
}

impl From<Ident> for FullIdent {
    fn from(value: Ident) -> Self {
        FullIdent { parts: vec![value] }
    }
}

impl FullIdent {
    pub fn start(&self) -> TokenId {
        self.parts.first().expect("idents are never empty").token
    }

    pub fn end(&self) -> TokenId {
        self.parts.last().expect("idents are never empty").token
    }
}

/// A possibly fully-qualified type name, e.g. `.google.protobuf.Empty`.
#[derive(Debug, Clone)]
pub struct TypeName {
    pub leading_dot: Option<TokenId>,
    pub name: FullIdent,
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.leading_dot.is_some() {
            write!(f, ".")?;
        }
        write!(f, "{}", self.name)
    }
}

impl TypeName {
    pub fn start(&self) -> TokenId {
        self.leading_dot.unwrap_or_else(|| self.name.start())
    }

    pub fn end(&self) -> TokenId {
        self.name.end()
    }
}

#[derive(Debug, Clone)]
pub struct Int {
    pub negative: bool,
    pub value: u64,
    pub token: TokenId,
}

#[derive(Debug, Clone)]
pub struct Float {
    pub negative: bool,
    pub value: f64,
    pub token: TokenId,
}

#[derive(Debug, Clone)]
pub struct Bool {
    pub value: bool,
    pub token: TokenId,
}

/// A string literal. Values are byte strings; they are not required to be
/// valid utf-8 except where used as file paths or identifiers.
#[derive(Debug, Clone)]
pub struct Str {
    pub value: Vec<u8>,
    pub token: TokenId,
}

impl Str {
    pub fn as_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

#[derive(Debug, Clone)]
pub enum Constant {
    FullIdent(FullIdent),
    Int(Int),
    Float(Float),
    Bool(Bool),
    Str(Str),
}

#[derive(Debug, Clone)]
pub struct Import {
    pub kind: Option<ImportKind>,
    pub value: String,
    pub value_token: TokenId,
    pub start: TokenId,
    pub end: TokenId,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImportKind {
    Weak,
    Public,
}

#[derive(Debug, Clone)]
pub struct Package {
    pub name: FullIdent,
    pub start: TokenId,
    pub end: TokenId,
}

/// One part of an option name: either a plain field name or a parenthesized
/// extension name.
#[derive(Debug, Clone)]
pub enum OptionNamePart {
    Ident(Ident),
    Extension(TypeName),
}

#[derive(Debug, Clone)]
pub struct OptionNode {
    pub name: Vec<OptionNamePart>,
    pub value: Constant,
    pub start: TokenId,
    pub end: TokenId,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub name: Ident,
    pub body: MessageBody,
    pub start: TokenId,
    pub end: TokenId,
}

#[derive(Debug, Clone, Default)]
pub struct MessageBody {
    pub fields: Vec<Field>,
    pub map_fields: Vec<MapField>,
    pub oneofs: Vec<Oneof>,
    pub messages: Vec<Message>,
    pub enums: Vec<Enum>,
    pub extensions: Vec<Extension>,
    pub extension_ranges: Vec<ExtensionRange>,
    pub options: Vec<OptionNode>,
    pub reserved: Vec<Reserved>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub label: Option<(FieldLabel, TokenId)>,
    pub ty: Ty,
    pub name: Ident,
    pub number: Int,
    pub options: Vec<OptionNode>,
    pub start: TokenId,
    pub end: TokenId,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldLabel {
    Optional,
    Required,
    Repeated,
}

#[derive(Debug, Clone)]
pub enum Ty {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Named(TypeName),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyTy {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
}

#[derive(Debug, Clone)]
pub struct MapField {
    pub key_ty: KeyTy,
    pub ty: Ty,
    pub name: Ident,
    pub number: Int,
    pub options: Vec<OptionNode>,
    pub start: TokenId,
    pub end: TokenId,
}

#[derive(Debug, Clone)]
pub struct Oneof {
    pub name: Ident,
    pub options: Vec<OptionNode>,
    pub fields: Vec<Field>,
    pub start: TokenId,
    pub end: TokenId,
}

#[derive(Debug, Clone)]
pub struct Extension {
    pub extendee: TypeName,
    pub fields: Vec<Field>,
    pub start: TokenId,
    pub end: TokenId,
}

#[derive(Debug, Clone)]
pub enum Reserved {
    Ranges(Vec<ReservedRange>),
    Names(Vec<Ident>),
}

#[derive(Debug, Clone)]
pub struct ReservedRange {
    pub start: Int,
    pub end: RangeEnd,
}

#[derive(Debug, Clone)]
pub enum RangeEnd {
    /// A single number, e.g. `reserved 5;`.
    None,
    Int(Int),
    /// `to max`.
    Max(TokenId),
}

#[derive(Debug, Clone)]
pub struct ExtensionRange {
    pub ranges: Vec<ReservedRange>,
    pub options: Vec<OptionNode>,
}

#[derive(Debug, Clone)]
pub struct Enum {
    pub name: Ident,
    pub options: Vec<OptionNode>,
    pub values: Vec<EnumValue>,
    pub reserved: Vec<Reserved>,
    pub start: TokenId,
    pub end: TokenId,
}

#[derive(Debug, Clone)]
pub struct EnumValue {
    pub name: Ident,
    pub value: Int,
    pub options: Vec<OptionNode>,
    pub start: TokenId,
    pub end: TokenId,
}

#[derive(Debug, Clone)]
pub struct Service {
    pub name: Ident,
    pub options: Vec<OptionNode>,
    pub methods: Vec<Method>,
    pub start: TokenId,
    pub end: TokenId,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub name: Ident,
    pub input_ty: TypeName,
    pub output_ty: TypeName,
    pub options: Vec<OptionNode>,
    pub is_client_streaming: bool,
    pub is_server_streaming: bool,
    pub start: TokenId,
    pub end: TokenId,
}
