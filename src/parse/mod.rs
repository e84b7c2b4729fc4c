//! Parsing of protobuf source files.
//!
//! [`parse()`] turns source text into a [`FileNode`], building the file's
//! [`FileInfo`](crate::ast::FileInfo) as a side effect: every terminal and
//! comment token is recorded in source order, and comments are attributed to
//! the token they describe (same line as the previous token's end makes a
//! trailing comment, anything else leads the next token).

mod lex;
#[cfg(test)]
mod tests;

use std::{fmt, ops::ControlFlow, ops::Range, sync::Arc};

use logos::{Lexer, Logos, Span};
use miette::NamedSource;
use thiserror::Error;

use self::lex::Token;
use crate::{
    ast::{self, FileInfo, FileNode, SourcePos, TokenId},
    reporter::{Diagnostic, Handler, Level},
    MAX_FILE_LEN,
};

/// An error that may occur while parsing a protobuf source file.
///
/// Carries every diagnostic the [`Handler`] gathered for the file.
#[derive(Debug, Error, miette::Diagnostic)]
#[error("{}", primary)]
#[diagnostic(forward(primary))]
pub struct ParseError {
    primary: Diagnostic,
    #[related]
    related: Vec<Diagnostic>,
    #[source_code]
    source_code: NamedSource,
}

impl ParseError {
    pub(crate) fn new(name: &str, source: &str, diagnostics: Vec<Diagnostic>) -> Self {
        // Warnings stay with the reporter; the error itself carries only
        // what made the file fail.
        let mut diagnostics: Vec<Diagnostic> = diagnostics
            .into_iter()
            .filter(|diagnostic| diagnostic.level() == Level::Error)
            .collect();
        debug_assert!(!diagnostics.is_empty());
        let primary = diagnostics.remove(0);
        ParseError {
            primary,
            related: diagnostics,
            source_code: NamedSource::new(name, source.to_owned()),
        }
    }

    /// The position of the first diagnostic, if it is known.
    pub fn position(&self) -> Option<&SourcePos> {
        self.primary.pos()
    }

    /// Every diagnostic gathered for the file, the primary one first.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        std::iter::once(&self.primary).chain(self.related.iter())
    }
}

/// Parses a single protobuf source file.
///
/// Syntax problems are reported through `handler`; unless the handler's
/// reporter aborts early, parsing recovers at statement boundaries so
/// several diagnostics can be gathered in one pass. If any error was
/// reported the collected diagnostics are returned as a [`ParseError`].
pub fn parse(name: &str, source: &str, handler: &Handler) -> Result<FileNode, ParseError> {
    if source.len() > MAX_FILE_LEN {
        let _ = handler.error(None, None, "file is too large");
        return Err(ParseError::new(name, source, handler.take_diagnostics()));
    }

    let mut parser = Parser::new(name, source, handler);
    let file = parser.parse_file();

    if handler.has_errors() {
        Err(ParseError::new(name, source, handler.take_diagnostics()))
    } else {
        Ok(file)
    }
}

struct Parser<'a> {
    lexer: Lexer<'a, Token<'a>>,
    peeked: Option<(Token<'a>, Span)>,
    info: FileInfo,
    handler: &'a Handler,
    pending_comments: Vec<TokenId>,
    last_terminal: Option<(TokenId, usize)>,
    aborted: bool,
}

impl<'a> Parser<'a> {
    fn new(name: &str, source: &'a str, handler: &'a Handler) -> Self {
        let mut info = FileInfo::new(name, source);
        for (offset, _) in source.match_indices('\n') {
            info.add_line(offset + 1);
        }

        Parser {
            lexer: Token::lexer(source),
            peeked: None,
            info,
            handler,
            pending_comments: Vec::new(),
            last_terminal: None,
            aborted: false,
        }
    }

    fn parse_file(&mut self) -> FileNode {
        let mut syntax = ast::Syntax::Proto2;
        let mut syntax_span = None;
        let mut package: Option<ast::Package> = None;
        let mut imports = Vec::new();
        let mut options = Vec::new();
        let mut definitions = Vec::new();

        if let Ok(Some((token, _))) = self.peek() {
            if token == Token::SYNTAX {
                match self.parse_syntax() {
                    Ok((parsed, span)) => {
                        syntax = parsed;
                        syntax_span = Some(span);
                    }
                    Err(()) => self.recover(),
                }
            }
        }
        if syntax_span.is_none() && !self.aborted {
            self.handler.warning(
                Some(self.info.position(0)),
                None,
                "no syntax specified; defaulting to 'proto2' syntax",
            );
        }

        loop {
            let next = match self.peek() {
                Ok(next) => next,
                Err(()) => break,
            };

            let result = match next {
                None => break,
                Some((token, _)) => {
                    if token == Token::Semicolon {
                        self.bump();
                        continue;
                    } else if token == Token::PACKAGE {
                        self.parse_package().map(|parsed| {
                            if package.is_none() {
                                package = Some(parsed);
                            } else {
                                let span = self.span_of(parsed.start, parsed.end);
                                let _ = self.error_at(span, "multiple package names specified");
                            }
                        })
                    } else if token == Token::IMPORT {
                        self.parse_import().map(|import| imports.push(import))
                    } else if token == Token::OPTION {
                        self.parse_option_statement()
                            .map(|option| options.push(option))
                    } else if token == Token::MESSAGE {
                        self.parse_message()
                            .map(|message| definitions.push(ast::Definition::Message(message)))
                    } else if token == Token::ENUM {
                        self.parse_enum()
                            .map(|value| definitions.push(ast::Definition::Enum(value)))
                    } else if token == Token::SERVICE {
                        self.parse_service()
                            .map(|service| definitions.push(ast::Definition::Service(service)))
                    } else if token == Token::EXTEND {
                        self.parse_extend()
                            .map(|ext| definitions.push(ast::Definition::Extension(ext)))
                    } else {
                        self.unexpected_token(
                            "'package', 'import', 'option', 'message', 'enum', 'service' or 'extend'",
                        )
                    }
                }
            };

            if result.is_err() {
                if self.aborted {
                    break;
                }
                self.recover();
                if self.aborted {
                    break;
                }
            }
        }

        let eof = self
            .info
            .add_token(self.lexer.source().len(), 0);
        for comment in std::mem::take(&mut self.pending_comments) {
            self.info.add_comment(comment, eof);
        }

        FileNode {
            info: Arc::new(std::mem::replace(
                &mut self.info,
                FileInfo::new("", ""),
            )),
            syntax,
            syntax_span,
            package,
            imports,
            options,
            definitions,
            eof,
        }
    }

    fn parse_syntax(&mut self) -> Result<(ast::Syntax, (TokenId, TokenId)), ()> {
        let start = self.expect_eq(Token::SYNTAX, "'syntax'")?;
        self.expect_eq(Token::Equals, "'='")?;

        let value = self.expect_string()?;
        let syntax = match value.value.as_slice() {
            b"proto2" => ast::Syntax::Proto2,
            b"proto3" => ast::Syntax::Proto3,
            _ => {
                let span = self.token_span(value.token);
                let _ = self.error_at(
                    span,
                    "unknown syntax; possible values are 'proto2' and 'proto3'",
                );
                return Err(());
            }
        };

        let end = self.expect_eq(Token::Semicolon, "';'")?;
        Ok((syntax, (start, end)))
    }

    fn parse_package(&mut self) -> Result<ast::Package, ()> {
        let start = self.expect_eq(Token::PACKAGE, "'package'")?;
        let name = self.parse_full_ident()?;
        let end = self.expect_eq(Token::Semicolon, "';'")?;
        Ok(ast::Package { name, start, end })
    }

    fn parse_import(&mut self) -> Result<ast::Import, ()> {
        let start = self.expect_eq(Token::IMPORT, "'import'")?;

        let kind = match self.peek()? {
            Some((token, _)) if token == Token::WEAK => {
                self.bump();
                Some(ast::ImportKind::Weak)
            }
            Some((token, _)) if token == Token::PUBLIC => {
                self.bump();
                Some(ast::ImportKind::Public)
            }
            _ => None,
        };

        let value = self.expect_string()?;
        let path = match value.as_utf8() {
            Some(path) if !path.is_empty() && !path.contains('\\') => path.to_owned(),
            _ => {
                let span = self.token_span(value.token);
                let _ = self.error_at(span, "invalid import path");
                return Err(());
            }
        };

        let end = self.expect_eq(Token::Semicolon, "';'")?;
        Ok(ast::Import {
            kind,
            value: path,
            value_token: value.token,
            start,
            end,
        })
    }

    fn parse_option_statement(&mut self) -> Result<ast::OptionNode, ()> {
        let start = self.expect_eq(Token::OPTION, "'option'")?;
        let name = self.parse_option_name()?;
        self.expect_eq(Token::Equals, "'='")?;
        let value = self.parse_constant()?;
        let end = self.expect_eq(Token::Semicolon, "';'")?;
        Ok(ast::OptionNode {
            name,
            value,
            start,
            end,
        })
    }

    fn parse_option_name(&mut self) -> Result<Vec<ast::OptionNamePart>, ()> {
        let mut parts = vec![self.parse_option_name_part()?];
        while self.bump_if_eq(Token::Dot)? {
            parts.push(self.parse_option_name_part()?);
        }
        Ok(parts)
    }

    fn parse_option_name_part(&mut self) -> Result<ast::OptionNamePart, ()> {
        match self.peek()? {
            Some((Token::LeftParen, _)) => {
                self.bump();
                let type_name = self.parse_type_name()?;
                self.expect_eq(Token::RightParen, "')'")?;
                Ok(ast::OptionNamePart::Extension(type_name))
            }
            Some((Token::Ident(_), _)) => Ok(ast::OptionNamePart::Ident(self.expect_ident()?)),
            _ => self.unexpected_token("an identifier or '('"),
        }
    }

    fn parse_constant(&mut self) -> Result<ast::Constant, ()> {
        match self.peek()? {
            Some((Token::Minus, _)) => {
                self.bump();
                match self.peek()? {
                    Some((Token::IntLiteral(value), _)) => {
                        let (.., token) = self.bump();
                        Ok(ast::Constant::Int(ast::Int {
                            negative: true,
                            value,
                            token,
                        }))
                    }
                    Some((Token::FloatLiteral(value), _)) => {
                        let (.., token) = self.bump();
                        Ok(ast::Constant::Float(ast::Float {
                            negative: true,
                            value,
                            token,
                        }))
                    }
                    _ => self.unexpected_token("a numeric literal"),
                }
            }
            Some((Token::IntLiteral(value), _)) => {
                let (.., token) = self.bump();
                Ok(ast::Constant::Int(ast::Int {
                    negative: false,
                    value,
                    token,
                }))
            }
            Some((Token::FloatLiteral(value), _)) => {
                let (.., token) = self.bump();
                Ok(ast::Constant::Float(ast::Float {
                    negative: false,
                    value,
                    token,
                }))
            }
            Some((Token::StringLiteral(_), _)) => Ok(ast::Constant::Str(self.expect_string()?)),
            Some((Token::Ident(_), _)) => {
                let ident = self.parse_full_ident()?;
                if ident.parts.len() == 1 {
                    let value = match ident.parts[0].value.as_str() {
                        "true" => Some(true),
                        "false" => Some(false),
                        _ => None,
                    };
                    if let Some(value) = value {
                        return Ok(ast::Constant::Bool(ast::Bool {
                            value,
                            token: ident.parts[0].token,
                        }));
                    }
                }
                Ok(ast::Constant::FullIdent(ident))
            }
            _ => self.unexpected_token("a constant"),
        }
    }

    fn parse_message(&mut self) -> Result<ast::Message, ()> {
        let start = self.expect_eq(Token::MESSAGE, "'message'")?;
        let name = self.expect_ident()?;
        self.expect_eq(Token::LeftBrace, "'{'")?;
        let mut body = ast::MessageBody::default();
        let end = self.parse_message_body(&mut body)?;
        Ok(ast::Message {
            name,
            body,
            start,
            end,
        })
    }

    /// Parses the contents of a message body up to and including the closing
    /// brace, whose token is returned.
    fn parse_message_body(&mut self, body: &mut ast::MessageBody) -> Result<TokenId, ()> {
        loop {
            let next = match self.peek()? {
                Some(next) => next,
                None => return self.unexpected_token("a message item or '}'"),
            };

            let result = match &next.0 {
                Token::RightBrace => return Ok(self.bump().2),
                Token::Semicolon => {
                    self.bump();
                    continue;
                }
                token if *token == Token::MESSAGE => self
                    .parse_message()
                    .map(|message| body.messages.push(message)),
                token if *token == Token::ENUM => {
                    self.parse_enum().map(|value| body.enums.push(value))
                }
                token if *token == Token::EXTEND => self
                    .parse_extend()
                    .map(|ext| body.extensions.push(ext)),
                token if *token == Token::ONEOF => {
                    self.parse_oneof().map(|oneof| body.oneofs.push(oneof))
                }
                token if *token == Token::OPTION => self
                    .parse_option_statement()
                    .map(|option| body.options.push(option)),
                token if *token == Token::RESERVED => self
                    .parse_reserved()
                    .map(|reserved| body.reserved.push(reserved)),
                token if *token == Token::EXTENSIONS => self
                    .parse_extension_range()
                    .map(|range| body.extension_ranges.push(range)),
                token if *token == Token::MAP => self
                    .parse_map_field()
                    .map(|field| body.map_fields.push(field)),
                Token::Ident(_) | Token::Dot => {
                    self.parse_field().map(|field| body.fields.push(field))
                }
                _ => self.unexpected_token("a message item or '}'"),
            };

            result?;
        }
    }

    /// Parses a normal field, with an optional label in front.
    fn parse_field(&mut self) -> Result<ast::Field, ()> {
        let label = match self.peek()? {
            Some((token, _)) if token == Token::OPTIONAL => {
                Some((ast::FieldLabel::Optional, self.bump().2))
            }
            Some((token, _)) if token == Token::REQUIRED => {
                Some((ast::FieldLabel::Required, self.bump().2))
            }
            Some((token, _)) if token == Token::REPEATED => {
                Some((ast::FieldLabel::Repeated, self.bump().2))
            }
            _ => None,
        };

        let (ty, ty_start) = self.parse_field_ty()?;
        let start = label.map(|(_, token)| token).unwrap_or(ty_start);

        let name = self.expect_ident()?;
        self.expect_eq(Token::Equals, "'='")?;
        let number = self.parse_int(false)?;
        let options = self.parse_field_options()?;
        let end = self.expect_eq(Token::Semicolon, "';'")?;

        Ok(ast::Field {
            label,
            ty,
            name,
            number,
            options,
            start,
            end,
        })
    }

    fn parse_field_ty(&mut self) -> Result<(ast::Ty, TokenId), ()> {
        if let Some((Token::Ident(name), _)) = self.peek()? {
            let scalar = match name {
                "double" => Some(ast::Ty::Double),
                "float" => Some(ast::Ty::Float),
                "int32" => Some(ast::Ty::Int32),
                "int64" => Some(ast::Ty::Int64),
                "uint32" => Some(ast::Ty::Uint32),
                "uint64" => Some(ast::Ty::Uint64),
                "sint32" => Some(ast::Ty::Sint32),
                "sint64" => Some(ast::Ty::Sint64),
                "fixed32" => Some(ast::Ty::Fixed32),
                "fixed64" => Some(ast::Ty::Fixed64),
                "sfixed32" => Some(ast::Ty::Sfixed32),
                "sfixed64" => Some(ast::Ty::Sfixed64),
                "bool" => Some(ast::Ty::Bool),
                "string" => Some(ast::Ty::String),
                "bytes" => Some(ast::Ty::Bytes),
                "group" => {
                    let (_, span, _) = self.bump();
                    let _ = self.error_at(span, "group fields are not supported");
                    return Err(());
                }
                _ => None,
            };
            if let Some(scalar) = scalar {
                let (.., token) = self.bump();
                return Ok((scalar, token));
            }
        }

        let name = self.parse_type_name()?;
        let start = name.start();
        Ok((ast::Ty::Named(name), start))
    }

    fn parse_type_name(&mut self) -> Result<ast::TypeName, ()> {
        let leading_dot = match self.peek()? {
            Some((Token::Dot, _)) => Some(self.bump().2),
            _ => None,
        };
        let name = self.parse_full_ident()?;
        Ok(ast::TypeName { leading_dot, name })
    }

    fn parse_full_ident(&mut self) -> Result<ast::FullIdent, ()> {
        let mut parts = vec![self.expect_ident()?];
        while self.bump_if_eq(Token::Dot)? {
            parts.push(self.expect_ident()?);
        }
        Ok(ast::FullIdent { parts })
    }

    fn parse_map_field(&mut self) -> Result<ast::MapField, ()> {
        let start = self.expect_eq(Token::MAP, "'map'")?;
        self.expect_eq(Token::LeftAngleBracket, "'<'")?;

        let key_ty = match self.peek()? {
            Some((Token::Ident(name), span)) => {
                let key_ty = match name {
                    "int32" => Some(ast::KeyTy::Int32),
                    "int64" => Some(ast::KeyTy::Int64),
                    "uint32" => Some(ast::KeyTy::Uint32),
                    "uint64" => Some(ast::KeyTy::Uint64),
                    "sint32" => Some(ast::KeyTy::Sint32),
                    "sint64" => Some(ast::KeyTy::Sint64),
                    "fixed32" => Some(ast::KeyTy::Fixed32),
                    "fixed64" => Some(ast::KeyTy::Fixed64),
                    "sfixed32" => Some(ast::KeyTy::Sfixed32),
                    "sfixed64" => Some(ast::KeyTy::Sfixed64),
                    "bool" => Some(ast::KeyTy::Bool),
                    "string" => Some(ast::KeyTy::String),
                    _ => None,
                };
                match key_ty {
                    Some(key_ty) => {
                        self.bump();
                        key_ty
                    }
                    None => {
                        let _ = self.error_at(
                            span,
                            "a map key type must be an integer, boolean or string",
                        );
                        return Err(());
                    }
                }
            }
            _ => return self.unexpected_token("a map key type"),
        };

        self.expect_eq(Token::Comma, "','")?;
        let (ty, _) = self.parse_field_ty()?;
        self.expect_eq(Token::RightAngleBracket, "'>'")?;

        let name = self.expect_ident()?;
        self.expect_eq(Token::Equals, "'='")?;
        let number = self.parse_int(false)?;
        let options = self.parse_field_options()?;
        let end = self.expect_eq(Token::Semicolon, "';'")?;

        Ok(ast::MapField {
            key_ty,
            ty,
            name,
            number,
            options,
            start,
            end,
        })
    }

    fn parse_field_options(&mut self) -> Result<Vec<ast::OptionNode>, ()> {
        if !self.bump_if_eq(Token::LeftBracket)? {
            return Ok(Vec::new());
        }

        let mut options = Vec::new();
        loop {
            let name = self.parse_option_name()?;
            let start = match &name[0] {
                ast::OptionNamePart::Ident(ident) => ident.token,
                ast::OptionNamePart::Extension(ty) => ty.start(),
            };
            self.expect_eq(Token::Equals, "'='")?;
            let value = self.parse_constant()?;
            let end = constant_end(&value);
            options.push(ast::OptionNode {
                name,
                value,
                start,
                end,
            });

            if !self.bump_if_eq(Token::Comma)? {
                break;
            }
        }
        self.expect_eq(Token::RightBracket, "']'")?;
        Ok(options)
    }

    fn parse_oneof(&mut self) -> Result<ast::Oneof, ()> {
        let start = self.expect_eq(Token::ONEOF, "'oneof'")?;
        let name = self.expect_ident()?;
        self.expect_eq(Token::LeftBrace, "'{'")?;

        let mut options = Vec::new();
        let mut fields = Vec::new();
        let end = loop {
            match self.peek()? {
                Some((Token::RightBrace, _)) => break self.bump().2,
                Some((Token::Semicolon, _)) => {
                    self.bump();
                }
                Some((token, _)) if token == Token::OPTION => {
                    options.push(self.parse_option_statement()?);
                }
                Some((Token::Ident(_) | Token::Dot, _)) => {
                    fields.push(self.parse_field()?);
                }
                _ => return self.unexpected_token("a field, 'option', ';' or '}'"),
            }
        };

        Ok(ast::Oneof {
            name,
            options,
            fields,
            start,
            end,
        })
    }

    fn parse_extend(&mut self) -> Result<ast::Extension, ()> {
        let start = self.expect_eq(Token::EXTEND, "'extend'")?;
        let extendee = self.parse_type_name()?;
        self.expect_eq(Token::LeftBrace, "'{'")?;

        let mut fields = Vec::new();
        let end = loop {
            match self.peek()? {
                Some((Token::RightBrace, _)) => break self.bump().2,
                Some((Token::Semicolon, _)) => {
                    self.bump();
                }
                Some((Token::Ident(_) | Token::Dot, _)) => {
                    fields.push(self.parse_field()?);
                }
                _ => return self.unexpected_token("a field, ';' or '}'"),
            }
        };

        Ok(ast::Extension {
            extendee,
            fields,
            start,
            end,
        })
    }

    fn parse_reserved(&mut self) -> Result<ast::Reserved, ()> {
        self.expect_eq(Token::RESERVED, "'reserved'")?;

        match self.peek()? {
            Some((Token::IntLiteral(_) | Token::Minus, _)) => {
                let ranges = self.parse_reserved_ranges()?;
                self.expect_eq(Token::Semicolon, "';'")?;
                Ok(ast::Reserved::Ranges(ranges))
            }
            Some((Token::StringLiteral(_), _)) => {
                let mut names = Vec::new();
                loop {
                    let value = self.expect_string()?;
                    match value.as_utf8() {
                        Some(name) => names.push(ast::Ident {
                            value: name.to_owned(),
                            token: value.token,
                        }),
                        None => {
                            let span = self.token_span(value.token);
                            let _ = self.error_at(span, "reserved name is not valid utf-8");
                            return Err(());
                        }
                    }
                    if !self.bump_if_eq(Token::Comma)? {
                        break;
                    }
                }
                self.expect_eq(Token::Semicolon, "';'")?;
                Ok(ast::Reserved::Names(names))
            }
            _ => self.unexpected_token("a number range or string"),
        }
    }

    fn parse_reserved_ranges(&mut self) -> Result<Vec<ast::ReservedRange>, ()> {
        let mut ranges = Vec::new();
        loop {
            let start = self.parse_int(true)?;
            let end = if self.bump_if_eq(Token::TO)? {
                match self.peek()? {
                    Some((token, _)) if token == Token::MAX => ast::RangeEnd::Max(self.bump().2),
                    Some((Token::IntLiteral(_) | Token::Minus, _)) => {
                        ast::RangeEnd::Int(self.parse_int(true)?)
                    }
                    _ => return self.unexpected_token("an integer or 'max'"),
                }
            } else {
                ast::RangeEnd::None
            };
            ranges.push(ast::ReservedRange { start, end });

            if !self.bump_if_eq(Token::Comma)? {
                break;
            }
        }
        Ok(ranges)
    }

    fn parse_extension_range(&mut self) -> Result<ast::ExtensionRange, ()> {
        self.expect_eq(Token::EXTENSIONS, "'extensions'")?;
        let ranges = self.parse_reserved_ranges()?;
        let options = self.parse_field_options()?;
        self.expect_eq(Token::Semicolon, "';'")?;
        Ok(ast::ExtensionRange { ranges, options })
    }

    fn parse_enum(&mut self) -> Result<ast::Enum, ()> {
        let start = self.expect_eq(Token::ENUM, "'enum'")?;
        let name = self.expect_ident()?;
        self.expect_eq(Token::LeftBrace, "'{'")?;

        let mut options = Vec::new();
        let mut values = Vec::new();
        let mut reserved = Vec::new();
        let end = loop {
            match self.peek()? {
                Some((Token::RightBrace, _)) => break self.bump().2,
                Some((Token::Semicolon, _)) => {
                    self.bump();
                }
                Some((token, _)) if token == Token::OPTION => {
                    options.push(self.parse_option_statement()?);
                }
                Some((token, _)) if token == Token::RESERVED => {
                    reserved.push(self.parse_reserved()?);
                }
                Some((Token::Ident(_), _)) => {
                    values.push(self.parse_enum_value()?);
                }
                _ => return self.unexpected_token("an enum value, 'option', ';' or '}'"),
            }
        };

        Ok(ast::Enum {
            name,
            options,
            values,
            reserved,
            start,
            end,
        })
    }

    fn parse_enum_value(&mut self) -> Result<ast::EnumValue, ()> {
        let name = self.expect_ident()?;
        let start = name.token;
        self.expect_eq(Token::Equals, "'='")?;
        let value = self.parse_int(true)?;
        let options = self.parse_field_options()?;
        let end = self.expect_eq(Token::Semicolon, "';'")?;
        Ok(ast::EnumValue {
            name,
            value,
            options,
            start,
            end,
        })
    }

    fn parse_service(&mut self) -> Result<ast::Service, ()> {
        let start = self.expect_eq(Token::SERVICE, "'service'")?;
        let name = self.expect_ident()?;
        self.expect_eq(Token::LeftBrace, "'{'")?;

        let mut options = Vec::new();
        let mut methods = Vec::new();
        let end = loop {
            match self.peek()? {
                Some((Token::RightBrace, _)) => break self.bump().2,
                Some((Token::Semicolon, _)) => {
                    self.bump();
                }
                Some((token, _)) if token == Token::OPTION => {
                    options.push(self.parse_option_statement()?);
                }
                Some((token, _)) if token == Token::RPC => {
                    methods.push(self.parse_method()?);
                }
                _ => return self.unexpected_token("'rpc', 'option', ';' or '}'"),
            }
        };

        Ok(ast::Service {
            name,
            options,
            methods,
            start,
            end,
        })
    }

    fn parse_method(&mut self) -> Result<ast::Method, ()> {
        let start = self.expect_eq(Token::RPC, "'rpc'")?;
        let name = self.expect_ident()?;

        self.expect_eq(Token::LeftParen, "'('")?;
        let is_client_streaming = self.bump_if_stream()?;
        let input_ty = self.parse_type_name()?;
        self.expect_eq(Token::RightParen, "')'")?;

        self.expect_eq(Token::RETURNS, "'returns'")?;
        self.expect_eq(Token::LeftParen, "'('")?;
        let is_server_streaming = self.bump_if_stream()?;
        let output_ty = self.parse_type_name()?;
        self.expect_eq(Token::RightParen, "')'")?;

        let mut options = Vec::new();
        let end = match self.peek()? {
            Some((Token::Semicolon, _)) => self.bump().2,
            Some((Token::LeftBrace, _)) => {
                self.bump();
                loop {
                    match self.peek()? {
                        Some((Token::RightBrace, _)) => break self.bump().2,
                        Some((Token::Semicolon, _)) => {
                            self.bump();
                        }
                        Some((token, _)) if token == Token::OPTION => {
                            options.push(self.parse_option_statement()?);
                        }
                        _ => return self.unexpected_token("'option', ';' or '}'"),
                    }
                }
            }
            _ => return self.unexpected_token("';' or '{'"),
        };

        Ok(ast::Method {
            name,
            input_ty,
            output_ty,
            options,
            is_client_streaming,
            is_server_streaming,
            start,
            end,
        })
    }

    fn bump_if_stream(&mut self) -> Result<bool, ()> {
        match self.peek()? {
            Some((token, _)) if token == Token::STREAM => {
                self.bump();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn parse_int(&mut self, allow_negative: bool) -> Result<ast::Int, ()> {
        let negative = match self.peek()? {
            Some((Token::Minus, span)) => {
                self.bump();
                if !allow_negative {
                    let _ = self.error_at(span, "a negative number is not allowed here");
                    return Err(());
                }
                true
            }
            _ => false,
        };

        match self.peek()? {
            Some((Token::IntLiteral(value), _)) => {
                let (.., token) = self.bump();
                Ok(ast::Int {
                    negative,
                    value,
                    token,
                })
            }
            _ => self.unexpected_token("an integer"),
        }
    }

    fn expect_ident(&mut self) -> Result<ast::Ident, ()> {
        match self.peek()? {
            Some((Token::Ident(value), _)) => {
                let value = value.to_owned();
                let (.., token) = self.bump();
                Ok(ast::Ident { value, token })
            }
            _ => self.unexpected_token("an identifier"),
        }
    }

    fn expect_string(&mut self) -> Result<ast::Str, ()> {
        match self.peek()? {
            Some((Token::StringLiteral(value), _)) => {
                let (.., token) = self.bump();
                Ok(ast::Str { value, token })
            }
            _ => self.unexpected_token("a string literal"),
        }
    }

    fn expect_eq(&mut self, expected: Token, description: &str) -> Result<TokenId, ()> {
        match self.peek()? {
            Some((token, _)) if token == expected => Ok(self.bump().2),
            _ => self.unexpected_token(description),
        }
    }

    fn bump_if_eq(&mut self, expected: Token) -> Result<bool, ()> {
        match self.peek()? {
            Some((token, _)) if token == expected => {
                self.bump();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Returns a clone of the next terminal token without consuming it,
    /// recording any comments encountered on the way.
    fn peek(&mut self) -> Result<Option<(Token<'a>, Span)>, ()> {
        while self.peeked.is_none() {
            let token = match self.lexer.next() {
                Some(token) => token,
                None => break,
            };
            let span = self.lexer.span();
            self.drain_lex_errors()?;

            if token.is_comment() {
                self.record_comment(span);
            } else if token == Token::Error {
                self.error_at(span, "invalid token")?;
            } else {
                self.peeked = Some((token, span));
            }
        }

        Ok(self.peeked.clone())
    }

    /// Consumes the peeked token, committing it to the file's position index
    /// and attributing any pending leading comments to it.
    fn bump(&mut self) -> (Token<'a>, Span, TokenId) {
        let (token, span) = self
            .peeked
            .take()
            .expect("called bump without peeking a token");

        let id = self.info.add_token(span.start, span.end - span.start);
        for comment in std::mem::take(&mut self.pending_comments) {
            self.info.add_comment(comment, id);
        }
        let end_line = self.info.position(span.end.saturating_sub(1)).line;
        self.last_terminal = Some((id, end_line));

        (token, span, id)
    }

    fn record_comment(&mut self, span: Span) {
        let id = self.info.add_token(span.start, span.end - span.start);

        let line = self.info.position(span.start).line;
        match self.last_terminal {
            // A comment starting on the line the previous token ends on
            // trails that token; everything else leads the next one.
            Some((terminal, last_line)) if last_line == line && self.pending_comments.is_empty() => {
                self.info.add_comment(id, terminal);
            }
            _ => self.pending_comments.push(id),
        }
    }

    fn drain_lex_errors(&mut self) -> Result<(), ()> {
        let errors = std::mem::take(&mut self.lexer.extras.errors);
        for error in errors {
            self.error_at(error.span, error.message)?;
        }
        Ok(())
    }

    fn error_at(&mut self, span: Range<usize>, message: impl Into<String>) -> Result<(), ()> {
        let pos = self.info.position(span.start);
        match self.handler.error(Some(pos), Some(span), message) {
            ControlFlow::Continue(()) => Ok(()),
            ControlFlow::Break(()) => {
                self.aborted = true;
                Err(())
            }
        }
    }

    fn unexpected_token<T>(&mut self, expected: impl fmt::Display) -> Result<T, ()> {
        match self.peek()? {
            Some((found, span)) => {
                let message = format!("expected {}, but found '{}'", expected, found);
                let _ = self.error_at(span, message);
            }
            None => {
                let len = self.lexer.source().len();
                let message = format!("expected {}, but reached end of file", expected);
                let _ = self.error_at(len..len, message);
            }
        }
        Err(())
    }

    /// Skips ahead to the end of the current top-level statement so parsing
    /// can continue after an error.
    fn recover(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Err(()) => return,
                Ok(None) => return,
                Ok(Some((Token::Semicolon, _))) if depth == 0 => {
                    self.bump();
                    return;
                }
                Ok(Some((Token::LeftBrace, _))) => {
                    depth += 1;
                    self.bump();
                }
                Ok(Some((Token::RightBrace, _))) => {
                    depth = depth.saturating_sub(1);
                    self.bump();
                    if depth == 0 {
                        return;
                    }
                }
                Ok(Some(_)) => {
                    self.bump();
                }
            }
        }
    }

    fn token_span(&self, token: TokenId) -> Range<usize> {
        let info = self.info.token(token);
        info.start().offset..info.end().offset + 1
    }

    fn span_of(&self, start: TokenId, end: TokenId) -> Range<usize> {
        self.info.token(start).start().offset..self.info.token(end).end().offset + 1
    }
}

fn constant_end(value: &ast::Constant) -> TokenId {
    match value {
        ast::Constant::FullIdent(ident) => ident.end(),
        ast::Constant::Int(int) => int.token,
        ast::Constant::Float(float) => float.token,
        ast::Constant::Bool(value) => value.token,
        ast::Constant::Str(value) => value.token,
    }
}
