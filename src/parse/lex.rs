use std::{fmt, num::IntErrorKind, ops::Range};

use logos::{skip, Lexer, Logos};

#[derive(Debug, Clone, Logos, PartialEq)]
#[logos(extras = TokenExtras)]
#[logos(subpattern exponent = r"[eE][+\-]?[0-9]+")]
pub(crate) enum Token<'a> {
    #[regex("[A-Za-z_][A-Za-z0-9_]*")]
    Ident(&'a str),
    #[regex("0", |_| 0)]
    #[regex("0[0-7]+", |lex| int(lex, 8, 1))]
    #[regex("[1-9][0-9]*", |lex| int(lex, 10, 0))]
    #[regex("0[xX][0-9A-Fa-f]+", |lex| int(lex, 16, 2))]
    IntLiteral(u64),
    #[regex(r#"[0-9]+\.[0-9]*(?&exponent)?"#, float)]
    #[regex(r#"[0-9]+(?&exponent)"#, float)]
    #[regex(r#"\.[0-9]+(?&exponent)?"#, float)]
    FloatLiteral(f64),
    #[regex(r#"'|""#, string)]
    StringLiteral(Vec<u8>),
    #[token(".")]
    Dot,
    #[token("-")]
    Minus,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token("<")]
    LeftAngleBracket,
    #[token(">")]
    RightAngleBracket,
    #[token(",")]
    Comma,
    #[token("=")]
    Equals,
    #[token(";")]
    Semicolon,
    #[regex(r"//[^\n]*\n?")]
    LineComment,
    #[token("/*", block_comment)]
    BlockComment,
    #[error]
    #[regex(r"[\t\v\f\r\n ]+", skip)]
    Error,
}

impl<'a> Token<'a> {
    pub const SYNTAX: Token<'static> = Token::Ident("syntax");
    pub const PACKAGE: Token<'static> = Token::Ident("package");
    pub const IMPORT: Token<'static> = Token::Ident("import");
    pub const WEAK: Token<'static> = Token::Ident("weak");
    pub const PUBLIC: Token<'static> = Token::Ident("public");
    pub const ENUM: Token<'static> = Token::Ident("enum");
    pub const OPTION: Token<'static> = Token::Ident("option");
    pub const SERVICE: Token<'static> = Token::Ident("service");
    pub const RPC: Token<'static> = Token::Ident("rpc");
    pub const STREAM: Token<'static> = Token::Ident("stream");
    pub const RETURNS: Token<'static> = Token::Ident("returns");
    pub const EXTEND: Token<'static> = Token::Ident("extend");
    pub const MESSAGE: Token<'static> = Token::Ident("message");
    pub const OPTIONAL: Token<'static> = Token::Ident("optional");
    pub const REQUIRED: Token<'static> = Token::Ident("required");
    pub const REPEATED: Token<'static> = Token::Ident("repeated");
    pub const MAP: Token<'static> = Token::Ident("map");
    pub const ONEOF: Token<'static> = Token::Ident("oneof");
    pub const RESERVED: Token<'static> = Token::Ident("reserved");
    pub const EXTENSIONS: Token<'static> = Token::Ident("extensions");
    pub const TO: Token<'static> = Token::Ident("to");
    pub const MAX: Token<'static> = Token::Ident("max");

    pub fn is_comment(&self) -> bool {
        matches!(self, Token::LineComment | Token::BlockComment)
    }
}

impl<'a> fmt::Display for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(value) => write!(f, "{}", value),
            Token::IntLiteral(value) => write!(f, "{}", value),
            Token::FloatLiteral(value) => {
                if value.fract() == 0.0 {
                    write!(f, "{:.1}", value)
                } else {
                    write!(f, "{}", value)
                }
            }
            Token::StringLiteral(bytes) => {
                write!(f, "\"")?;
                for &ch in bytes.iter() {
                    write!(f, "{}", std::ascii::escape_default(ch))?;
                }
                write!(f, "\"")
            }
            Token::Dot => write!(f, "."),
            Token::Minus => write!(f, "-"),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::LeftBrace => write!(f, "{{"),
            Token::RightBrace => write!(f, "}}"),
            Token::LeftBracket => write!(f, "["),
            Token::RightBracket => write!(f, "]"),
            Token::LeftAngleBracket => write!(f, "<"),
            Token::RightAngleBracket => write!(f, ">"),
            Token::Comma => write!(f, ","),
            Token::Equals => write!(f, "="),
            Token::Semicolon => write!(f, ";"),
            Token::LineComment | Token::BlockComment => write!(f, "comment"),
            Token::Error => write!(f, "<ERROR>"),
        }
    }
}

/// An error found while lexing, reported to the handler when the parser
/// pulls the surrounding token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexError {
    pub span: Range<usize>,
    pub message: &'static str,
}

#[derive(Default)]
pub(crate) struct TokenExtras {
    pub errors: Vec<LexError>,
}

fn int<'a>(lex: &mut Lexer<'a, Token<'a>>, radix: u32, prefix_len: usize) -> u64 {
    debug_assert!(lex.slice().len() > prefix_len);
    let span = lex.span().start + prefix_len..lex.span().end;

    match u64::from_str_radix(&lex.source()[span.clone()], radix) {
        Ok(value) => value,
        Err(err) => {
            debug_assert_eq!(err.kind(), &IntErrorKind::PosOverflow);
            lex.extras.errors.push(LexError {
                span,
                message: "integer is too large",
            });
            Default::default()
        }
    }
}

fn float<'a>(lex: &mut Lexer<'a, Token<'a>>) -> f64 {
    lex.slice().parse().expect("failed to parse float")
}

fn string<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Vec<u8> {
    let terminator = lex.slice().as_bytes()[0];
    let bytes = lex.remainder().as_bytes();
    let mut value = Vec::new();

    let mut pos = 0;
    loop {
        match bytes.get(pos) {
            None => {
                lex.extras.errors.push(LexError {
                    span: lex.span(),
                    message: "unterminated string",
                });
                break;
            }
            Some(b'\n') => {
                lex.extras.errors.push(LexError {
                    span: lex.span(),
                    message: "unterminated string",
                });
                break;
            }
            Some(&byte) if byte == terminator => {
                pos += 1;
                break;
            }
            Some(b'\\') => {
                let escape_start = lex.span().end + pos;
                match unescape(bytes, pos + 1, &mut value) {
                    Some(end) => pos = end,
                    None => {
                        lex.extras.errors.push(LexError {
                            span: escape_start..escape_start + 2,
                            message: "invalid string escape",
                        });
                        pos += 1;
                    }
                }
            }
            Some(&byte) => {
                value.push(byte);
                pos += 1;
            }
        }
    }

    lex.bump(pos);
    value
}

/// Decodes the escape sequence beginning at `pos` (just after the
/// backslash), appending the decoded bytes to `value`. Returns the position
/// just past the escape, or `None` if it is invalid.
fn unescape(bytes: &[u8], pos: usize, value: &mut Vec<u8>) -> Option<usize> {
    match bytes.get(pos)? {
        b'a' => {
            value.push(b'\x07');
            Some(pos + 1)
        }
        b'b' => {
            value.push(b'\x08');
            Some(pos + 1)
        }
        b'f' => {
            value.push(b'\x0c');
            Some(pos + 1)
        }
        b'n' => {
            value.push(b'\n');
            Some(pos + 1)
        }
        b'r' => {
            value.push(b'\r');
            Some(pos + 1)
        }
        b't' => {
            value.push(b'\t');
            Some(pos + 1)
        }
        b'v' => {
            value.push(b'\x0b');
            Some(pos + 1)
        }
        b'?' | b'\\' | b'\'' | b'"' => {
            value.push(bytes[pos]);
            Some(pos + 1)
        }
        b'x' | b'X' => {
            let digits = hex_digits(bytes, pos + 1, 2)?;
            let end = pos + 1 + digits;
            let byte = u8::from_str_radix(digit_str(bytes, pos + 1, end), 16).ok()?;
            value.push(byte);
            Some(end)
        }
        b'0'..=b'7' => {
            let mut end = pos + 1;
            while end < pos + 3 && matches!(bytes.get(end), Some(b'0'..=b'7')) {
                end += 1;
            }
            let byte = u8::from_str_radix(digit_str(bytes, pos, end), 8).ok()?;
            value.push(byte);
            Some(end)
        }
        b'u' => {
            unicode_escape(bytes, pos + 1, 4, value)?;
            Some(pos + 5)
        }
        b'U' => {
            unicode_escape(bytes, pos + 1, 8, value)?;
            Some(pos + 9)
        }
        _ => None,
    }
}

fn unicode_escape(bytes: &[u8], pos: usize, len: usize, value: &mut Vec<u8>) -> Option<()> {
    if hex_digits(bytes, pos, len)? != len {
        return None;
    }
    let code = u32::from_str_radix(digit_str(bytes, pos, pos + len), 16).ok()?;
    let ch = char::from_u32(code)?;
    let mut buf = [0; 4];
    value.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
    Some(())
}

/// Counts up to `max` hex digits at `pos`, requiring at least one.
fn hex_digits(bytes: &[u8], pos: usize, max: usize) -> Option<usize> {
    let mut count = 0;
    while count < max && matches!(bytes.get(pos + count), Some(b) if b.is_ascii_hexdigit()) {
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(count)
    }
}

fn digit_str(bytes: &[u8], start: usize, end: usize) -> &str {
    std::str::from_utf8(&bytes[start..end]).expect("digits are ascii")
}

fn block_comment<'a>(lex: &mut Lexer<'a, Token<'a>>) {
    match lex.remainder().find("*/") {
        Some(len) => lex.bump(len + 2),
        None => {
            lex.extras.errors.push(LexError {
                span: lex.span(),
                message: "unterminated block comment",
            });
            lex.bump(lex.remainder().len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_tokens() {
        let source = r#"hell0 052 42 0x2A 5. 0.5 0.42e+2 2e-4 .2e+3 52e3
            "hello \a\b\f\n\r\t\v\?\\\'\" \052 \x2a" 'hello 😀' _foo"#;
        let mut lexer = Token::lexer(source);

        assert_eq!(lexer.next().unwrap(), Token::Ident("hell0"));
        assert_eq!(lexer.next().unwrap(), Token::IntLiteral(42));
        assert_eq!(lexer.next().unwrap(), Token::IntLiteral(42));
        assert_eq!(lexer.next().unwrap(), Token::IntLiteral(42));
        assert_eq!(lexer.next().unwrap(), Token::FloatLiteral(5.));
        assert_eq!(lexer.next().unwrap(), Token::FloatLiteral(0.5));
        assert_eq!(lexer.next().unwrap(), Token::FloatLiteral(0.42e+2));
        assert_eq!(lexer.next().unwrap(), Token::FloatLiteral(2e-4));
        assert_eq!(lexer.next().unwrap(), Token::FloatLiteral(0.2e+3));
        assert_eq!(lexer.next().unwrap(), Token::FloatLiteral(52e3));
        assert_eq!(
            lexer.next().unwrap(),
            Token::StringLiteral(b"hello \x07\x08\x0c\n\r\t\x0b?\\'\" * *".to_vec())
        );
        assert_eq!(
            lexer.next().unwrap(),
            Token::StringLiteral("hello 😀".as_bytes().to_vec())
        );
        assert_eq!(lexer.next().unwrap(), Token::Ident("_foo"));
        assert_eq!(lexer.next(), None);

        assert_eq!(lexer.extras.errors, vec![]);
    }

    #[test]
    fn integer_overflow() {
        let source = "99999999999999999999999999999999999999 4";
        let mut lexer = Token::lexer(source);

        assert_eq!(lexer.next(), Some(Token::IntLiteral(0)));
        assert_eq!(lexer.next(), Some(Token::IntLiteral(4)));
        assert_eq!(lexer.next(), None);

        assert_eq!(
            lexer.extras.errors,
            vec![LexError {
                span: 0..(source.len() - 2),
                message: "integer is too large",
            }]
        );
    }

    #[test]
    fn unicode_escapes() {
        let source = r#"'hello \U0001f600'"#;
        let mut lexer = Token::lexer(source);

        assert_eq!(
            lexer.next(),
            Some(Token::StringLiteral("hello 😀".as_bytes().to_vec()))
        );
        assert_eq!(lexer.next(), None);
        assert_eq!(lexer.extras.errors, vec![]);
    }

    #[test]
    fn invalid_string_escape() {
        let source = r#""\m" foo"#;
        let mut lexer = Token::lexer(source);

        assert_eq!(lexer.next(), Some(Token::StringLiteral(b"m".to_vec())));
        assert_eq!(lexer.next(), Some(Token::Ident("foo")));
        assert_eq!(lexer.next(), None);

        assert_eq!(
            lexer.extras.errors,
            vec![LexError {
                span: 1..3,
                message: "invalid string escape",
            }]
        );
    }

    #[test]
    fn unterminated_string() {
        let source = "\"hello \n foo";
        let mut lexer = Token::lexer(source);

        assert_eq!(lexer.next(), Some(Token::StringLiteral(b"hello ".to_vec())));
        assert_eq!(lexer.next(), Some(Token::Ident("foo")));
        assert_eq!(lexer.next(), None);

        assert_eq!(lexer.extras.errors.len(), 1);
        assert_eq!(lexer.extras.errors[0].message, "unterminated string");
    }

    #[test]
    fn comments() {
        let source = "foo // bar \nbaz /* qux\n quux */ corge";
        let mut lexer = Token::lexer(source);

        assert_eq!(lexer.next(), Some(Token::Ident("foo")));
        assert_eq!(lexer.next(), Some(Token::LineComment));
        assert_eq!(lexer.span(), 4..12);
        assert_eq!(lexer.next(), Some(Token::Ident("baz")));
        assert_eq!(lexer.next(), Some(Token::BlockComment));
        assert_eq!(lexer.span(), 16..31);
        assert_eq!(lexer.next(), Some(Token::Ident("corge")));
        assert_eq!(lexer.next(), None);

        assert_eq!(lexer.extras.errors, vec![]);
    }

    #[test]
    fn unterminated_block_comment() {
        let source = "foo /* bar";
        let mut lexer = Token::lexer(source);

        assert_eq!(lexer.next(), Some(Token::Ident("foo")));
        assert_eq!(lexer.next(), Some(Token::BlockComment));
        assert_eq!(lexer.next(), None);

        assert_eq!(lexer.extras.errors.len(), 1);
        assert_eq!(lexer.extras.errors[0].message, "unterminated block comment");
    }

    #[test]
    fn invalid_token() {
        let source = "@ foo";
        let mut lexer = Token::lexer(source);

        assert_eq!(lexer.next(), Some(Token::Error));
        assert_eq!(lexer.next(), Some(Token::Ident("foo")));
        assert_eq!(lexer.next(), None);
    }
}
