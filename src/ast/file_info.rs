use std::{fmt, sync::Arc};

/// Information about the contents of a source file, including details about
/// comments and tokens. The lexer accumulates these details as it scans the
/// file, allowing compact representation of source positions.
///
/// Once built, a `FileInfo` is immutable and is shared (behind [`Arc`]) by the
/// AST, by source-info generation and by diagnostics.
#[derive(Clone)]
pub struct FileInfo {
    name: Arc<str>,
    data: Box<str>,
    /// Byte offset at which each line begins. The entry at index 0 is always
    /// zero; subsequent entries are strictly increasing.
    lines: Vec<usize>,
    tokens: Vec<TokenSpan>,
    comments: Vec<CommentSpan>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct TokenSpan {
    offset: usize,
    length: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct CommentSpan {
    /// Index into `tokens` giving the position and size of the comment.
    index: usize,
    /// Index into `tokens` of the token this comment is attributed to.
    attributed_to: usize,
}

/// A stable handle for a token within a [`FileInfo`], returned by
/// [`FileInfo::add_token`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenId(pub(crate) usize);

/// A stable handle for a comment within a [`FileInfo`], returned by
/// [`FileInfo::add_comment`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommentId(pub(crate) usize);

/// A position in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    /// The name of the source file.
    pub name: Arc<str>,
    /// The byte offset within the file.
    pub offset: usize,
    /// One-based line number.
    pub line: usize,
    /// One-based column number, with tabs advancing to the next multiple-of-8
    /// tab stop.
    pub col: usize,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.line, self.col)
    }
}

impl FileInfo {
    /// Creates a new instance for the given file.
    pub fn new(name: impl Into<Arc<str>>, data: impl Into<Box<str>>) -> Self {
        FileInfo {
            name: name.into(),
            data: data.into(),
            lines: vec![0],
            tokens: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Returns the name of the source file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the raw contents of the source file.
    pub fn source(&self) -> &str {
        &self.data
    }

    /// Records the offset at which a new line begins, i.e. the offset just
    /// past a newline character. The lexer calls this for every newline it
    /// encounters.
    ///
    /// # Panics
    ///
    /// Panics if the offset is beyond the end of the file or not strictly
    /// greater than the last recorded line offset. Such calls are bugs in the
    /// lexer, not user errors.
    pub fn add_line(&mut self, offset: usize) {
        assert!(
            offset <= self.data.len(),
            "invalid offset: {} is greater than file size {}",
            offset,
            self.data.len(),
        );
        let last = *self.lines.last().expect("lines is never empty");
        assert!(
            offset > last,
            "invalid offset: {} is not greater than previously observed line offset {}",
            offset,
            last,
        );

        self.lines.push(offset);
    }

    /// Records a token at the given location and returns a handle to it.
    ///
    /// Tokens must be added in order: each token must begin strictly after
    /// the end of the previous one.
    ///
    /// # Panics
    ///
    /// Panics if the token extends beyond the end of the file, or overlaps or
    /// precedes a previously added token.
    pub fn add_token(&mut self, offset: usize, length: usize) -> TokenId {
        assert!(
            offset + length <= self.data.len(),
            "invalid offset+length: {} is greater than file size {}",
            offset + length,
            self.data.len(),
        );

        if let Some(last) = self.tokens.last() {
            let last_end = last.offset + last.length.saturating_sub(1);
            assert!(
                offset > last_end,
                "invalid offset: {} is not greater than previously observed token end {}",
                offset,
                last_end,
            );
        }

        self.tokens.push(TokenSpan { offset, length });
        TokenId(self.tokens.len() - 1)
    }

    /// Records a comment. The comment must first have been added as a token
    /// via [`add_token`](FileInfo::add_token); `attributed_to` names another
    /// token in this file with which the comment is associated. If the
    /// comment's offset is before that of `attributed_to` it is a leading
    /// comment, otherwise a trailing comment.
    ///
    /// # Panics
    ///
    /// Panics if either handle is out of range for this file, if the comment
    /// index is not strictly greater than the last recorded comment's, or if
    /// the attribution index decreases.
    pub fn add_comment(&mut self, comment: TokenId, attributed_to: TokenId) -> CommentId {
        assert!(
            comment.0 < self.tokens.len() && attributed_to.0 < self.tokens.len(),
            "cannot add comment using token from a different file",
        );

        if let Some(last) = self.comments.last() {
            assert!(
                comment.0 > last.index,
                "invalid index: {} is not greater than previously observed comment index {}",
                comment.0,
                last.index,
            );
            assert!(
                attributed_to.0 >= last.attributed_to,
                "invalid attribution: {} is less than previously observed attribution index {}",
                attributed_to.0,
                last.attributed_to,
            );
        }

        self.comments.push(CommentSpan {
            index: comment.0,
            attributed_to: attributed_to.0,
        });
        CommentId(self.comments.len() - 1)
    }

    /// Resolves a byte offset to a position with line and column numbers.
    pub fn position(&self, offset: usize) -> SourcePos {
        let line = self.lines.partition_point(|&start| start <= offset);

        // Tabs prevent computing the column directly from the line's starting
        // offset, so walk the intervening bytes.
        let mut col = 0;
        for &byte in self.data.as_bytes()[self.lines[line - 1]..offset].iter() {
            if byte == b'\t' {
                col += 8 - (col % 8);
            } else {
                col += 1;
            }
        }

        SourcePos {
            name: self.name.clone(),
            offset,
            line,
            col: col + 1,
        }
    }

    /// Returns the details for a previously added token.
    pub fn token(&self, id: TokenId) -> TokenInfo<'_> {
        debug_assert!(id.0 < self.tokens.len());
        TokenInfo {
            info: self,
            index: id.0,
        }
    }

    /// Returns the details for a previously added comment.
    pub fn comment(&self, id: CommentId) -> CommentInfo<'_> {
        debug_assert!(id.0 < self.comments.len());
        CommentInfo {
            info: self,
            index: id.0,
        }
    }

    /// Iterates over every token in the file, comments included, in source
    /// order.
    pub fn tokens(&self) -> impl Iterator<Item = TokenInfo<'_>> {
        (0..self.tokens.len()).map(move |index| TokenInfo { info: self, index })
    }
}

impl fmt::Debug for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileInfo")
            .field("name", &self.name)
            .field("lines", &self.lines.len())
            .field("tokens", &self.tokens.len())
            .field("comments", &self.comments.len())
            .finish()
    }
}

/// The details for a single token in a source file. A token is either a
/// comment or a terminal symbol; tokens corresponding to comments have no
/// comments attributed to them.
#[derive(Copy, Clone)]
pub struct TokenInfo<'a> {
    info: &'a FileInfo,
    index: usize,
}

impl<'a> TokenInfo<'a> {
    fn span(&self) -> TokenSpan {
        self.info.tokens[self.index]
    }

    /// Returns the handle for this token.
    pub fn id(&self) -> TokenId {
        TokenId(self.index)
    }

    /// The position of the first character of this token.
    pub fn start(&self) -> SourcePos {
        self.info.position(self.span().offset)
    }

    /// The position of the last character of this token.
    pub fn end(&self) -> SourcePos {
        let span = self.span();
        self.info
            .position(span.offset + span.length.saturating_sub(1))
    }

    /// The whitespace between the end of the previous token and the start of
    /// this one.
    pub fn leading_whitespace(&self) -> &'a str {
        let span = self.span();
        let prev_end = match self.index.checked_sub(1) {
            Some(prev) => {
                let prev = self.info.tokens[prev];
                prev.offset + prev.length
            }
            None => 0,
        };
        &self.info.data[prev_end..span.offset]
    }

    /// The raw source text of this token.
    pub fn raw_text(&self) -> &'a str {
        let span = self.span();
        &self.info.data[span.offset..span.offset + span.length]
    }

    /// Returns the comments attributed to this token which appear before it
    /// in the file.
    pub fn leading_comments(&self) -> Comments<'a> {
        let comments = &self.info.comments;
        let start = comments.partition_point(|c| c.attributed_to < self.index);

        if start == comments.len() || comments[start].attributed_to != self.index {
            return Comments {
                info: self.info,
                first: 0,
                num: 0,
            };
        }

        let offset = self.span().offset;
        let num = comments[start..]
            .iter()
            .take_while(|c| {
                c.attributed_to == self.index && self.info.tokens[c.index].offset < offset
            })
            .count();

        Comments {
            info: self.info,
            first: start,
            num,
        }
    }

    /// Returns the comments attributed to this token which appear after it in
    /// the file.
    pub fn trailing_comments(&self) -> Comments<'a> {
        let comments = &self.info.comments;
        let offset = self.span().offset;
        let start = comments.partition_point(|c| {
            c.attributed_to < self.index || self.info.tokens[c.index].offset <= offset
        });

        if start == comments.len() || comments[start].attributed_to != self.index {
            return Comments {
                info: self.info,
                first: 0,
                num: 0,
            };
        }

        let num = comments[start..]
            .iter()
            .take_while(|c| c.attributed_to == self.index)
            .count();

        Comments {
            info: self.info,
            first: start,
            num,
        }
    }
}

impl fmt::Debug for TokenInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenInfo")
            .field("index", &self.index)
            .field("text", &self.raw_text())
            .finish()
    }
}

/// A range of comments attributed to a single token.
#[derive(Copy, Clone, Debug)]
pub struct Comments<'a> {
    info: &'a FileInfo,
    first: usize,
    num: usize,
}

impl<'a> Comments<'a> {
    /// The number of comments in this range.
    pub fn len(&self) -> usize {
        self.num
    }

    /// Returns `true` if the range contains no comments.
    pub fn is_empty(&self) -> bool {
        self.num == 0
    }

    /// Returns the comment at the given index within this range.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn get(&self, index: usize) -> CommentInfo<'a> {
        assert!(
            index < self.num,
            "index {} out of range (len = {})",
            index,
            self.num,
        );
        CommentInfo {
            info: self.info,
            index: self.first + index,
        }
    }

    /// Iterates over the comments in this range.
    pub fn iter(&self) -> impl Iterator<Item = CommentInfo<'a>> {
        let info = self.info;
        (self.first..self.first + self.num).map(move |index| CommentInfo { info, index })
    }
}

/// The details for a single comment in a source file.
#[derive(Copy, Clone)]
pub struct CommentInfo<'a> {
    info: &'a FileInfo,
    index: usize,
}

impl<'a> CommentInfo<'a> {
    fn token(&self) -> TokenInfo<'a> {
        TokenInfo {
            info: self.info,
            index: self.info.comments[self.index].index,
        }
    }

    /// The position of the first character of this comment.
    pub fn start(&self) -> SourcePos {
        self.token().start()
    }

    /// The position of the last character of this comment.
    pub fn end(&self) -> SourcePos {
        self.token().end()
    }

    /// The whitespace between the end of the previous token and the start of
    /// this comment.
    pub fn leading_whitespace(&self) -> &'a str {
        self.token().leading_whitespace()
    }

    /// The raw source text of this comment, including its delimiters.
    pub fn raw_text(&self) -> &'a str {
        self.token().raw_text()
    }
}

impl fmt::Debug for CommentInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommentInfo")
            .field("index", &self.index)
            .field("text", &self.raw_text())
            .finish()
    }
}
