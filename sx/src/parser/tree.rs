use std::ops::Range;

use crate::node::{Attribute, AttributeGroup, Element, Node};
use crate::parser::error::{ParseError, SyntaxErrorKind};
use crate::parser::lexer::{Lexer, Token, TokenKind};

const DISCARDED_COMMENT: &str = "#comment";
const LITERAL_COMMENT: &str = "@comment";

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse source text into the synthetic root element.
pub fn parse_root(source: &str, file_id: usize) -> Result<Element, ParseError> {
    let tokens = Lexer::new(source, file_id).tokenize()?;
    let mut builder = TreeBuilder {
        tokens,
        pos: 0,
        file_id,
    };
    let contents = builder.parse_contents(None)?;
    Ok(Element::root(contents.children, 0..source.len()))
}

// ---------------------------------------------------------------------------
// Tree builder
// ---------------------------------------------------------------------------

struct TreeBuilder {
    tokens: Vec<Token>,
    pos: usize,
    file_id: usize,
}

/// Children and attribute groups collected between a list's head and its `)`.
struct Contents {
    children: Vec<Node>,
    groups: Vec<AttributeGroup>,
    end: usize,
}

/// Adjacent word/quoted tokens, joined into one text node.
#[derive(Default)]
struct TextRun {
    text: Option<String>,
}

impl TextRun {
    fn push(&mut self, s: &str) {
        self.text.get_or_insert_with(String::new).push_str(s);
    }

    fn flush(&mut self, children: &mut Vec<Node>) {
        if let Some(text) = self.text.take() {
            children.push(Node::Text(text));
        }
    }
}

impl TreeBuilder {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, kind: SyntaxErrorKind, span: Range<usize>) -> ParseError {
        ParseError::new(kind, span, self.file_id)
    }

    /// Parse nodes until the closing bracket of the enclosing list, or until
    /// end of input at top level (`open == None`).
    fn parse_contents(&mut self, open: Option<Range<usize>>) -> Result<Contents, ParseError> {
        let mut children = Vec::new();
        let mut groups = Vec::new();
        let mut run = TextRun::default();

        while let Some(token) = self.next() {
            match token.kind {
                TokenKind::Space => run.flush(&mut children),
                TokenKind::Word(s) | TokenKind::Quoted(s) => run.push(&s),
                TokenKind::Raw(content) => {
                    run.flush(&mut children);
                    children.push(raw_or_include(content, token.span));
                }
                TokenKind::Open('(') => {
                    run.flush(&mut children);
                    if let Some(node) = self.parse_list(token.span)? {
                        children.push(node);
                    }
                }
                TokenKind::Open('[') => {
                    run.flush(&mut children);
                    if open.is_none() {
                        return Err(self.error(SyntaxErrorKind::MisplacedAttributeGroup, token.span));
                    }
                    groups.push(self.parse_group(token.span)?);
                }
                TokenKind::Open(_) => {
                    run.flush(&mut children);
                    children.extend(self.parse_include_group(token.span)?);
                }
                TokenKind::Close(')') if open.is_some() => {
                    run.flush(&mut children);
                    return Ok(Contents {
                        children,
                        groups,
                        end: token.span.end,
                    });
                }
                TokenKind::Close(found) => {
                    let kind = if open.is_some() {
                        SyntaxErrorKind::Mismatched {
                            expected: ')',
                            found,
                        }
                    } else {
                        SyntaxErrorKind::UnexpectedClose(found)
                    };
                    return Err(self.error(kind, token.span));
                }
            }
        }

        match open {
            Some(span) => Err(self
                .error(SyntaxErrorKind::Unclosed(')'), span)
                .with_note("the list opened here is never closed")),
            None => {
                run.flush(&mut children);
                let end = self.tokens.last().map(|t| t.span.end).unwrap_or(0);
                Ok(Contents {
                    children,
                    groups,
                    end,
                })
            }
        }
    }

    /// Parse a list after its `(`. Returns `None` for a discarded `#comment`.
    fn parse_list(&mut self, open: Range<usize>) -> Result<Option<Node>, ParseError> {
        let head = loop {
            match self.next() {
                Some(Token {
                    kind: TokenKind::Space,
                    ..
                }) => continue,
                Some(Token {
                    kind: TokenKind::Word(word),
                    ..
                }) => break word,
                Some(token) => {
                    return Err(self.error(SyntaxErrorKind::MissingHead, token.span));
                }
                None => return Err(self.error(SyntaxErrorKind::Unclosed(')'), open)),
            }
        };

        let contents = self.parse_contents(Some(open.clone()))?;
        let span = open.start..contents.end;

        if head.eq_ignore_ascii_case(DISCARDED_COMMENT) {
            return Ok(None);
        }

        if head.eq_ignore_ascii_case(LITERAL_COMMENT) {
            let mut text = String::new();
            for child in contents.children {
                match child {
                    Node::Text(s) | Node::RawBlock(s) => text.push_str(&s),
                    _ => return Err(self.error(SyntaxErrorKind::InvalidComment, span)),
                }
            }
            return Ok(Some(Node::Comment(text)));
        }

        Ok(Some(Node::Element(Element {
            head,
            groups: contents.groups,
            children: contents.children,
            span,
        })))
    }

    /// Parse an attribute group after its `[`.
    fn parse_group(&mut self, open: Range<usize>) -> Result<AttributeGroup, ParseError> {
        let mut group = AttributeGroup::default();
        let mut pieces: Vec<(String, bool)> = Vec::new();

        loop {
            let Some(token) = self.next() else {
                return Err(self.error(SyntaxErrorKind::Unclosed(']'), open));
            };
            let closes = token.kind == TokenKind::Close(']');
            match token.kind {
                TokenKind::Word(s) => pieces.push((s, false)),
                TokenKind::Quoted(s) => pieces.push((s, true)),
                TokenKind::Space | TokenKind::Close(']') => {
                    if !pieces.is_empty() {
                        group.items.push(Attribute::from_pieces(&pieces));
                        pieces.clear();
                    }
                    if closes {
                        return Ok(group);
                    }
                }
                TokenKind::Close(found) => {
                    return Err(self.error(
                        SyntaxErrorKind::Mismatched {
                            expected: ']',
                            found,
                        },
                        token.span,
                    ));
                }
                TokenKind::Open(_) => {
                    return Err(self.error(SyntaxErrorKind::InvalidAttribute("bracket"), token.span));
                }
                TokenKind::Raw(_) => {
                    return Err(
                        self.error(SyntaxErrorKind::InvalidAttribute("raw block"), token.span)
                    );
                }
            }
        }
    }

    /// Parse an include group after its `{`: one include per path.
    fn parse_include_group(&mut self, open: Range<usize>) -> Result<Vec<Node>, ParseError> {
        let mut includes = Vec::new();
        let mut path: Option<(String, Range<usize>)> = None;

        loop {
            let Some(token) = self.next() else {
                return Err(self.error(SyntaxErrorKind::Unclosed('}'), open));
            };
            let closes = token.kind == TokenKind::Close('}');
            match token.kind {
                TokenKind::Word(s) | TokenKind::Quoted(s) => match &mut path {
                    Some((p, span)) => {
                        p.push_str(&s);
                        span.end = token.span.end;
                    }
                    None => path = Some((s, token.span)),
                },
                TokenKind::Space | TokenKind::Close('}') => {
                    if let Some((path, span)) = path.take() {
                        includes.push(Node::Include { path, span });
                    }
                    if closes {
                        return Ok(includes);
                    }
                }
                TokenKind::Close(found) => {
                    return Err(self.error(
                        SyntaxErrorKind::Mismatched {
                            expected: '}',
                            found,
                        },
                        token.span,
                    ));
                }
                TokenKind::Open(_) => {
                    return Err(self.error(SyntaxErrorKind::InvalidInclude("bracket"), token.span));
                }
                TokenKind::Raw(_) => {
                    return Err(self.error(SyntaxErrorKind::InvalidInclude("raw block"), token.span));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A raw block whose whole content is a single quoted path is an include.
fn raw_or_include(content: String, span: Range<usize>) -> Node {
    let trimmed = content.trim();
    let quoted_path = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .filter(|p| !p.is_empty() && !p.contains(['"', '\n']));
    match quoted_path {
        Some(path) => Node::Include {
            path: path.to_string(),
            span,
        },
        None => Node::RawBlock(content),
    }
}
