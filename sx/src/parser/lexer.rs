use std::ops::Range;

use crate::parser::error::{ParseError, SyntaxErrorKind};

const RAW_OPEN: &str = "\"\"\"[";
const RAW_CLOSE: &str = "]\"\"\"";

/// Characters that end a bare word.
const WORD_STOP: &[char] = &['(', ')', '[', ']', '{', '}', '\'', '"'];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Open(char),
    Close(char),
    Space,
    Word(String),
    Quoted(String),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

pub(crate) struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    file_id: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file_id: usize) -> Self {
        Lexer {
            source,
            pos: 0,
            file_id,
        }
    }

    /// Tokenize the whole source.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            self.pos += ch.len_utf8();
        }
    }

    fn error(&self, kind: SyntaxErrorKind, span: Range<usize>) -> ParseError {
        ParseError::new(kind, span, self.file_id)
    }

    fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(None);
        };

        let kind = match ch {
            '"' if self.rest().starts_with(RAW_OPEN) => self.raw_block(start)?,
            '"' | '\'' => self.quoted(start)?,
            '(' | '[' | '{' => {
                self.bump();
                TokenKind::Open(ch)
            }
            ')' | ']' | '}' => {
                self.bump();
                TokenKind::Close(ch)
            }
            c if is_space(c) => {
                self.eat_while(is_space);
                TokenKind::Space
            }
            _ => {
                self.eat_while(|c| !is_space(c) && !WORD_STOP.contains(&c));
                TokenKind::Word(self.source[start..self.pos].to_string())
            }
        };

        Ok(Some(Token {
            kind,
            span: start..self.pos,
        }))
    }

    fn raw_block(&mut self, start: usize) -> Result<TokenKind, ParseError> {
        self.pos += RAW_OPEN.len();
        let Some(end) = self.rest().find(RAW_CLOSE) else {
            return Err(self.error(
                SyntaxErrorKind::UnterminatedRawBlock,
                start..start + RAW_OPEN.len(),
            ));
        };
        let content = self.rest()[..end].to_string();
        self.pos += end + RAW_CLOSE.len();
        Ok(TokenKind::Raw(content))
    }

    fn quoted(&mut self, start: usize) -> Result<TokenKind, ParseError> {
        let Some(quote) = self.bump() else {
            return Err(self.error(SyntaxErrorKind::UnterminatedString, start..start));
        };
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(self.error(SyntaxErrorKind::UnterminatedString, start..start + 1));
                }
                Some('\\') => match self.bump() {
                    Some(escaped) => value.push(unescape(escaped)),
                    None => {
                        return Err(
                            self.error(SyntaxErrorKind::UnterminatedString, start..start + 1)
                        );
                    }
                },
                Some(c) if c == quote => return Ok(TokenKind::Quoted(value)),
                Some(c) => value.push(c),
            }
        }
    }
}

fn is_space(c: char) -> bool {
    c.is_whitespace() || c.is_control()
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source, 0)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn words_stop_at_brackets_and_quotes() {
        assert_eq!(
            kinds("(p[a=1]x\"y\")"),
            vec![
                TokenKind::Open('('),
                TokenKind::Word("p".into()),
                TokenKind::Open('['),
                TokenKind::Word("a=1".into()),
                TokenKind::Close(']'),
                TokenKind::Word("x".into()),
                TokenKind::Quoted("y".into()),
                TokenKind::Close(')'),
            ]
        );
    }

    #[test]
    fn escapes_in_quoted_strings() {
        assert_eq!(
            kinds(r#""a\"b\n\q""#),
            vec![TokenKind::Quoted("a\"b\nq".into())]
        );
        assert_eq!(kinds("'it''s'"), vec![
            TokenKind::Quoted("it".into()),
            TokenKind::Quoted("s".into()),
        ]);
    }

    #[test]
    fn raw_block_is_verbatim() {
        assert_eq!(
            kinds("\"\"\"[ (a \"b\" ] ]\"\"\""),
            vec![TokenKind::Raw(" (a \"b\" ] ".into())]
        );
    }

    #[test]
    fn multibyte_words_keep_spans() {
        let tokens = Lexer::new("漢字 x", 0).tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Word("漢字".into()));
        assert_eq!(tokens[0].span, 0..6);
        assert_eq!(tokens[2].span, 7..8);
    }

    #[test]
    fn unterminated_string_reports_its_start() {
        let err = Lexer::new("(p \"abc", 0).tokenize().unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnterminatedString);
        assert_eq!(err.offset(), 3);
    }

    #[test]
    fn unterminated_raw_block_reports_its_start() {
        let err = Lexer::new("x \"\"\"[ abc ]\"\"", 0).tokenize().unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnterminatedRawBlock);
        assert_eq!(err.offset(), 2);
    }
}
