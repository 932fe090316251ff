//! Baseline tokenizer: splits a segment of input into classified tokens.
//!
//! Embedded-language switch detection runs before this (see
//! [`crate::embedded`]); the tokenizer only ever sees text that belongs to a
//! single language.

use crate::context::Position;
use crate::error::BraidError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSplitter {
    /// Character-scanning lexer; punctuation splits tokens without spaces.
    None,
    /// Whitespace-delimited chunks.
    #[default]
    Space,
    /// Matches of the grammar's `TokenPattern` regex.
    Regex,
}

impl TokenSplitter {
    pub fn parse(s: &str) -> Option<TokenSplitter> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Some(TokenSplitter::None),
            "space" => Some(TokenSplitter::Space),
            "regex" => Some(TokenSplitter::Regex),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Number,
    /// Quoted string literal (quotes kept in `text`).
    Str,
    Operator,
    /// Start of an embedded-language region.
    ContextSwitch {
        language: String,
        trigger: String,
        end_trigger: String,
    },
    /// End trigger of an embedded-language region.
    ContextEnd { trigger: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: Position,
}

impl Token {
    pub fn is_identifier(&self) -> bool {
        self.kind == TokenKind::Identifier
    }
}

const DEFAULT_PATTERN: &str = r#""[^"\n]*"|[A-Za-z_][A-Za-z0-9_]*|\d+(?:\.\d+)?|\S"#;

const MULTI_CHAR_OPERATORS: &[&str] = &[
    "==", "!=", "<=", ">=", "->", "=>", "::", "&&", "||", "+=", "-=", "*=", "/=", "</", "/>",
];

/// Running line/column for a position in the full input.
#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

impl Cursor {
    /// Advance over `text` (which must start at `self.offset`).
    pub fn advance_over(&mut self, text: &str) {
        for c in text.chars() {
            self.step(c);
        }
    }

    fn step(&mut self, c: char) {
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }

    fn position(&self, length: usize) -> Position {
        Position::new(self.line, self.column, self.offset, length)
    }
}

pub struct Tokenizer {
    splitter: TokenSplitter,
    pattern: Option<Regex>,
    keywords: HashSet<String>,
}

impl Tokenizer {
    pub fn new(
        splitter: TokenSplitter,
        pattern: Option<&str>,
        keywords: impl IntoIterator<Item = String>,
    ) -> Result<Self, BraidError> {
        let pattern = match splitter {
            TokenSplitter::Regex => {
                let src = pattern.unwrap_or(DEFAULT_PATTERN);
                Some(Regex::new(src).map_err(|e| BraidError::TokenPattern {
                    pattern: src.to_string(),
                    message: e.to_string(),
                })?)
            }
            _ => None,
        };
        Ok(Tokenizer {
            splitter,
            pattern,
            keywords: keywords.into_iter().collect(),
        })
    }

    pub fn tokenize(&self, input: &str) -> Vec<Token> {
        self.tokenize_segment(input, Cursor::default())
    }

    /// Tokenize `text`, which begins at `start` in the full input.
    pub fn tokenize_segment(&self, text: &str, start: Cursor) -> Vec<Token> {
        match self.splitter {
            TokenSplitter::Space => self.split_whitespace(text, start),
            TokenSplitter::None => self.scan(text, start),
            TokenSplitter::Regex => self.split_regex(text, start),
        }
    }

    fn split_whitespace(&self, text: &str, mut cursor: Cursor) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut chunk_start: Option<(Cursor, usize)> = None;
        for (i, c) in text.char_indices() {
            if c.is_whitespace() {
                if let Some((at, from)) = chunk_start.take() {
                    tokens.push(self.classify(&text[from..i], at));
                }
            } else if chunk_start.is_none() {
                chunk_start = Some((cursor, i));
            }
            cursor.step(c);
        }
        if let Some((at, from)) = chunk_start {
            tokens.push(self.classify(&text[from..], at));
        }
        tokens
    }

    fn split_regex(&self, text: &str, start: Cursor) -> Vec<Token> {
        let Some(re) = &self.pattern else {
            return self.split_whitespace(text, start);
        };
        let mut tokens = Vec::new();
        let mut cursor = start;
        let mut consumed = 0usize;
        for m in re.find_iter(text) {
            if m.as_str().trim().is_empty() {
                continue;
            }
            cursor.advance_over(&text[consumed..m.start()]);
            tokens.push(self.classify(m.as_str(), cursor));
            cursor.advance_over(m.as_str());
            consumed = m.end();
        }
        tokens
    }

    fn scan(&self, text: &str, mut cursor: Cursor) -> Vec<Token> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let byte_at = |i: usize| chars.get(i).map(|(b, _)| *b).unwrap_or(text.len());
        let mut tokens = Vec::new();
        let mut pos = 0usize;

        while pos < chars.len() {
            let c = chars[pos].1;

            if c.is_whitespace() {
                cursor.step(c);
                pos += 1;
                continue;
            }

            let start = pos;
            let at = cursor;

            if c == '"' {
                pos += 1;
                while pos < chars.len() && chars[pos].1 != '"' && chars[pos].1 != '\n' {
                    pos += 1;
                }
                if pos < chars.len() && chars[pos].1 == '"' {
                    pos += 1;
                }
            } else if c.is_ascii_digit() {
                while pos < chars.len() && chars[pos].1.is_ascii_digit() {
                    pos += 1;
                }
                if pos + 1 < chars.len()
                    && chars[pos].1 == '.'
                    && chars[pos + 1].1.is_ascii_digit()
                {
                    pos += 1;
                    while pos < chars.len() && chars[pos].1.is_ascii_digit() {
                        pos += 1;
                    }
                }
            } else if c.is_alphabetic() || c == '_' {
                while pos < chars.len() && (chars[pos].1.is_alphanumeric() || chars[pos].1 == '_')
                {
                    pos += 1;
                }
            } else {
                let rest = &text[byte_at(pos)..];
                pos += MULTI_CHAR_OPERATORS
                    .iter()
                    .find(|op| rest.starts_with(**op))
                    .map(|op| op.chars().count())
                    .unwrap_or(1);
            }

            let lexeme = &text[byte_at(start)..byte_at(pos)];
            tokens.push(self.classify(lexeme, at));
            cursor.advance_over(lexeme);
        }
        tokens
    }

    fn classify(&self, lexeme: &str, at: Cursor) -> Token {
        let kind = classify_lexeme(lexeme, &self.keywords);
        Token {
            kind,
            text: lexeme.to_string(),
            position: at.position(lexeme.len()),
        }
    }
}

fn classify_lexeme(lexeme: &str, keywords: &HashSet<String>) -> TokenKind {
    let mut chars = lexeme.chars();
    let first = chars.next().unwrap_or(' ');
    if lexeme.len() >= 2 && lexeme.starts_with('"') && lexeme.ends_with('"') {
        return TokenKind::Str;
    }
    if is_number(lexeme) {
        return TokenKind::Number;
    }
    if (first.is_alphabetic() || first == '_') && chars.all(|c| c.is_alphanumeric() || c == '_') {
        return if keywords.contains(lexeme) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };
    }
    TokenKind::Operator
}

fn is_number(lexeme: &str) -> bool {
    let digits = lexeme.strip_prefix('-').unwrap_or(lexeme);
    if digits.is_empty() {
        return false;
    }
    let mut seen_dot = false;
    for c in digits.chars() {
        if c == '.' {
            if seen_dot {
                return false;
            }
            seen_dot = true;
        } else if !c.is_ascii_digit() {
            return false;
        }
    }
    !digits.starts_with('.') && !digits.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer(splitter: TokenSplitter) -> Tokenizer {
        Tokenizer::new(splitter, None, vec!["function".to_string()]).unwrap()
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind.clone()).collect()
    }

    #[test]
    fn space_splitter_classifies_chunks() {
        let tokens = tokenizer(TokenSplitter::Space).tokenize("function x = 1.5 + y_2");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Keyword,
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::Number,
                TokenKind::Operator,
                TokenKind::Identifier,
            ]
        );
        assert_eq!(tokens[3].text, "1.5");
        assert_eq!(tokens[1].position, Position::new(1, 10, 9, 1));
    }

    #[test]
    fn positions_track_lines() {
        let tokens = tokenizer(TokenSplitter::Space).tokenize("a\n  b");
        assert_eq!(tokens[1].position.line, 2);
        assert_eq!(tokens[1].position.column, 3);
        assert_eq!(tokens[1].position.offset, 4);
    }

    #[test]
    fn scanning_lexer_splits_punctuation() {
        let tokens = tokenizer(TokenSplitter::None).tokenize("f(x)=={\"s\"}");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["f", "(", "x", ")", "==", "{", "\"s\"", "}"]);
        assert_eq!(tokens[6].kind, TokenKind::Str);
    }

    #[test]
    fn regex_splitter_uses_default_pattern() {
        let tokens = tokenizer(TokenSplitter::Regex).tokenize("color:red;");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["color", ":", "red", ";"]);
        assert_eq!(tokens[2].position.column, 7);
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = Tokenizer::new(TokenSplitter::Regex, Some("(unclosed"), Vec::new());
        assert!(matches!(err, Err(BraidError::TokenPattern { .. })));
    }

    #[test]
    fn segment_offsets_are_absolute() {
        let start = Cursor {
            offset: 10,
            line: 3,
            column: 5,
        };
        let tokens = tokenizer(TokenSplitter::Space).tokenize_segment(" y", start);
        assert_eq!(tokens[0].position, Position::new(3, 6, 11, 1));
    }

    #[test]
    fn numbers_and_operators() {
        let kw = HashSet::new();
        assert_eq!(classify_lexeme("-12", &kw), TokenKind::Number);
        assert_eq!(classify_lexeme("1.", &kw), TokenKind::Operator);
        assert_eq!(classify_lexeme("-", &kw), TokenKind::Operator);
    }
}
