//! Rule-driven tokenizer for DBN source text
//!
//! The tokenizer holds an ordered table of `(kind, regex)` rules. Scanning
//! walks the source left to right; at each position the rules are tried in
//! registration order and the first one that matches wins, so keyword rules
//! registered before `WORD` take priority (`Set` lexes as a keyword, and
//! `Settings` lexes as the keyword `Set` followed by the word `tings`).
//!
//! WHITESPACE and COMMENT matches advance the scan position but are not
//! emitted. A synthetic NEWLINE is always appended so the last statement of
//! a file is terminated whether or not the file ends with one.
//!
//! The `PATH` rule is special-cased: it is only tried immediately after a
//! `Load` keyword, where it consumes the separating blanks and captures the
//! path itself.

use regex::Regex;

use crate::errors::LexError;

/// What a token is, as decided by the first matching rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Comment,
    Path,
    Whitespace,
    Operator,
    OpenParen,
    OpenBracket,
    OpenBrace,
    CloseParen,
    CloseBracket,
    CloseBrace,
    Set,
    Repeat,
    Question,
    Command,
    Load,
    Word,
    Number,
    Newline,
}

impl TokenKind {
    /// Canonical rule name, used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Comment => "COMMENT",
            TokenKind::Path => "PATH",
            TokenKind::Whitespace => "WHITESPACE",
            TokenKind::Operator => "OPERATOR",
            TokenKind::OpenParen => "OPENPAREN",
            TokenKind::OpenBracket => "OPENBRACKET",
            TokenKind::OpenBrace => "OPENBRACE",
            TokenKind::CloseParen => "CLOSEPAREN",
            TokenKind::CloseBracket => "CLOSEBRACKET",
            TokenKind::CloseBrace => "CLOSEBRACE",
            TokenKind::Set => "SET",
            TokenKind::Repeat => "REPEAT",
            TokenKind::Question => "QUESTION",
            TokenKind::Command => "COMMAND",
            TokenKind::Load => "LOAD",
            TokenKind::Word => "WORD",
            TokenKind::Number => "NUMBER",
            TokenKind::Newline => "NEWLINE",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A classified span of source text
///
/// `value` is the first capture group of the matching rule (empty when the
/// rule captures nothing), `raw` is the full matched text, and `line`/`col`
/// are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
    pub col: usize,
    pub raw: String,
}

/// The ordered rule table
pub struct Tokenizer {
    rules: Vec<(TokenKind, Regex)>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        let mut t = Self { rules: Vec::new() };

        // comment garbage first
        t.register(TokenKind::Comment, r"^//(.+)");

        // path is gated on a preceding Load and eats the separating blanks
        t.register(TokenKind::Path, r"^[^\S\n]+([\w\./\\-]+)");

        // then real whitespace
        t.register(TokenKind::Whitespace, r"^[^\S\n]+");

        // operators next
        t.register(TokenKind::Operator, r"^([*\-/+])");

        // the groupers
        t.register(TokenKind::OpenParen, r"^(\()");
        t.register(TokenKind::OpenBracket, r"^(\[)");
        t.register(TokenKind::OpenBrace, r"^(\{)");
        t.register(TokenKind::CloseParen, r"^(\))");
        t.register(TokenKind::CloseBracket, r"^(\])");
        t.register(TokenKind::CloseBrace, r"^(\})");

        // then keywords
        t.register(TokenKind::Set, r"^(Set)");
        t.register(TokenKind::Repeat, r"^(Repeat)");
        t.register(TokenKind::Question, r"^(Same|NotSame|Smaller|NotSmaller)\?");
        t.register(TokenKind::Command, r"^(Command)");
        t.register(TokenKind::Load, r"^(Load)");

        // then literals
        t.register(TokenKind::Word, r"^([A-Za-z_][A-Za-z0-9_]*)");
        t.register(TokenKind::Number, r"^(\d+)");

        // then newline (the statement separator)
        t.register(TokenKind::Newline, r"^\n");

        t
    }

    fn register(&mut self, kind: TokenKind, pattern: &str) {
        let re = Regex::new(pattern).expect("token rule pattern compiles");
        self.rules.push((kind, re));
    }

    /// Classifies the text at `pos`, trying rules in registration order
    fn classify(&self, rest: &str, allow_path: bool) -> Option<(TokenKind, String, String)> {
        for (kind, re) in &self.rules {
            if *kind == TokenKind::Path && !allow_path {
                continue;
            }
            if let Some(caps) = re.captures(rest) {
                let raw = caps.get(0).map(|m| m.as_str()).unwrap_or("").to_string();
                let value = caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
                return Some((*kind, value, raw));
            }
        }
        None
    }

    /// Scans `source` into tokens, dropping WHITESPACE and COMMENT
    pub fn tokenize(&self, source: &str) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        let mut pos = 0;
        let mut line = 1;
        let mut col = 1;
        let mut after_load = false;

        while pos < source.len() {
            let rest = &source[pos..];
            let (kind, value, raw) = match self.classify(rest, after_load) {
                Some(classified) => classified,
                None => {
                    return Err(LexError {
                        line,
                        col,
                        text: rest.chars().take(10).collect(),
                    });
                }
            };

            if kind != TokenKind::Whitespace && kind != TokenKind::Comment {
                tokens.push(Token {
                    kind,
                    value,
                    line,
                    col,
                    raw: raw.clone(),
                });
            }
            after_load = kind == TokenKind::Load;

            pos += raw.len();
            if kind == TokenKind::Newline {
                line += 1;
                col = 1;
            } else {
                col += raw.chars().count();
            }
        }

        // always terminate the final statement
        tokens.push(Token {
            kind: TokenKind::Newline,
            value: String::new(),
            line,
            col,
            raw: "\n".to_string(),
        });

        Ok(tokens)
    }
}

/// Tokenizes DBN source text with the standard rule table
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Tokenizer::new().tokenize(source)
}
