//! Lexemes produced by the Weft lexer.

use std::fmt;

/// The kind of a lexeme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexKind {
    Eof,
    /// `[A-Za-z0-9_@]` then `[A-Za-z0-9_@/]`, where `//` and `/*`
    /// terminate the word so comments win.
    Ident,
    /// `$name` configuration variable.
    Variable,
    /// `->`
    Arrow,
    /// `::`
    DoubleColon,
    /// `||`
    DoubleBar,
    /// `...`
    Ellipsis,
    /// `connectiontunnel`
    Tunnel,
    /// `elementclass`
    ElementClass,
    /// `require`
    Require,
    /// Any other single character.
    Char(char),
}

impl fmt::Display for LexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LexKind::Eof => "end of file",
            LexKind::Ident => "identifier",
            LexKind::Variable => "variable",
            LexKind::Arrow => "'->'",
            LexKind::DoubleColon => "'::'",
            LexKind::DoubleBar => "'||'",
            LexKind::Ellipsis => "'...'",
            LexKind::Tunnel => "'connectiontunnel'",
            LexKind::ElementClass => "'elementclass'",
            LexKind::Require => "'require'",
            LexKind::Char(c) => return write!(f, "'{c}'"),
        };
        f.write_str(name)
    }
}

/// A lexeme: kind plus the source text it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lexeme<'src> {
    pub kind: LexKind,
    pub text: &'src str,
}

impl<'src> Lexeme<'src> {
    pub fn new(kind: LexKind, text: &'src str) -> Self {
        Self { kind, text }
    }

    pub fn eof() -> Self {
        Self {
            kind: LexKind::Eof,
            text: "",
        }
    }

    pub fn is(&self, kind: LexKind) -> bool {
        self.kind == kind
    }

    pub fn is_char(&self, c: char) -> bool {
        self.kind == LexKind::Char(c)
    }
}

impl Default for Lexeme<'_> {
    fn default() -> Self {
        Self::eof()
    }
}
