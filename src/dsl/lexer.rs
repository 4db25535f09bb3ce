//! Pull lexer for Weft source.
//!
//! The scanner hands out one lexeme at a time on demand. It tracks line
//! numbers across `\n`, `\r`, and `\r\n`, strips `//` and `/* */`
//! comments, honours `#line` directives that rewrite the current line
//! and filename, and keeps a small pushback ring so the parser can put
//! tokens back. Configuration blobs are captured raw with
//! [`Lexer::lex_config`] rather than tokenised.
//!
//! Lexical errors are reported through the sink and the scanner
//! resynchronises; tokenisation never stops early.

use super::error::ErrorSink;
use super::token::{LexKind, Lexeme};

/// Pushback capacity. The parser needs at most two tokens of lookahead,
/// implemented by repeated `lex`/`unlex` pairs.
const PUSHBACK: usize = 8;

pub struct Lexer<'src> {
    source: &'src str,
    data: &'src [u8],
    pos: usize,
    lineno: u32,
    filename: String,
    original_filename: String,
    ring: [Lexeme<'src>; PUSHBACK],
    /// Next ring slot to read.
    head: usize,
    /// Next ring slot to fill.
    tail: usize,
}

impl<'src> Lexer<'src> {
    /// An empty `filename` yields landmarks of the form `line 12`; a
    /// real one is normalised to end with `:` so landmarks read
    /// `file.weft:12`.
    pub fn new(source: &'src str, filename: &str) -> Self {
        let filename = if filename.is_empty() {
            "line ".to_string()
        } else if filename.ends_with(':') || filename.ends_with(char::is_whitespace) {
            filename.to_string()
        } else {
            format!("{filename}:")
        };
        Self {
            source,
            data: source.as_bytes(),
            pos: 0,
            lineno: 1,
            original_filename: filename.clone(),
            filename,
            ring: [Lexeme::eof(); PUSHBACK],
            head: 0,
            tail: 0,
        }
    }

    /// `file:line` tag for diagnostics at the current position.
    pub fn landmark(&self) -> String {
        format!("{}{}", self.filename, self.lineno)
    }

    fn skip_line(&mut self, mut pos: usize) -> usize {
        self.lineno += 1;
        while pos < self.data.len() {
            match self.data[pos] {
                b'\n' => return pos + 1,
                b'\r' => {
                    if pos + 1 < self.data.len() && self.data[pos + 1] == b'\n' {
                        return pos + 2;
                    }
                    return pos + 1;
                }
                _ => pos += 1,
            }
        }
        self.lineno -= 1;
        self.data.len()
    }

    fn skip_slash_star(&mut self, mut pos: usize, errh: &mut dyn ErrorSink) -> usize {
        while pos < self.data.len() {
            match self.data[pos] {
                b'\n' => self.lineno += 1,
                b'\r' => {
                    if pos + 1 < self.data.len() && self.data[pos + 1] == b'\n' {
                        pos += 1;
                    }
                    self.lineno += 1;
                }
                b'*' if pos + 1 < self.data.len() && self.data[pos + 1] == b'/' => {
                    return pos + 2;
                }
                _ => {}
            }
            pos += 1;
        }
        errh.error(&self.landmark(), "unterminated comment");
        self.data.len()
    }

    /// `#` directives: optional `line` keyword, the next line's number
    /// minus one, and an optional quoted filename (empty restores the
    /// original). Anything else is an error; the scanner picks up again
    /// at the next line.
    fn process_line_directive(&mut self, mut pos: usize, errh: &mut dyn ErrorSink) -> usize {
        let data = self.data;
        let len = data.len();

        pos += 1;
        while pos < len && matches!(data[pos], b' ' | b'\t') {
            pos += 1;
        }
        if data[pos..].starts_with(b"line") && pos + 4 < len && matches!(data[pos + 4], b' ' | b'\t')
        {
            pos += 5;
            while pos < len && matches!(data[pos], b' ' | b'\t') {
                pos += 1;
            }
        }
        if pos >= len || !data[pos].is_ascii_digit() {
            errh.error(&self.landmark(), "unknown preprocessor directive");
            return self.skip_line(pos);
        }

        let mut lineno: u32 = 0;
        while pos < len && data[pos].is_ascii_digit() {
            lineno = lineno
                .saturating_mul(10)
                .saturating_add(u32::from(data[pos] - b'0'));
            pos += 1;
        }
        // the directive's own newline brings the counter to `lineno`
        self.lineno = lineno.saturating_sub(1);

        while pos < len && matches!(data[pos], b' ' | b'\t') {
            pos += 1;
        }
        if pos < len && data[pos] == b'"' {
            let mut name = Vec::new();
            pos += 1;
            while pos < len && !matches!(data[pos], b'"' | b'\n' | b'\r') {
                if data[pos] == b'\\' && pos + 1 < len && !matches!(data[pos + 1], b'\n' | b'\r') {
                    pos += 1;
                }
                name.push(data[pos]);
                pos += 1;
            }
            self.filename = if name.is_empty() {
                self.original_filename.clone()
            } else {
                format!("{}:", String::from_utf8_lossy(&name))
            };
        }

        // resynchronise at end of line; the newline itself is left for
        // the caller's whitespace loop to count
        while pos < len && !matches!(data[pos], b'\n' | b'\r') {
            pos += 1;
        }
        if pos + 1 < len && data[pos] == b'\r' && data[pos + 1] == b'\n' {
            pos += 1;
        }
        pos
    }

    /// True when only horizontal whitespace separates `pos` from the
    /// start of its line.
    fn at_line_start(&self, pos: usize) -> bool {
        let mut i = pos;
        while i > 0 && matches!(self.data[i - 1], b' ' | b'\t') {
            i -= 1;
        }
        i == 0 || matches!(self.data[i - 1], b'\n' | b'\r')
    }

    fn next_lexeme(&mut self, errh: &mut dyn ErrorSink) -> Lexeme<'src> {
        let len = self.data.len();
        let mut pos = self.pos;
        loop {
            while pos < len && self.data[pos].is_ascii_whitespace() {
                if self.data[pos] == b'\n' {
                    self.lineno += 1;
                } else if self.data[pos] == b'\r' {
                    if pos + 1 < len && self.data[pos + 1] == b'\n' {
                        pos += 1;
                    }
                    self.lineno += 1;
                }
                pos += 1;
            }
            if pos >= len {
                self.pos = len;
                return Lexeme::eof();
            }
            if self.data[pos] == b'/' && pos + 1 < len {
                match self.data[pos + 1] {
                    b'/' => pos = self.skip_line(pos + 2),
                    b'*' => pos = self.skip_slash_star(pos + 2, errh),
                    _ => break,
                }
            } else if self.data[pos] == b'#' && self.at_line_start(pos) {
                pos = self.process_line_directive(pos, errh);
            } else {
                break;
            }
        }

        let word_pos = pos;

        if self.data[pos].is_ascii_alphanumeric() || matches!(self.data[pos], b'_' | b'@') {
            pos += 1;
            while pos < len
                && (self.data[pos].is_ascii_alphanumeric()
                    || matches!(self.data[pos], b'_' | b'/' | b'@'))
            {
                if self.data[pos] == b'/'
                    && pos + 1 < len
                    && matches!(self.data[pos + 1], b'/' | b'*')
                {
                    break;
                }
                pos += 1;
            }
            self.pos = pos;
            let word = &self.source[word_pos..pos];
            let kind = match word {
                "connectiontunnel" => LexKind::Tunnel,
                "elementclass" => LexKind::ElementClass,
                "require" => LexKind::Require,
                _ => LexKind::Ident,
            };
            return Lexeme::new(kind, word);
        }

        if self.data[pos] == b'$' {
            let mut end = pos + 1;
            while end < len && (self.data[end].is_ascii_alphanumeric() || self.data[end] == b'_') {
                end += 1;
            }
            if end > pos + 1 {
                self.pos = end;
                return Lexeme::new(LexKind::Variable, &self.source[pos..end]);
            }
        }

        if pos + 1 < len {
            let kind = match &self.data[pos..pos + 2] {
                b"->" => Some(LexKind::Arrow),
                b"::" => Some(LexKind::DoubleColon),
                b"||" => Some(LexKind::DoubleBar),
                _ => None,
            };
            if let Some(kind) = kind {
                self.pos = pos + 2;
                return Lexeme::new(kind, &self.source[pos..pos + 2]);
            }
        }
        if pos + 2 < len && &self.data[pos..pos + 3] == b"..." {
            self.pos = pos + 3;
            return Lexeme::new(LexKind::Ellipsis, &self.source[pos..pos + 3]);
        }

        let c = self.source[pos..].chars().next().unwrap_or('\0');
        let clen = c.len_utf8().max(1);
        self.pos = pos + clen;
        Lexeme::new(LexKind::Char(c), &self.source[pos..pos + clen])
    }

    /// Pull one lexeme, honouring pushback.
    pub fn lex(&mut self, errh: &mut dyn ErrorSink) -> Lexeme<'src> {
        let slot = self.head;
        if self.head == self.tail {
            self.ring[slot] = self.next_lexeme(errh);
            self.tail = (self.tail + 1) % PUSHBACK;
        }
        self.head = (self.head + 1) % PUSHBACK;
        self.ring[slot]
    }

    /// Push one lexeme back; the next `lex` returns it again. Pushing
    /// more than the ring holds is a programming error.
    pub fn unlex(&mut self, t: Lexeme<'src>) {
        self.ring[self.tail] = t;
        self.tail = (self.tail + 1) % PUSHBACK;
        debug_assert_ne!(self.tail, self.head, "lexer pushback overflow");
    }

    /// Expect `kind`; on mismatch report the expectation and push the
    /// token back.
    pub fn expect(&mut self, kind: LexKind, errh: &mut dyn ErrorSink) -> bool {
        let t = self.lex(errh);
        if t.is(kind) {
            return true;
        }
        errh.error(&self.landmark(), &format!("expected {kind}"));
        self.unlex(t);
        false
    }

    /// Capture a raw configuration blob: everything from the current
    /// position up to the parenthesis balancing the `(` just consumed.
    /// Nested parentheses, both quote styles (`\"` and `\$` escaped
    /// inside double quotes), and comments are respected; the closing
    /// `)` is left in the stream.
    pub fn lex_config(&mut self, errh: &mut dyn ErrorSink) -> &'src str {
        debug_assert_eq!(self.head, self.tail, "lex_config with buffered lookahead");
        let len = self.data.len();
        let config_pos = self.pos;
        let mut pos = self.pos;
        let mut paren_depth = 1u32;
        let mut quote: Option<u8> = None;
        while pos < len {
            let c = self.data[pos];
            match c {
                b'(' if quote.is_none() => paren_depth += 1,
                b')' if quote.is_none() => {
                    paren_depth -= 1;
                    if paren_depth == 0 {
                        break;
                    }
                }
                b'\n' => self.lineno += 1,
                b'\r' => {
                    if pos + 1 < len && self.data[pos + 1] == b'\n' {
                        pos += 1;
                    }
                    self.lineno += 1;
                }
                b'/' if quote.is_none() && pos + 1 < len => {
                    if self.data[pos + 1] == b'/' {
                        pos = self.skip_line(pos + 2) - 1;
                    } else if self.data[pos + 1] == b'*' {
                        pos = self.skip_slash_star(pos + 2, errh) - 1;
                    }
                }
                b'\'' | b'"' if quote.is_none() => quote = Some(c),
                b'\\'
                    if quote == Some(b'"')
                        && pos + 1 < len
                        && matches!(self.data[pos + 1], b'"' | b'$') =>
                {
                    pos += 1;
                }
                _ if quote == Some(c) => quote = None,
                _ => {}
            }
            pos += 1;
        }
        if quote.is_some() {
            errh.error(&self.landmark(), "unterminated string");
        }
        self.pos = pos;
        &self.source[config_pos..pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::error::ErrorCollector;

    fn lex_all(src: &str) -> Vec<(LexKind, String)> {
        let mut errh = ErrorCollector::new();
        let mut lexer = Lexer::new(src, "t");
        let mut out = Vec::new();
        loop {
            let t = lexer.lex(&mut errh);
            if t.is(LexKind::Eof) {
                break;
            }
            out.push((t.kind, t.text.to_string()));
        }
        out
    }

    #[test]
    fn identifiers_allow_slashes_but_comments_win() {
        let tokens = lex_all("a/b a//comment\nc/* x */d a/");
        let texts: Vec<&str> = tokens.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["a/b", "a", "c", "d", "a/"]);
        assert!(tokens.iter().all(|(k, _)| *k == LexKind::Ident));
    }

    #[test]
    fn multi_char_tokens_and_keywords() {
        let tokens = lex_all("x -> y :: || ... elementclass connectiontunnel require $v $ [2]");
        let kinds: Vec<LexKind> = tokens.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                LexKind::Ident,
                LexKind::Arrow,
                LexKind::Ident,
                LexKind::DoubleColon,
                LexKind::DoubleBar,
                LexKind::Ellipsis,
                LexKind::ElementClass,
                LexKind::Tunnel,
                LexKind::Require,
                LexKind::Variable,
                LexKind::Char('$'),
                LexKind::Char('['),
                LexKind::Ident,
                LexKind::Char(']'),
            ]
        );
    }

    #[test]
    fn line_counting_and_directives() {
        let mut errh = ErrorCollector::new();
        let mut lexer = Lexer::new("a\r\nb\n#line 40 \"other\"\nc\n# 7\nd", "t");
        assert_eq!(lexer.lex(&mut errh).text, "a");
        assert_eq!(lexer.landmark(), "t:1");
        assert_eq!(lexer.lex(&mut errh).text, "b");
        assert_eq!(lexer.landmark(), "t:2");
        assert_eq!(lexer.lex(&mut errh).text, "c");
        assert_eq!(lexer.landmark(), "other:40");
        assert_eq!(lexer.lex(&mut errh).text, "d");
        assert_eq!(lexer.landmark(), "other:7");
        assert_eq!(errh.nerrors(), 0);
    }

    #[test]
    fn empty_directive_filename_restores_original() {
        let mut errh = ErrorCollector::new();
        let mut lexer = Lexer::new("#line 5 \"x\"\na\n#line 9 \"\"\nb", "t");
        assert_eq!(lexer.lex(&mut errh).text, "a");
        assert_eq!(lexer.landmark(), "x:5");
        assert_eq!(lexer.lex(&mut errh).text, "b");
        assert_eq!(lexer.landmark(), "t:9");
    }

    #[test]
    fn bad_directive_reports_and_resynchronises() {
        let mut errh = ErrorCollector::new();
        let mut lexer = Lexer::new("#pragma whatever\nok", "t");
        assert_eq!(lexer.lex(&mut errh).text, "ok");
        assert_eq!(errh.nerrors(), 1);
        assert!(errh.diagnostics()[0]
            .message
            .contains("unknown preprocessor directive"));
    }

    #[test]
    fn default_filename_is_line_prefix() {
        let mut errh = ErrorCollector::new();
        let mut lexer = Lexer::new("x", "");
        lexer.lex(&mut errh);
        assert_eq!(lexer.landmark(), "line 1");
    }

    #[test]
    fn pushback_round_trip() {
        let mut errh = ErrorCollector::new();
        let mut lexer = Lexer::new("a -> b", "t");
        let a = lexer.lex(&mut errh);
        let arrow = lexer.lex(&mut errh);
        lexer.unlex(arrow);
        assert_eq!(lexer.lex(&mut errh).kind, LexKind::Arrow);
        assert_eq!(lexer.lex(&mut errh).text, "b");
        assert_eq!(a.text, "a");
    }

    #[test]
    fn config_capture_respects_nesting_and_quotes() {
        let mut errh = ErrorCollector::new();
        let mut lexer = Lexer::new("q(RATE 10, f(1, 2), \"a)b\", 'c)d') rest", "t");
        assert_eq!(lexer.lex(&mut errh).text, "q");
        assert!(lexer.lex(&mut errh).is_char('('));
        let config = lexer.lex_config(&mut errh);
        assert_eq!(config, "RATE 10, f(1, 2), \"a)b\", 'c)d'");
        assert!(lexer.lex(&mut errh).is_char(')'));
        assert_eq!(lexer.lex(&mut errh).text, "rest");
    }

    #[test]
    fn config_counts_lines_and_keeps_comments() {
        let mut errh = ErrorCollector::new();
        let mut lexer = Lexer::new("q(a /* )\n) */ b\n)", "t");
        lexer.lex(&mut errh);
        lexer.lex(&mut errh);
        let config = lexer.lex_config(&mut errh);
        assert!(config.contains("a /* )"));
        assert_eq!(lexer.landmark(), "t:3");
    }

    #[test]
    fn expect_reports_and_pushes_back() {
        let mut errh = ErrorCollector::new();
        let mut lexer = Lexer::new("a", "t");
        assert!(!lexer.expect(LexKind::Arrow, &mut errh));
        assert_eq!(errh.nerrors(), 1);
        assert_eq!(lexer.lex(&mut errh).text, "a");
    }
}
