//! Indentation-aware tokenizer.

use super::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// Body of an f-string with escapes already processed.
    FStr(String),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

/// Longest operators first so prefix matching picks the right one.
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=",
    "/=", "%=", "&=", "|=", "^=", "->", ":=", "<<", ">>", "+", "-", "*", "/", "%", "<", ">",
    "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "&", "|", "^", "~", "@",
];

/// Tokenize program text.
pub fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(src).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    brackets: Vec<(char, usize)>,
    at_line_start: bool,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            tokens: Vec::new(),
            indents: vec![0],
            brackets: Vec::new(),
            at_line_start: true,
        }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token {
            tok,
            line: self.line,
        });
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, message)
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        while self.pos < self.chars.len() {
            if self.at_line_start && self.brackets.is_empty() {
                if !self.indentation()? {
                    continue;
                }
            }
            let c = self.chars[self.pos];
            match c {
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '#' => self.skip_comment(),
                '\\' => {
                    match (self.peek(1), self.peek(2)) {
                        (Some('\n'), _) => self.pos += 2,
                        (Some('\r'), Some('\n')) => self.pos += 3,
                        _ => return Err(self.err("unexpected character after line continuation character")),
                    }
                    self.line += 1;
                }
                '\n' => {
                    if self.brackets.is_empty() {
                        self.end_logical_line();
                        self.at_line_start = true;
                    }
                    self.pos += 1;
                    self.line += 1;
                }
                '0'..='9' => self.number()?,
                '.' if self.peek(1).is_some_and(|d| d.is_ascii_digit()) => self.number()?,
                '"' | '\'' => self.string(false, false)?,
                c if c.is_alphabetic() || c == '_' => self.word()?,
                _ => self.operator()?,
            }
        }

        if let Some((open, line)) = self.brackets.last() {
            return Err(ParseError::new(*line, format!("'{open}' was never closed")));
        }
        self.end_logical_line();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(self.tokens)
    }

    /// Handle leading whitespace of a physical line. Returns `false` when the
    /// line was blank or a comment and has been consumed.
    fn indentation(&mut self) -> Result<bool, ParseError> {
        let mut col = 0usize;
        while let Some(c) = self.peek(0) {
            match c {
                ' ' => col += 1,
                '\t' => col = (col / 8 + 1) * 8,
                '\x0c' | '\r' => {}
                _ => break,
            }
            self.pos += 1;
        }
        match self.peek(0) {
            None => return Ok(false),
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                return Ok(false);
            }
            Some('#') => {
                self.skip_comment();
                return Ok(false);
            }
            _ => {}
        }
        self.at_line_start = false;

        let current = self.indents.last().copied().unwrap_or(0);
        if col > current {
            if self.tokens.is_empty() {
                return Err(self.err("unexpected indent"));
            }
            self.indents.push(col);
            self.push(Tok::Indent);
        } else if col < current {
            while self.indents.last().is_some_and(|&top| top > col) {
                self.indents.pop();
                self.push(Tok::Dedent);
            }
            if self.indents.last().copied() != Some(col) {
                return Err(self.err("unindent does not match any outer indentation level"));
            }
        }
        Ok(true)
    }

    fn end_logical_line(&mut self) {
        let needs = self
            .tokens
            .last()
            .is_some_and(|t| !matches!(t.tok, Tok::Newline | Tok::Indent | Tok::Dedent));
        if needs {
            self.push(Tok::Newline);
        }
    }

    fn skip_comment(&mut self) {
        while self.peek(0).is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
    }

    fn word(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        while self
            .peek(0)
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        if matches!(self.peek(0), Some('"') | Some('\'')) {
            let prefix = word.to_ascii_lowercase();
            if matches!(
                prefix.as_str(),
                "r" | "u" | "b" | "f" | "rb" | "br" | "fr" | "rf"
            ) {
                return self.string(prefix.contains('r'), prefix.contains('f'));
            }
        }
        self.push(Tok::Name(word));
        Ok(())
    }

    fn number(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x') | Some('X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self
                .peek(0)
                .is_some_and(|c| c.is_ascii_hexdigit() || c == '_')
            {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos]
                .iter()
                .filter(|c| **c != '_')
                .collect();
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|_| self.err("invalid hexadecimal literal"))?;
            self.push(Tok::Int(value));
            return Ok(());
        }

        let mut is_float = false;
        self.digits();
        if self.peek(0) == Some('.') && !self.peek(1).is_some_and(|c| c.is_alphabetic() || c == '_') {
            is_float = true;
            self.pos += 1;
            self.digits();
        }
        if matches!(self.peek(0), Some('e') | Some('E')) {
            let sign = usize::from(matches!(self.peek(1), Some('+') | Some('-')));
            if self.peek(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                self.digits();
            }
        }
        if self.peek(0).is_some_and(|c| c == 'j' || c == 'J') {
            return Err(self.err("complex literals are not supported"));
        }
        if self.peek(0).is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(self.err("invalid decimal literal"));
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.err(format!("invalid float literal {text}")))?;
            self.push(Tok::Float(value));
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| self.err("integer literal too large"))?;
            self.push(Tok::Int(value));
        }
        Ok(())
    }

    fn digits(&mut self) {
        while self
            .peek(0)
            .is_some_and(|c| c.is_ascii_digit() || c == '_')
        {
            self.pos += 1;
        }
    }

    fn string(&mut self, raw: bool, fstring: bool) -> Result<(), ParseError> {
        let start_line = self.line;
        let quote = self.chars[self.pos];
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out = String::new();
        loop {
            let Some(c) = self.peek(0) else {
                return Err(ParseError::new(
                    start_line,
                    if triple {
                        "unterminated triple-quoted string literal"
                    } else {
                        "unterminated string literal"
                    },
                ));
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if c == '\n' {
                if !triple {
                    return Err(ParseError::new(start_line, "unterminated string literal"));
                }
                self.line += 1;
            }
            if c == '\\' {
                let Some(next) = self.peek(1) else {
                    self.pos += 1;
                    continue;
                };
                if raw {
                    out.push('\\');
                    out.push(next);
                    if next == '\n' {
                        self.line += 1;
                    }
                    self.pos += 2;
                    continue;
                }
                self.pos += 2;
                match next {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    '\\' => out.push('\\'),
                    '\'' => out.push('\''),
                    '"' => out.push('"'),
                    '\n' => self.line += 1,
                    'x' => {
                        let hex: String = self.chars.iter().skip(self.pos).take(2).collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .map_err(|_| self.err("invalid \\x escape"))?;
                        out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                        self.pos += 2;
                    }
                    'u' => {
                        let hex: String = self.chars.iter().skip(self.pos).take(4).collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .map_err(|_| self.err("invalid \\u escape"))?;
                        out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                        self.pos += 4;
                    }
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
                continue;
            }
            out.push(c);
            self.pos += 1;
        }

        let tok = if fstring { Tok::FStr(out) } else { Tok::Str(out) };
        self.tokens.push(Token {
            tok,
            line: start_line,
        });
        Ok(())
    }

    fn operator(&mut self) -> Result<(), ParseError> {
        let c = self.chars[self.pos];
        let op = OPERATORS
            .iter()
            .find(|op| {
                op.chars()
                    .enumerate()
                    .all(|(i, oc)| self.peek(i) == Some(oc))
            })
            .copied()
            .ok_or_else(|| self.err(format!("invalid character '{c}'")))?;

        match op {
            "(" | "[" | "{" => self.brackets.push((c, self.line)),
            ")" | "]" | "}" => {
                let expected = match op {
                    ")" => '(',
                    "]" => '[',
                    _ => '{',
                };
                match self.brackets.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, _)) => {
                        return Err(self.err(format!(
                            "closing parenthesis '{op}' does not match opening parenthesis '{open}'"
                        )))
                    }
                    None => return Err(self.err(format!("unmatched '{op}'"))),
                }
            }
            _ => {}
        }
        self.pos += op.chars().count();
        self.push(Tok::Op(op));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_simple_assignment() {
        assert_eq!(
            kinds("result = 1"),
            vec![
                Tok::Name("result".into()),
                Tok::Op("="),
                Tok::Int(1),
                Tok::Newline,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_indent_and_dedent() {
        let toks = kinds("if x:\n    y = 1\nz = 2\n");
        assert!(toks.contains(&Tok::Indent));
        assert!(toks.contains(&Tok::Dedent));
    }

    #[test]
    fn test_brackets_join_lines() {
        let toks = kinds("x = [1,\n     2]\n");
        let newlines = toks.iter().filter(|t| **t == Tok::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn test_string_escapes_and_prefixes() {
        assert_eq!(kinds("'a\\nb'")[0], Tok::Str("a\nb".into()));
        assert_eq!(kinds("r'a\\nb'")[0], Tok::Str("a\\nb".into()));
        assert_eq!(kinds("f'{x}'")[0], Tok::FStr("{x}".into()));
        assert_eq!(kinds("'''a\nb'''")[0], Tok::Str("a\nb".into()));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("1_000")[0], Tok::Int(1000));
        assert_eq!(kinds("2.5e3")[0], Tok::Float(2500.0));
        assert_eq!(kinds(".5")[0], Tok::Float(0.5));
        assert_eq!(kinds("0xff")[0], Tok::Int(255));
    }

    #[test]
    fn test_comments_and_blank_lines_are_skipped() {
        let toks = kinds("# header\n\nx = 1  # trailing\n");
        assert_eq!(toks[0], Tok::Name("x".into()));
    }

    #[test]
    fn test_line_numbers() {
        let toks = tokenize("a = 1\nb = 2\n").unwrap();
        let b = toks.iter().find(|t| t.tok == Tok::Name("b".into())).unwrap();
        assert_eq!(b.line, 2);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("x = 'abc\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_unclosed_bracket_reports_open_line() {
        let err = tokenize("x = (1,\n2\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("never closed"));
    }

    #[test]
    fn test_bad_dedent() {
        let err = tokenize("if x:\n    a = 1\n  b = 2\n").unwrap_err();
        assert!(err.message.contains("unindent"));
    }
}
