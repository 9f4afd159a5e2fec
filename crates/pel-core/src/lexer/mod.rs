//! Lexical analysis: UTF-8 source bytes to a lazy sequence of tokens.
//!
//! The lexer never panics. A byte sequence that cannot form a valid token
//! becomes `TokenKind::Error` and lexing continues (spec §4.1).

pub mod token;

use crate::error::Span;
pub use token::{keyword, Token, TokenKind};

pub struct Lexer<'src> {
    chars: std::iter::Peekable<std::str::Chars<'src>>,
    rest: &'src str,
    line: u32,
    col: u32,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Lexer {
            chars: source.chars().peekable(),
            rest: source,
            line: 1,
            col: 1,
        }
    }

    /// Lex the entire source into a token vector, always terminated by `Eof`.
    pub fn tokenize(source: &'src str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token();
            let done = tok.kind == TokenKind::Eof;
            out.push(tok);
            if done {
                break;
            }
        }
        out
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.col)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.rest = &self.rest[c.len_utf8()..];
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest.chars().nth(n)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_nth(1) == Some('/') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.bump();
                    }
                }
                Some('/') if self.peek_nth(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            None => break,
                            Some('*') if self.peek_nth(1) == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_trivia();
        let start = self.span();

        let Some(c) = self.peek() else {
            return Token::new(TokenKind::Eof, "", start);
        };

        if c.is_ascii_digit() {
            return self.lex_number(start);
        }
        if c == '_' || c.is_alphabetic() {
            return self.lex_ident(start);
        }
        if c == '"' {
            return self.lex_string(start);
        }

        self.bump();
        let (kind, lexeme): (TokenKind, String) = match c {
            '+' => (TokenKind::Plus, "+".into()),
            '-' => {
                if self.peek() == Some('>') {
                    self.bump();
                    (TokenKind::Arrow, "->".into())
                } else {
                    (TokenKind::Minus, "-".into())
                }
            }
            '*' => {
                if self.peek() == Some('*') {
                    self.bump();
                    (TokenKind::StarStar, "**".into())
                } else {
                    (TokenKind::Star, "*".into())
                }
            }
            '/' => (TokenKind::Slash, "/".into()),
            '=' => {
                if self.peek() == Some('=') {
                    self.bump();
                    (TokenKind::Eq, "==".into())
                } else {
                    (TokenKind::Assign, "=".into())
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    (TokenKind::NotEq, "!=".into())
                } else {
                    (TokenKind::Error("!".into()), "!".into())
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    (TokenKind::Lte, "<=".into())
                } else {
                    (TokenKind::Lt, "<".into())
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    (TokenKind::Gte, ">=".into())
                } else {
                    (TokenKind::Gt, ">".into())
                }
            }
            '~' => (TokenKind::Tilde, "~".into()),
            ':' => (TokenKind::Colon, ":".into()),
            '.' => {
                if self.peek() == Some('.') {
                    self.bump();
                    (TokenKind::DotDot, "..".into())
                } else {
                    (TokenKind::Dot, ".".into())
                }
            }
            ',' => (TokenKind::Comma, ",".into()),
            '(' => (TokenKind::LParen, "(".into()),
            ')' => (TokenKind::RParen, ")".into()),
            '{' => (TokenKind::LBrace, "{".into()),
            '}' => (TokenKind::RBrace, "}".into()),
            '[' => (TokenKind::LBracket, "[".into()),
            ']' => (TokenKind::RBracket, "]".into()),
            other => (TokenKind::Error(other.to_string()), other.to_string()),
        };
        Token::new(kind, lexeme, start)
    }

    fn lex_ident(&mut self, start: Span) -> Token {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let kind = keyword(&s).unwrap_or_else(|| TokenKind::Ident(s.clone()));
        Token::new(kind, s, start)
    }

    fn lex_string(&mut self, start: Span) -> Token {
        self.bump(); // opening quote
        let mut s = String::new();
        loop {
            match self.bump() {
                None => {
                    return Token::new(
                        TokenKind::Error(s.clone()),
                        format!("\"{s}"),
                        start,
                    )
                }
                Some('"') => break,
                Some('\\') => {
                    if let Some(escaped) = self.bump() {
                        s.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                    }
                }
                Some(c) => s.push(c),
            }
        }
        let lexeme = format!("\"{s}\"");
        Token::new(TokenKind::Str(s), lexeme, start)
    }

    fn lex_number(&mut self, start: Span) -> Token {
        let mut lexeme = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                lexeme.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            lexeme.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    lexeme.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E'))
            && self
                .peek_nth(1)
                .is_some_and(|c| c.is_ascii_digit() || c == '+' || c == '-')
        {
            lexeme.push(self.bump().unwrap());
            if matches!(self.peek(), Some('+') | Some('-')) {
                lexeme.push(self.bump().unwrap());
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    lexeme.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }

        let value: f64 = match lexeme.parse() {
            Ok(v) => v,
            Err(_) => return Token::new(TokenKind::Error(lexeme.clone()), lexeme, start),
        };

        // Optional unit suffix directly attached (`0.05/1mo`) or separated
        // by plain spaces on the same line (`100 USD`). A `/` here is only a
        // suffix marker when immediately followed by a digit or letter with
        // no space, so `100 / 2` (division) is unaffected.
        let tok = Token::new(TokenKind::Number(value), lexeme, start);
        match self.try_lex_unit_suffix() {
            Some(suffix) => tok.with_unit_suffix(suffix),
            None => tok,
        }
    }

    fn try_lex_unit_suffix(&mut self) -> Option<String> {
        if self.peek() == Some('/') && self.peek_nth(1).is_some_and(|c| c.is_alphanumeric()) {
            let mut s = String::new();
            s.push(self.bump().unwrap());
            while let Some(c) = self.peek() {
                if c.is_alphanumeric() {
                    s.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            return Some(s);
        }

        let mut lookahead = self.rest.chars();
        let mut spaces = 0usize;
        for c in lookahead.by_ref() {
            if c == ' ' || c == '\t' {
                spaces += 1;
            } else {
                break;
            }
        }
        if spaces == 0 {
            if let Some(c) = self.peek() {
                if c.is_alphabetic() {
                    return Some(self.consume_ident_suffix());
                }
            }
            return None;
        }
        let next_non_space = self.peek_nth(spaces)?;
        if next_non_space.is_alphabetic() {
            for _ in 0..spaces {
                self.bump();
            }
            return Some(self.consume_ident_suffix());
        }
        None
    }

    fn consume_ident_suffix(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::tokenize(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_keywords_and_idents() {
        let toks = kinds("param model x");
        assert_eq!(
            toks,
            vec![
                TokenKind::Param,
                TokenKind::Model,
                TokenKind::Ident("x".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_number_with_space_separated_unit() {
        let toks = Lexer::tokenize("100 USD");
        assert_eq!(toks[0].kind, TokenKind::Number(100.0));
        assert_eq!(toks[0].unit_suffix.as_deref(), Some("USD"));
    }

    #[test]
    fn lexes_number_with_attached_slash_unit() {
        let toks = Lexer::tokenize("0.05/1mo");
        assert_eq!(toks[0].kind, TokenKind::Number(0.05));
        assert_eq!(toks[0].unit_suffix.as_deref(), Some("/1mo"));
    }

    #[test]
    fn division_is_not_mistaken_for_a_unit_suffix() {
        let toks = kinds("price / count");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("price".into()),
                TokenKind::Slash,
                TokenKind::Ident("count".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments() {
        let toks = kinds("1 // trailing\n/* block */ 2");
        assert_eq!(toks, vec![TokenKind::Number(1.0), TokenKind::Number(2.0), TokenKind::Eof]);
    }

    #[test]
    fn invalid_byte_yields_error_token_without_panicking() {
        let toks = kinds("1 @ 2");
        assert_eq!(
            toks,
            vec![
                TokenKind::Number(1.0),
                TokenKind::Error("@".into()),
                TokenKind::Number(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tracks_line_and_column() {
        let toks = Lexer::tokenize("a\nb");
        assert_eq!(toks[0].span, Span::new(1, 1));
        assert_eq!(toks[1].span, Span::new(2, 1));
    }
}
