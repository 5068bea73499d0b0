//! Tokenizer for postfix expressions.
//!
//! The lexer turns a raw expression string into a lazy sequence of typed tokens.
//! It keeps exactly one current token and moves forward on `advance()`, tracking the
//! 1-based line and column of every token for diagnostics.
//!
//! At each position the lexer tries, in order:
//! 1. A numeric literal: optional leading `-`, digits, at most one `.`
//! 2. An identifier: a letter followed by letters, digits or `_`
//! 3. A single-character operator from `+ - * / ^`
//! 4. Anything else becomes `Invalid`
//!
//! A `-` directly followed by a digit is always a signed literal, never a subtraction.
//! Classification of identifiers is purely lexical: `x` is the variable, `pi` and `e` are
//! named constants, everything else is a function name whose validity the tree builder checks.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::expr::BinaryOp;

/// A 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Kinds of tokens recognised by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Numeric literal, sign included
    Number(f64),
    /// The independent variable `x`
    Variable,
    /// `pi` or `e`
    NamedConstant(String),
    /// One of `+ - * / ^`
    Operator(BinaryOp),
    /// Any other identifier
    FunctionName(String),
    /// Terminal marker, repeated on every further `advance()`
    EndOfInput,
    /// A character no rule accepts
    Invalid(char),
}

/// A token together with the position of its first character.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Number(value) => write!(f, "NUMBER({value})"),
            TokenKind::Variable => write!(f, "VARIABLE(x)"),
            TokenKind::NamedConstant(name) => write!(f, "CONSTANT({name})"),
            TokenKind::Operator(op) => write!(f, "OPERATOR({})", op.symbol()),
            TokenKind::FunctionName(name) => write!(f, "FUNCTION({name})"),
            TokenKind::EndOfInput => write!(f, "EOF"),
            TokenKind::Invalid(ch) => write!(f, "ERROR({ch})"),
        }
    }
}

/// Streaming tokenizer over one expression string.
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
    current: Token,
    exhausted: bool,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer positioned at the first token of `input`.
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
            current: Token {
                kind: TokenKind::EndOfInput,
                position: Position::new(1, 1),
            },
            exhausted: false,
        };
        lexer.advance();
        lexer
    }

    /// The token the lexer is positioned at.
    pub fn current(&self) -> &Token {
        &self.current
    }

    /// Moves to the next token. Once `EndOfInput` is reached it stays there.
    pub fn advance(&mut self) {
        self.skip_whitespace();
        let position = self.location();

        let kind = match self.chars.peek().copied() {
            None => TokenKind::EndOfInput,
            Some(c) if self.starts_number(c) => self.lex_number(c),
            Some(c) if c.is_ascii_alphabetic() => self.lex_identifier(),
            Some(c) => {
                self.bump();
                match BinaryOp::from_symbol(c) {
                    Some(op) => TokenKind::Operator(op),
                    None => TokenKind::Invalid(c),
                }
            }
        };

        self.current = Token { kind, position };
    }

    fn location(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.bump();
        }
    }

    /// A literal starts with a digit, or with `-`/`.` directly followed by a digit.
    fn starts_number(&self, c: char) -> bool {
        if c.is_ascii_digit() {
            return true;
        }
        if c != '-' && c != '.' {
            return false;
        }
        let mut lookahead = self.chars.clone();
        lookahead.next();
        lookahead.next().is_some_and(|next| next.is_ascii_digit())
    }

    fn lex_number(&mut self, first: char) -> TokenKind {
        let mut literal = String::new();
        if first == '-' {
            literal.push('-');
            self.bump();
        }

        let mut seen_dot = false;
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                literal.push(c);
            } else if c == '.' && !seen_dot {
                seen_dot = true;
                literal.push(c);
            } else {
                break;
            }
            self.bump();
        }

        match literal.parse::<f64>() {
            Ok(value) => TokenKind::Number(value),
            Err(_) => TokenKind::Invalid(first),
        }
    }

    fn lex_identifier(&mut self) -> TokenKind {
        let mut name = String::new();
        while let Some(&c) = self.chars.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            name.push(c);
            self.bump();
        }

        match name.as_str() {
            "x" => TokenKind::Variable,
            "pi" | "e" => TokenKind::NamedConstant(name),
            _ => TokenKind::FunctionName(name),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    /// Yields every token up to and including the first `EndOfInput`.
    fn next(&mut self) -> Option<Token> {
        if self.exhausted {
            return None;
        }
        let token = self.current.clone();
        if token.kind == TokenKind::EndOfInput {
            self.exhausted = true;
        } else {
            self.advance();
        }
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input).map(|token| token.kind).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("3.5 x pi e + - * / ^ sin ctg"),
            vec![
                TokenKind::Number(3.5),
                TokenKind::Variable,
                TokenKind::NamedConstant("pi".to_string()),
                TokenKind::NamedConstant("e".to_string()),
                TokenKind::Operator(BinaryOp::Add),
                TokenKind::Operator(BinaryOp::Sub),
                TokenKind::Operator(BinaryOp::Mul),
                TokenKind::Operator(BinaryOp::Div),
                TokenKind::Operator(BinaryOp::Pow),
                TokenKind::FunctionName("sin".to_string()),
                TokenKind::FunctionName("ctg".to_string()),
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn test_minus_before_digit_is_a_literal() {
        assert_eq!(
            kinds("x -3 -"),
            vec![
                TokenKind::Variable,
                TokenKind::Number(-3.0),
                TokenKind::Operator(BinaryOp::Sub),
                TokenKind::EndOfInput,
            ]
        );
        // No whitespace needed: "x-2" is x followed by the literal -2.
        assert_eq!(
            kinds("x-2"),
            vec![TokenKind::Variable, TokenKind::Number(-2.0), TokenKind::EndOfInput]
        );
    }

    #[test]
    fn test_single_dot_per_literal() {
        assert_eq!(
            kinds("1.25.5 .5"),
            vec![
                TokenKind::Number(1.25),
                TokenKind::Number(0.5),
                TokenKind::Number(0.5),
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn test_identifiers_are_lexical() {
        assert_eq!(
            kinds("xy x_1 foo"),
            vec![
                TokenKind::FunctionName("xy".to_string()),
                TokenKind::FunctionName("x_1".to_string()),
                TokenKind::FunctionName("foo".to_string()),
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn test_invalid_character() {
        assert_eq!(
            kinds("x $"),
            vec![
                TokenKind::Variable,
                TokenKind::Invalid('$'),
                TokenKind::EndOfInput
            ]
        );
    }

    #[test]
    fn test_positions() {
        let tokens: Vec<Token> = Lexer::new("x x ^\nfoo").collect();
        assert_eq!(tokens[0].position, Position::new(1, 1));
        assert_eq!(tokens[1].position, Position::new(1, 3));
        assert_eq!(tokens[2].position, Position::new(1, 5));
        assert_eq!(tokens[3].position, Position::new(2, 1));
        assert_eq!(tokens[3].kind, TokenKind::FunctionName("foo".to_string()));
        assert_eq!(tokens[4].kind, TokenKind::EndOfInput);
        assert_eq!(tokens[4].position, Position::new(2, 4));
    }

    #[test]
    fn test_end_of_input_is_idempotent() {
        let mut lexer = Lexer::new("  ");
        assert_eq!(lexer.current().kind, TokenKind::EndOfInput);
        lexer.advance();
        lexer.advance();
        assert_eq!(lexer.current().kind, TokenKind::EndOfInput);
        assert_eq!(lexer.current().position, Position::new(1, 3));
    }

    #[test]
    fn test_token_display() {
        let tokens: Vec<String> = Lexer::new("-1.5 x ^ tan ?")
            .map(|token| token.to_string())
            .collect();
        assert_eq!(
            tokens,
            vec!["NUMBER(-1.5)", "VARIABLE(x)", "OPERATOR(^)", "FUNCTION(tan)", "ERROR(?)", "EOF"]
        );
    }
}
