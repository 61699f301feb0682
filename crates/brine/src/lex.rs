//! Regex-driven tokenizer.
//!
//! The token stream comes in two flavors: the full stream keeps comments and
//! whitespace for syntax-highlighting consumers; [`significant`] filters them
//! out for the parser.

use std::sync::LazyLock;

use regex::Regex;
use strum::{Display, IntoStaticStr};

use crate::parse::{ParseError, ParseErrorKind};

/// Token classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum TokenKind {
    Comment,
    Whitespace,
    LPar,
    RPar,
    LBr,
    RBr,
    Int,
    StrDouble,
    StrSingle,
    Atom,
    Name,
}

impl TokenKind {
    /// Whether the parser should see this token.
    pub fn is_significant(self) -> bool {
        !matches!(self, Self::Comment | Self::Whitespace)
    }
}

/// A `(kind, text, offset)` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offset of the token in the source.
    pub offset: usize,
}

impl Token {
    /// Byte offset one past the end of the token.
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }
}

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?x)
          (?P<comment>    \#[^\n]*                  )
        | (?P<whitespace> \s+                       )
        | (?P<lpar>       \(                        )
        | (?P<rpar>       \)                        )
        | (?P<lbr>        \{                        )
        | (?P<rbr>        \}                        )
        | (?P<strd>       "(?:\\.|[^"\\])*"         )
        | (?P<strs>       '(?:\\.|[^'\\])*'         )
        | (?P<int>        [0-9]+                    )
        | (?P<atom>       :[^\s(){}"'\#]+           )
        | (?P<name>       [^\s(){}"'\#:][^\s(){}"'\#]*)
        "#,
    )
    .expect("token pattern is valid")
});

static SIGNED_INT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?[0-9]+$").expect("int pattern is valid"));

/// Tokenizes `source` into the full stream, comments and whitespace included.
///
/// A character no token class matches is a parse error. A `Name` that parses
/// entirely as an optionally-signed integer is reclassified as `Int`.
pub fn lex(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut position = 0;
    for captures in TOKEN_RE.captures_iter(source) {
        let overall = captures.get(0).expect("group 0 always participates");
        if overall.start() != position {
            return Err(ParseError::malformed(position));
        }
        position = overall.end();

        let (kind, matched) = [
            (TokenKind::Comment, "comment"),
            (TokenKind::Whitespace, "whitespace"),
            (TokenKind::LPar, "lpar"),
            (TokenKind::RPar, "rpar"),
            (TokenKind::LBr, "lbr"),
            (TokenKind::RBr, "rbr"),
            (TokenKind::StrDouble, "strd"),
            (TokenKind::StrSingle, "strs"),
            (TokenKind::Int, "int"),
            (TokenKind::Atom, "atom"),
            (TokenKind::Name, "name"),
        ]
        .into_iter()
        .find_map(|(kind, group)| captures.name(group).map(|m| (kind, m)))
        .expect("one named group always participates");

        let kind = if kind == TokenKind::Name && SIGNED_INT_RE.is_match(matched.as_str()) {
            TokenKind::Int
        } else {
            kind
        };

        tokens.push(Token {
            kind,
            text: matched.as_str().to_owned(),
            offset: matched.start(),
        });
    }
    if position != source.len() {
        return Err(ParseError::malformed(position));
    }
    Ok(tokens)
}

/// Filters a token stream down to the tokens the parser consumes.
pub fn significant(tokens: Vec<Token>) -> impl Iterator<Item = Token> {
    tokens.into_iter().filter(|token| token.kind.is_significant())
}

/// Decodes a quoted string token's text (quotes included) into its value.
///
/// Escapes follow the standard interpretation: `\n`, `\t`, `\r`, `\\`, `\"`,
/// `\'`, `\0`; an unknown escape passes the escaped character through.
pub fn unescape_string(text: &str) -> Result<String, ParseError> {
    let inner = &text[1..text.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => return Err(ParseError::new(ParseErrorKind::UnexpectedEof, 0, None, "a string literal")),
        }
    }
    Ok(out)
}
