//! Recursive-descent parser producing a flat instruction stream.
//!
//! `{ ... }` blocks nest as single `PutCode` instructions; `( ... )` tuples
//! emit their element instructions followed by `MakeVec(n)`. Inside a tuple,
//! bare names are data (atoms), not calls, and `:atoms` keep their leading
//! colon — that marker is what the pattern matcher keys on.

use std::{fmt, iter::Peekable};

use crate::{
    error::{ErrorKind, RunError},
    lex::{Token, TokenKind, lex, significant, unescape_string},
    value::{Instruction, Value},
};

/// What went wrong while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A character no token class matches.
    MalformedToken,
    /// A token that cannot appear in the current context.
    UnexpectedToken,
    /// The source ended inside an open block. The REPL uses this to request
    /// continuation lines.
    UnexpectedEof,
}

/// A parse failure with its position and context.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Byte offset of the offending token, or of the end of input.
    pub offset: usize,
    /// The offending token, for unexpected-token errors.
    pub token: Option<Token>,
    /// What was being parsed, e.g. "a code literal".
    pub context: &'static str,
}

impl ParseError {
    pub(crate) fn new(
        kind: ParseErrorKind,
        offset: usize,
        token: Option<Token>,
        context: &'static str,
    ) -> Self {
        Self {
            kind,
            offset,
            token,
            context,
        }
    }

    pub(crate) fn malformed(offset: usize) -> Self {
        Self::new(ParseErrorKind::MalformedToken, offset, None, "the token stream")
    }

    /// True when the failure was running out of input inside an open block.
    pub fn is_eof(&self) -> bool {
        self.kind == ParseErrorKind::UnexpectedEof
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParseErrorKind::MalformedToken => {
                write!(f, "malformed token at offset {}", self.offset)
            }
            ParseErrorKind::UnexpectedEof => {
                write!(f, "unexpected end of input while parsing {}", self.context)
            }
            ParseErrorKind::UnexpectedToken => match &self.token {
                Some(token) => write!(
                    f,
                    "unexpected token '{}' ({}) at offset {} while parsing {}",
                    token.text, token.kind, token.offset, self.context
                ),
                None => write!(f, "unexpected token at offset {} while parsing {}", self.offset, self.context),
            },
        }
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for RunError {
    fn from(err: ParseError) -> Self {
        Self::new(ErrorKind::ParseError, err.to_string())
    }
}

const CODE_CONTEXT: &str = "a code literal";
const VEC_CONTEXT: &str = "a tuple literal";

type Tokens<I> = Peekable<I>;

/// Parses source text into a flat instruction list.
pub fn parse(source: &str) -> Result<Vec<Instruction>, ParseError> {
    let mut tokens = significant(lex(source)?).peekable();
    let instructions = parse_code(&mut tokens, source, true)?;
    Ok(instructions)
}

fn parse_code<I: Iterator<Item = Token>>(
    tokens: &mut Tokens<I>,
    source: &str,
    top_level: bool,
) -> Result<Vec<Instruction>, ParseError> {
    let mut instructions = Vec::new();
    loop {
        let Some(token) = tokens.next() else {
            if top_level {
                return Ok(instructions);
            }
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedEof,
                source.len(),
                None,
                CODE_CONTEXT,
            ));
        };
        match token.kind {
            TokenKind::RBr if !top_level => return Ok(instructions),
            TokenKind::LBr => {
                let start = token.end();
                let body = parse_code(tokens, source, false)?;
                // the closing brace was just consumed; everything before it
                // is the block's own source text
                let end = find_block_end(source, start);
                instructions.push(Instruction::PutCode {
                    body: body.into(),
                    source: Some(source[token.offset..end].into()),
                });
            }
            TokenKind::LPar => {
                parse_vec(tokens, source, &mut instructions)?;
            }
            TokenKind::Int => instructions.push(Instruction::Put(parse_int(&token.text))),
            TokenKind::StrDouble | TokenKind::StrSingle => {
                instructions.push(Instruction::Put(Value::str(unescape_string(&token.text)?)));
            }
            TokenKind::Atom => instructions.push(Instruction::Put(Value::atom(&token.text[1..]))),
            TokenKind::Name => instructions.push(Instruction::CallByName(token.text.as_str().into())),
            _ => {
                let offset = token.offset;
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken,
                    offset,
                    Some(token),
                    CODE_CONTEXT,
                ));
            }
        }
    }
}

/// Parses a tuple, appending its element instructions plus the trailing
/// `MakeVec` to `instructions`.
fn parse_vec<I: Iterator<Item = Token>>(
    tokens: &mut Tokens<I>,
    source: &str,
    instructions: &mut Vec<Instruction>,
) -> Result<(), ParseError> {
    let mut count = 0usize;
    loop {
        let Some(token) = tokens.next() else {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedEof,
                source.len(),
                None,
                VEC_CONTEXT,
            ));
        };
        match token.kind {
            TokenKind::RPar => {
                instructions.push(Instruction::MakeVec(count));
                return Ok(());
            }
            TokenKind::LPar => {
                parse_vec(tokens, source, instructions)?;
                count += 1;
            }
            TokenKind::LBr => {
                let start = token.offset;
                let body = parse_code(tokens, source, false)?;
                let end = find_block_end(source, token.end());
                instructions.push(Instruction::PutCode {
                    body: body.into(),
                    source: Some(source[start..end].into()),
                });
                count += 1;
            }
            TokenKind::Int => {
                instructions.push(Instruction::Put(parse_int(&token.text)));
                count += 1;
            }
            TokenKind::StrDouble | TokenKind::StrSingle => {
                instructions.push(Instruction::Put(Value::str(unescape_string(&token.text)?)));
                count += 1;
            }
            // bare names inside (...) are data; :atoms keep the colon marker
            TokenKind::Name | TokenKind::Atom => {
                instructions.push(Instruction::Put(Value::atom(&token.text)));
                count += 1;
            }
            _ => {
                let offset = token.offset;
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken,
                    offset,
                    Some(token),
                    VEC_CONTEXT,
                ));
            }
        }
    }
}

fn parse_int(text: &str) -> Value {
    match text.parse::<i64>() {
        Ok(value) => Value::Int(value),
        Err(_) => Value::from_bigint(text.parse().expect("the lexer only classifies digit runs as ints")),
    }
}

/// Finds the end offset of the `{ ... }` block whose body starts at `start`,
/// by re-scanning brace depth. Used only to slice out source text for
/// display; the grammar itself was already validated.
fn find_block_end(source: &str, start: usize) -> usize {
    let mut depth = 1usize;
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    let mut in_comment = false;
    for (i, c) in source[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if in_comment {
            if c == '\n' {
                in_comment = false;
            }
            continue;
        }
        match in_string {
            Some(quote) => match c {
                '\\' => escaped = true,
                _ if c == quote => in_string = None,
                _ => {}
            },
            None => match c {
                '"' | '\'' => in_string = Some(c),
                '#' => in_comment = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return start + i + c.len_utf8();
                    }
                }
                _ => {}
            },
        }
    }
    source.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_and_calls_in_code_context() {
        let instructions = parse(r#"1 "two" :three four"#).unwrap();
        assert!(matches!(instructions[0], Instruction::Put(Value::Int(1))));
        assert!(matches!(&instructions[1], Instruction::Put(Value::Str(s)) if &**s == "two"));
        assert!(matches!(&instructions[2], Instruction::Put(Value::Atom(id)) if *id == crate::intern::atom("three")));
        assert!(matches!(&instructions[3], Instruction::CallByName(name) if &**name == "four"));
    }

    #[test]
    fn tuples_emit_puts_then_make_vec() {
        let instructions = parse("(1 two :three)").unwrap();
        assert!(matches!(instructions[0], Instruction::Put(Value::Int(1))));
        // bare name becomes an atom, :atom keeps its colon
        assert!(matches!(&instructions[1], Instruction::Put(Value::Atom(id)) if *id == crate::intern::atom("two")));
        assert!(matches!(&instructions[2], Instruction::Put(Value::Atom(id)) if *id == crate::intern::atom(":three")));
        assert!(matches!(instructions[3], Instruction::MakeVec(3)));
    }

    #[test]
    fn nested_tuples_nest_their_make_vecs() {
        let instructions = parse("(1 (2 3))").unwrap();
        let ops: Vec<&'static str> = instructions.iter().map(Instruction::op_name).collect();
        assert_eq!(ops, vec!["put", "put", "put", "make-vec", "make-vec"]);
        assert!(matches!(instructions[3], Instruction::MakeVec(2)));
        assert!(matches!(instructions[4], Instruction::MakeVec(2)));
    }

    #[test]
    fn code_blocks_become_put_code_with_source() {
        let instructions = parse("{ 1 dup }").unwrap();
        let Instruction::PutCode { body, source } = &instructions[0] else {
            panic!("expected a PutCode, got {instructions:?}");
        };
        assert_eq!(body.len(), 2);
        assert_eq!(source.as_deref(), Some("{ 1 dup }"));
    }

    #[test]
    fn code_blocks_inside_tuples_count_as_one_element() {
        let instructions = parse("({1} {2})").unwrap();
        let ops: Vec<&'static str> = instructions.iter().map(Instruction::op_name).collect();
        assert_eq!(ops, vec!["put-code", "put-code", "make-vec"]);
    }

    #[test]
    fn unterminated_code_block_is_an_eof_error() {
        let err = parse("{ 1 2").unwrap_err();
        assert!(err.is_eof());
        assert_eq!(err.context, "a code literal");
    }

    #[test]
    fn unterminated_tuple_is_an_eof_error() {
        let err = parse("(1 2").unwrap_err();
        assert!(err.is_eof());
        assert_eq!(err.context, "a tuple literal");
    }

    #[test]
    fn stray_closing_brace_is_unexpected() {
        let err = parse("1 }").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
    }

    #[test]
    fn huge_integers_parse_to_bigints() {
        let instructions = parse("123456789012345678901234567890").unwrap();
        assert!(matches!(instructions[0], Instruction::Put(Value::BigInt(_))));
    }

    #[test]
    fn negative_integers_parse_in_both_contexts() {
        assert!(matches!(parse("-5").unwrap()[0], Instruction::Put(Value::Int(-5))));
        assert!(matches!(parse("(-5)").unwrap()[0], Instruction::Put(Value::Int(-5))));
    }
}
