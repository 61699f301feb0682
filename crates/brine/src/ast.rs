//! Alternative parser producing an AST instead of an instruction stream.
//!
//! Static tooling (editor support, import discovery) wants a tree it can walk
//! without executing anything. The grammar is identical to [`crate::parse`];
//! only the output shape differs. Note that inside tuples, `:atoms` keep
//! their leading colon and bare names become atoms, exactly as at run time.

use crate::{
    lex::{Token, TokenKind, lex, significant, unescape_string},
    modules,
    parse::{ParseError, ParseErrorKind, parse},
};

/// A node of the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
    IntLiteral(String),
    StrLiteral(String),
    AtomLiteral(String),
    NameCall(String),
    VecLiteral(Vec<AstNode>),
    CodeLiteral(Vec<AstNode>),
}

/// Parses source into a tree of AST nodes (the implicit top-level code
/// literal's children).
pub fn parse_ast(source: &str) -> Result<Vec<AstNode>, ParseError> {
    // run the instruction parser first for its precise error reporting
    parse(source)?;
    let mut tokens = significant(lex(source)?).peekable();
    parse_code_literal(&mut tokens, source, true)
}

fn parse_code_literal<I: Iterator<Item = Token>>(
    tokens: &mut std::iter::Peekable<I>,
    source: &str,
    top_level: bool,
) -> Result<Vec<AstNode>, ParseError> {
    let mut nodes = Vec::new();
    loop {
        let Some(token) = tokens.next() else {
            if top_level {
                return Ok(nodes);
            }
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedEof,
                source.len(),
                None,
                "a code literal",
            ));
        };
        match token.kind {
            TokenKind::RBr if !top_level => return Ok(nodes),
            TokenKind::LBr => nodes.push(AstNode::CodeLiteral(parse_code_literal(tokens, source, false)?)),
            TokenKind::LPar => nodes.push(AstNode::VecLiteral(parse_vec_literal(tokens, source)?)),
            TokenKind::Int => nodes.push(AstNode::IntLiteral(token.text)),
            TokenKind::StrDouble | TokenKind::StrSingle => {
                nodes.push(AstNode::StrLiteral(unescape_string(&token.text)?));
            }
            TokenKind::Atom => nodes.push(AstNode::AtomLiteral(token.text[1..].to_owned())),
            TokenKind::Name => nodes.push(AstNode::NameCall(token.text)),
            _ => {
                let offset = token.offset;
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken,
                    offset,
                    Some(token),
                    "a code literal",
                ));
            }
        }
    }
}

fn parse_vec_literal<I: Iterator<Item = Token>>(
    tokens: &mut std::iter::Peekable<I>,
    source: &str,
) -> Result<Vec<AstNode>, ParseError> {
    let mut nodes = Vec::new();
    loop {
        let Some(token) = tokens.next() else {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedEof,
                source.len(),
                None,
                "a tuple literal",
            ));
        };
        match token.kind {
            TokenKind::RPar => return Ok(nodes),
            TokenKind::LPar => nodes.push(AstNode::VecLiteral(parse_vec_literal(tokens, source)?)),
            TokenKind::LBr => nodes.push(AstNode::CodeLiteral(parse_code_literal(tokens, source, false)?)),
            TokenKind::Int => nodes.push(AstNode::IntLiteral(token.text)),
            TokenKind::StrDouble | TokenKind::StrSingle => {
                nodes.push(AstNode::StrLiteral(unescape_string(&token.text)?));
            }
            TokenKind::Atom | TokenKind::Name => nodes.push(AstNode::AtomLiteral(token.text)),
            _ => {
                let offset = token.offset;
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken,
                    offset,
                    Some(token),
                    "a tuple literal",
                ));
            }
        }
    }
}

/// A name made visible by an `import` form, found statically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredImport {
    pub module: String,
    pub original_name: String,
    pub imported_name: String,
}

/// Scans a node list for `:mod :all import`, `:mod :prefix import` and
/// `:mod (a b) import` forms and reports the names each one binds.
///
/// Only top-level windows are scanned; imports inside nested code blocks are
/// conditional and left alone. Unknown modules are skipped — static tooling
/// should not fail where the runtime would.
pub fn find_imports(nodes: &[AstNode]) -> Vec<DiscoveredImport> {
    let mut found = Vec::new();
    for window in nodes.windows(3) {
        let [first, second, third] = window else {
            continue;
        };
        if !matches!(third, AstNode::NameCall(name) if name == "import") {
            continue;
        }
        let AstNode::AtomLiteral(module) = first else {
            continue;
        };
        let Some(members) = modules::member_names(module) else {
            continue;
        };
        match second {
            AstNode::AtomLiteral(option) if option == "all" => {
                for member in members {
                    found.push(DiscoveredImport {
                        module: module.clone(),
                        original_name: member.clone(),
                        imported_name: member,
                    });
                }
            }
            AstNode::AtomLiteral(option) if option == "prefix" => {
                for member in members {
                    found.push(DiscoveredImport {
                        module: module.clone(),
                        original_name: member.clone(),
                        imported_name: format!("{module}.{member}"),
                    });
                }
            }
            AstNode::VecLiteral(picked)
                if picked.iter().all(|n| matches!(n, AstNode::AtomLiteral(_))) =>
            {
                for node in picked {
                    let AstNode::AtomLiteral(member) = node else {
                        unreachable!()
                    };
                    found.push(DiscoveredImport {
                        module: module.clone(),
                        original_name: member.clone(),
                        imported_name: member.clone(),
                    });
                }
            }
            _ => {}
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_tree_over_the_same_grammar() {
        let nodes = parse_ast("1 { x (y :z) }").unwrap();
        assert_eq!(nodes[0], AstNode::IntLiteral("1".to_owned()));
        let AstNode::CodeLiteral(body) = &nodes[1] else {
            panic!("expected a code literal");
        };
        assert_eq!(body[0], AstNode::NameCall("x".to_owned()));
        assert_eq!(
            body[1],
            AstNode::VecLiteral(vec![
                AstNode::AtomLiteral("y".to_owned()),
                AstNode::AtomLiteral(":z".to_owned()),
            ])
        );
    }

    #[test]
    fn discovers_cherry_picked_imports() {
        let nodes = parse_ast(":math (+ -) import 1 2 +").unwrap();
        let imports = find_imports(&nodes);
        let names: Vec<&str> = imports.iter().map(|i| i.imported_name.as_str()).collect();
        assert_eq!(names, vec!["+", "-"]);
        assert!(imports.iter().all(|i| i.module == "math"));
    }

    #[test]
    fn discovers_star_and_prefix_imports() {
        let nodes = parse_ast(":boxes :all import :math :prefix import").unwrap();
        let imports = find_imports(&nodes);
        assert!(imports.iter().any(|i| i.imported_name == "box"));
        assert!(imports.iter().any(|i| i.imported_name == "math.%make"));
    }

    #[test]
    fn unknown_modules_are_skipped() {
        let nodes = parse_ast(":nonexistent :all import").unwrap();
        assert!(find_imports(&nodes).is_empty());
    }
}
