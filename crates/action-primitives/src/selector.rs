//! CSS-subset selector engine used by the in-memory document
//!
//! Supports type, universal, `#id`, `.class`, attribute presence and the
//! `=`, `^=`, `$=`, `*=`, `~=` operators, `:not(<compound>)`, descendant and
//! child combinators, and comma-separated selector lists.

use crate::errors::ActionError;
use promptrelay_core_types::NodeRef;

/// Read access to a tree for selector matching
pub trait SelectorTarget {
    fn tag(&self, node: NodeRef) -> Option<&str>;
    fn attr(&self, node: NodeRef, name: &str) -> Option<&str>;
    fn parent(&self, node: NodeRef) -> Option<NodeRef>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList(Vec<Complex>);

#[derive(Debug, Clone, PartialEq)]
struct Complex {
    // Each compound carries the combinator that links it to its left neighbour.
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    simple: Vec<Simple>,
}

#[derive(Debug, Clone, PartialEq)]
enum Simple {
    Id(String),
    Class(String),
    Attr {
        name: String,
        op: Option<(AttrOp, String)>,
    },
    Not(Box<Compound>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AttrOp {
    Equals,
    Prefix,
    Suffix,
    Substring,
    Word,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, ActionError> {
        let mut parser = Parser {
            chars: input.chars().collect(),
            pos: 0,
            source: input,
        };
        let list = parser.parse_list()?;
        Ok(SelectorList(list))
    }

    pub fn matches<T: SelectorTarget + ?Sized>(&self, target: &T, node: NodeRef) -> bool {
        self.0.iter().any(|complex| complex.matches(target, node))
    }
}

impl Complex {
    fn matches<T: SelectorTarget + ?Sized>(&self, target: &T, node: NodeRef) -> bool {
        match self.parts.len() {
            0 => false,
            len => self.match_from(target, node, len - 1),
        }
    }

    fn match_from<T: SelectorTarget + ?Sized>(&self, target: &T, node: NodeRef, idx: usize) -> bool {
        let (combinator, compound) = &self.parts[idx];
        if !compound.matches(target, node) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => target
                .parent(node)
                .map(|parent| self.match_from(target, parent, idx - 1))
                .unwrap_or(false),
            Combinator::Descendant => {
                let mut current = target.parent(node);
                while let Some(ancestor) = current {
                    if self.match_from(target, ancestor, idx - 1) {
                        return true;
                    }
                    current = target.parent(ancestor);
                }
                false
            }
        }
    }
}

impl Compound {
    fn matches<T: SelectorTarget + ?Sized>(&self, target: &T, node: NodeRef) -> bool {
        if let Some(tag) = &self.tag {
            match target.tag(node) {
                Some(actual) if actual.eq_ignore_ascii_case(tag) => {}
                _ => return false,
            }
        }
        self.simple.iter().all(|simple| simple.matches(target, node))
    }
}

impl Simple {
    fn matches<T: SelectorTarget + ?Sized>(&self, target: &T, node: NodeRef) -> bool {
        match self {
            Simple::Id(id) => target.attr(node, "id") == Some(id.as_str()),
            Simple::Class(class) => target
                .attr(node, "class")
                .map(|classes| classes.split_whitespace().any(|c| c == class))
                .unwrap_or(false),
            Simple::Attr { name, op } => {
                let Some(actual) = target.attr(node, name) else {
                    return false;
                };
                match op {
                    None => true,
                    Some((AttrOp::Equals, value)) => actual == value,
                    Some((AttrOp::Prefix, value)) => !value.is_empty() && actual.starts_with(value.as_str()),
                    Some((AttrOp::Suffix, value)) => !value.is_empty() && actual.ends_with(value.as_str()),
                    Some((AttrOp::Substring, value)) => !value.is_empty() && actual.contains(value.as_str()),
                    Some((AttrOp::Word, value)) => actual.split_whitespace().any(|w| w == value),
                }
            }
            Simple::Not(inner) => !inner.matches(target, node),
        }
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> ActionError {
        ActionError::InvalidLocator(format!(
            "{} at offset {} in '{}'",
            reason, self.pos, self.source
        ))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn expect(&mut self, expected: char) -> Result<(), ActionError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Complex>, ActionError> {
        let mut list = Vec::new();
        loop {
            self.skip_ws();
            list.push(self.parse_complex()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                None => break,
                Some(_) => return Err(self.error("unexpected character")),
            }
        }
        Ok(list)
    }

    fn parse_complex(&mut self) -> Result<Complex, ActionError> {
        let mut parts = vec![(Combinator::Descendant, self.parse_compound()?)];
        loop {
            let had_ws = self.skip_ws();
            match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_ws();
                    parts.push((Combinator::Child, self.parse_compound()?));
                }
                Some(_) if had_ws => {
                    parts.push((Combinator::Descendant, self.parse_compound()?));
                }
                Some(_) => return Err(self.error("unexpected character")),
            }
        }
        Ok(Complex { parts })
    }

    fn parse_compound(&mut self) -> Result<Compound, ActionError> {
        let start = self.pos;
        let mut compound = Compound::default();
        match self.peek() {
            Some('*') => self.pos += 1,
            Some(c) if is_ident_start(c) => {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    let id = self.ident()?;
                    compound.simple.push(Simple::Id(id));
                }
                Some('.') => {
                    self.pos += 1;
                    let class = self.ident()?;
                    compound.simple.push(Simple::Class(class));
                }
                Some('[') => {
                    self.pos += 1;
                    let attr = self.attribute()?;
                    compound.simple.push(attr);
                }
                Some(':') => {
                    self.pos += 1;
                    let name = self.ident()?;
                    if name != "not" {
                        return Err(self.error("only :not() is supported"));
                    }
                    self.expect('(')?;
                    self.skip_ws();
                    let inner = self.parse_compound()?;
                    self.skip_ws();
                    self.expect(')')?;
                    compound.simple.push(Simple::Not(Box::new(inner)));
                }
                _ => break,
            }
        }

        if self.pos == start {
            return Err(self.error("empty selector"));
        }
        Ok(compound)
    }

    fn attribute(&mut self) -> Result<Simple, ActionError> {
        self.skip_ws();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_ws();
        let op = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(Simple::Attr { name, op: None });
            }
            Some('=') => {
                self.pos += 1;
                AttrOp::Equals
            }
            Some(c @ ('^' | '$' | '*' | '~')) => {
                self.pos += 1;
                self.expect('=')?;
                match c {
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    '*' => AttrOp::Substring,
                    _ => AttrOp::Word,
                }
            }
            _ => return Err(self.error("malformed attribute selector")),
        };
        self.skip_ws();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.peek() {
                        Some(c) if c == quote => {
                            self.pos += 1;
                            break;
                        }
                        Some(c) => {
                            value.push(c);
                            self.pos += 1;
                        }
                        None => return Err(self.error("unterminated string")),
                    }
                }
                value
            }
            _ => self.ident()?,
        };
        self.skip_ws();
        self.expect(']')?;
        Ok(Simple::Attr {
            name,
            op: Some((op, value)),
        })
    }

    fn ident(&mut self) -> Result<String, ActionError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '-' || c == '_') {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected identifier"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Tree {
        nodes: HashMap<u64, (&'static str, Vec<(&'static str, &'static str)>, Option<u64>)>,
    }

    impl SelectorTarget for Tree {
        fn tag(&self, node: NodeRef) -> Option<&str> {
            self.nodes.get(&node.0).map(|(tag, _, _)| *tag)
        }

        fn attr(&self, node: NodeRef, name: &str) -> Option<&str> {
            self.nodes.get(&node.0).and_then(|(_, attrs, _)| {
                attrs.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
            })
        }

        fn parent(&self, node: NodeRef) -> Option<NodeRef> {
            self.nodes
                .get(&node.0)
                .and_then(|(_, _, parent)| parent.map(NodeRef))
        }
    }

    fn tree() -> Tree {
        let mut nodes = HashMap::new();
        nodes.insert(1, ("main", vec![("class", "chat")], None));
        nodes.insert(2, ("div", vec![("class", "turn model")], Some(1)));
        nodes.insert(
            3,
            ("button", vec![("aria-label", "Copy response"), ("id", "copy")], Some(2)),
        );
        Tree { nodes }
    }

    #[test]
    fn matches_compound_and_combinators() {
        let tree = tree();
        let button = NodeRef(3);
        for selector in [
            "button",
            "#copy",
            "button#copy",
            "main button",
            "div.model > button",
            ".chat .turn > #copy",
            "[aria-label]",
            "button[aria-label^='Copy']",
            "button[aria-label*=\"resp\"]",
            "div[class~=model] > button",
            "button:not(.disabled)",
            "a, button",
        ] {
            let list = SelectorList::parse(selector).unwrap();
            assert!(list.matches(&tree, button), "selector {selector} should match");
        }
    }

    #[test]
    fn rejects_non_matching() {
        let tree = tree();
        for selector in ["main > button", "button.primary", "[aria-label$='x']", "button:not(#copy)"] {
            let list = SelectorList::parse(selector).unwrap();
            assert!(!list.matches(&tree, NodeRef(3)), "selector {selector} should not match");
        }
    }

    #[test]
    fn reports_malformed_selectors() {
        for selector in ["", "button[", "div >", "a:hover", "[x=\"open"] {
            assert!(matches!(
                SelectorList::parse(selector),
                Err(ActionError::InvalidLocator(_))
            ));
        }
    }
}
