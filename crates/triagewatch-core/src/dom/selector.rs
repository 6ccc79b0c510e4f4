//! The CSS selector subset the host DOM contract is written in.
//!
//! Supported: type, `*`, `#id`, `.class`, `[attr]`, `[attr="v"]`,
//! `[attr*="v"]`, `[attr^="v"]`, `[attr$="v"]`, `:nth-child(n)`, and the
//! descendant (whitespace) and child (`>`) combinators.

use thiserror::Error;

use super::{Document, NodeId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected {found:?} at offset {pos} in {selector:?}")]
    Unexpected {
        selector: String,
        pos: usize,
        found: char,
    },
    #[error("unterminated {what} in {selector:?}")]
    Unterminated { selector: String, what: &'static str },
    #[error("unsupported pseudo-class {0:?}")]
    UnsupportedPseudo(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Contains,
    Prefix,
    Suffix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrCond {
    name: String,
    op: AttrOp,
    value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCond>,
    nth_child: Option<usize>,
}

/// A parsed selector. Each step carries the combinator linking it to the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    steps: Vec<(Combinator, Compound)>,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let source = input.trim().to_string();
        if source.is_empty() {
            return Err(SelectorError::Empty);
        }
        let chars: Vec<char> = source.chars().collect();
        let mut cur = Cursor {
            chars: &chars,
            pos: 0,
            source: &source,
        };

        let mut steps = Vec::new();
        let mut combinator = Combinator::Descendant;
        loop {
            let compound = cur.compound()?;
            steps.push((combinator, compound));

            let had_space = cur.skip_ws();
            match cur.peek() {
                None => break,
                Some('>') => {
                    cur.pos += 1;
                    cur.skip_ws();
                    combinator = Combinator::Child;
                }
                Some(_) if had_space => combinator = Combinator::Descendant,
                Some(c) => return Err(cur.unexpected(c)),
            }
        }

        Ok(Self { source, steps })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether element `node` matches. Non-elements never match.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.matches_step(doc, node, self.steps.len() - 1)
    }

    fn matches_step(&self, doc: &Document, node: NodeId, step: usize) -> bool {
        let (combinator, compound) = &self.steps[step];
        if !compound.matches(doc, node) {
            return false;
        }
        if step == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => doc
                .parent(node)
                .is_some_and(|p| self.matches_step(doc, p, step - 1)),
            Combinator::Descendant => {
                let mut cur = doc.parent(node);
                while let Some(p) = cur {
                    if self.matches_step(doc, p, step - 1) {
                        return true;
                    }
                    cur = doc.parent(p);
                }
                false
            }
        }
    }
}

impl Compound {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(el) = doc.element(node) else {
            return false;
        };
        if self.tag.as_deref().is_some_and(|t| t != el.name) {
            return false;
        }
        if self.id.as_deref().is_some_and(|id| el.attr("id") != Some(id)) {
            return false;
        }
        if !self.classes.iter().all(|c| el.has_class(c)) {
            return false;
        }
        let attrs_ok = self.attrs.iter().all(|cond| match el.attr(&cond.name) {
            None => false,
            Some(v) => match cond.op {
                AttrOp::Exists => true,
                AttrOp::Equals => v == cond.value,
                AttrOp::Contains => !cond.value.is_empty() && v.contains(&cond.value),
                AttrOp::Prefix => !cond.value.is_empty() && v.starts_with(&cond.value),
                AttrOp::Suffix => !cond.value.is_empty() && v.ends_with(&cond.value),
            },
        });
        if !attrs_ok {
            return false;
        }
        match self.nth_child {
            Some(n) => doc.element_index(node) == Some(n),
            None => true,
        }
    }
}

struct Cursor<'a> {
    chars: &'a [char],
    pos: usize,
    source: &'a str,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn unexpected(&self, found: char) -> SelectorError {
        SelectorError::Unexpected {
            selector: self.source.to_string(),
            pos: self.pos,
            found,
        }
    }

    fn unterminated(&self, what: &'static str) -> SelectorError {
        SelectorError::Unterminated {
            selector: self.source.to_string(),
            what,
        }
    }

    fn ident(&mut self) -> Result<String, SelectorError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(match self.peek() {
                Some(c) => self.unexpected(c),
                None => self.unterminated("identifier"),
            });
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn expect(&mut self, want: char, what: &'static str) -> Result<(), SelectorError> {
        match self.peek() {
            Some(c) if c == want => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.unexpected(c)),
            None => Err(self.unterminated(what)),
        }
    }

    fn compound(&mut self) -> Result<Compound, SelectorError> {
        let mut out = Compound::default();
        let mut universal = false;
        loop {
            match self.peek() {
                Some('*') => {
                    self.pos += 1;
                    universal = true;
                }
                Some(c) if c.is_alphabetic() && out.is_empty() && !universal => {
                    out.tag = Some(self.ident()?.to_ascii_lowercase());
                }
                Some('#') => {
                    self.pos += 1;
                    out.id = Some(self.ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    out.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    out.attrs.push(self.attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    out.nth_child = Some(self.pseudo()?);
                }
                Some(c) if c.is_whitespace() || c == '>' => break,
                None => break,
                Some(c) => return Err(self.unexpected(c)),
            }
        }
        if out.is_empty() && !universal {
            return Err(match self.peek() {
                Some(c) => self.unexpected(c),
                None => SelectorError::Empty,
            });
        }
        Ok(out)
    }

    fn attribute(&mut self) -> Result<AttrCond, SelectorError> {
        self.skip_ws();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_ws();
        let op = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrCond {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                });
            }
            Some('=') => AttrOp::Equals,
            Some('*') => AttrOp::Contains,
            Some('^') => AttrOp::Prefix,
            Some('$') => AttrOp::Suffix,
            Some(c) => return Err(self.unexpected(c)),
            None => return Err(self.unterminated("attribute selector")),
        };
        self.pos += 1;
        if op != AttrOp::Equals {
            self.expect('=', "attribute selector")?;
        }
        self.skip_ws();
        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != q) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(self.unterminated("quoted value"));
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                value
            }
            _ => self.ident()?,
        };
        self.skip_ws();
        self.expect(']', "attribute selector")?;
        Ok(AttrCond { name, op, value })
    }

    fn pseudo(&mut self) -> Result<usize, SelectorError> {
        let name = self.ident()?;
        if name != "nth-child" {
            return Err(SelectorError::UnsupportedPseudo(name));
        }
        self.expect('(', "nth-child")?;
        self.skip_ws();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        let n = digits.parse().map_err(|_| match self.peek() {
            Some(c) => self.unexpected(c),
            None => self.unterminated("nth-child"),
        })?;
        self.skip_ws();
        self.expect(')', "nth-child")?;
        Ok(n)
    }
}
