//! Path navigation over decoded trees.
//!
//! A path is a list of [`Step`]s. An index step selects an element of the
//! current list; a match step first unwraps the current node to its child
//! list, then selects the first child whose declared fields all match.
//! Lookups never fail loudly: any miss yields `None`.

use crate::node::Node;

/// Field predicate for a match step.
///
/// Only fields that are set take part in the comparison; a node field that
/// is absent compares as the empty string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub name: Option<String>,
    pub type_tag: Option<String>,
    pub status: Option<String>,
    pub value: Option<String>,
    pub buffer: Option<bool>,
    /// Select the element that follows the match instead of the match.
    pub next: bool,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn type_tag(mut self, type_tag: impl Into<String>) -> Self {
        self.type_tag = Some(type_tag.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn buffer(mut self, is_buffer: bool) -> Self {
        self.buffer = Some(is_buffer);
        self
    }

    pub fn next(mut self) -> Self {
        self.next = true;
        self
    }

    pub fn matches(&self, node: &Node) -> bool {
        fn field_eq(expected: &Option<String>, actual: &str) -> bool {
            expected.as_deref().map_or(true, |e| e == actual)
        }

        field_eq(&self.name, &node.name)
            && field_eq(&self.type_tag, &node.type_tag)
            && field_eq(&self.status, &node.status)
            && field_eq(&self.value, node.text().unwrap_or(""))
            && self.buffer.map_or(true, |b| b == node.is_buffer())
    }
}

/// One navigation step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Index(usize),
    Match(Predicate),
}

impl Step {
    /// Shorthand for a match on the node name.
    pub fn named(name: impl Into<String>) -> Self {
        Step::Match(Predicate::new().name(name))
    }
}

impl From<usize> for Step {
    fn from(index: usize) -> Self {
        Step::Index(index)
    }
}

impl From<Predicate> for Step {
    fn from(predicate: Predicate) -> Self {
        Step::Match(predicate)
    }
}

#[derive(Clone, Copy)]
enum Position<'a> {
    List(&'a [Node]),
    Node(&'a Node),
}

impl<'a> Position<'a> {
    fn step(self, step: &Step) -> Option<Position<'a>> {
        match (step, self) {
            (Step::Index(i), Position::List(list)) => list.get(*i).map(Position::Node),
            (Step::Index(_), Position::Node(_)) => None,
            (Step::Match(predicate), position) => {
                let list = match position {
                    Position::List(list) => list,
                    Position::Node(node) => node.children()?,
                };
                find(list, predicate).map(Position::Node)
            }
        }
    }
}

fn find<'a>(list: &'a [Node], predicate: &Predicate) -> Option<&'a Node> {
    let hit = list.iter().position(|node| predicate.matches(node))?;
    if predicate.next {
        list.get(hit + 1)
    } else {
        list.get(hit)
    }
}

fn walk<'a>(start: Position<'a>, path: &[Step]) -> Option<&'a Node> {
    let mut position = start;
    for step in path {
        position = position.step(step)?;
    }
    match position {
        Position::Node(node) => Some(node),
        Position::List(_) => None,
    }
}

/// Follows `path` from a list of nodes.
pub fn extract<'a>(root: &'a [Node], path: &[Step]) -> Option<&'a Node> {
    walk(Position::List(root), path)
}

/// Follows `path` from a single node.
pub fn extract_in<'a>(node: &'a Node, path: &[Step]) -> Option<&'a Node> {
    walk(Position::Node(node), path)
}
