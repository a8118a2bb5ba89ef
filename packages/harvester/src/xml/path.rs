//! Relative path queries over an element tree.
//!
//! Supported syntax: steps separated by `/`, `//` for any depth, `.` for the
//! context element, name tests (`tag`, `{uri}tag`, `{*}tag`, `*`) and the
//! predicates `[@attr]`, `[@attr='v']`, `[tag]`, `[tag='text']`,
//! `[.='text']`, `[n]` and `[last()]`. Prefixes are not expanded.
//!
//! `[n]` and `[last()]` count among the candidates sharing a parent, so
//! `.//item[1]` picks the first `item` of every parent. Text comparisons
//! use all text inside the element, nested elements included.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{HarvesterError, Result};
use crate::xml::namespaces::{parse_name_test, TagMatcher};
use crate::xml::tree::Element;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    SelfNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    HasAttribute(String),
    AttributeEquals(String, String),
    HasChild(TagMatcher),
    ChildTextEquals(TagMatcher, String),
    TextEquals(String),
    Position(usize),
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: TagMatcher,
    predicates: Vec<Predicate>,
}

/// A compiled path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPath {
    steps: Vec<Step>,
}

impl CompiledPath {
    /// Compile a path expression.
    pub fn compile(path: &str) -> Result<Self> {
        let invalid = |reason: &str| HarvesterError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if path.is_empty() {
            return Err(invalid("empty path"));
        }
        if path.starts_with('/') {
            return Err(invalid("cannot use absolute path on element"));
        }

        let segments = split_segments(path).map_err(|r| invalid(&r))?;
        let mut steps = Vec::new();
        let mut descend = false;

        for (i, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                if descend || i + 1 == segments.len() {
                    return Err(invalid("unexpected '/'"));
                }
                descend = true;
                continue;
            }
            let step = parse_step(segment, descend).map_err(|r| invalid(&r))?;
            steps.push(step);
            descend = false;
        }

        Ok(Self { steps })
    }

    /// Select all matching elements relative to `context`, in document order.
    pub fn select(&self, context: &Arc<Element>) -> Vec<Arc<Element>> {
        let mut current = vec![Arc::clone(context)];

        for step in &self.steps {
            let mut next = Vec::new();
            let mut seen = HashSet::new();
            for element in &current {
                for candidate in step.apply(element) {
                    if seen.insert(Arc::as_ptr(&candidate)) {
                        next.push(candidate);
                    }
                }
            }
            current = next;
        }

        current
    }
}

/// A candidate node, its parent and its place in document order.
type Candidate = (*const Element, usize, Arc<Element>);

impl Step {
    fn apply(&self, context: &Arc<Element>) -> Vec<Arc<Element>> {
        let parent = Arc::as_ptr(context);
        let candidates: Vec<Candidate> = match self.axis {
            Axis::SelfNode => vec![(parent, 0, Arc::clone(context))],
            Axis::Child => context
                .child_elements()
                .filter(|el| self.test.matches(el.name()))
                .enumerate()
                .map(|(i, el)| (parent, i, Arc::clone(el)))
                .collect(),
            Axis::Descendant => self.descendants(context),
        };

        // Positions count among siblings, so predicates run per parent.
        let mut groups: Vec<Vec<(usize, Arc<Element>)>> = Vec::new();
        let mut group_of: HashMap<*const Element, usize> = HashMap::new();
        for (parent, order, element) in candidates {
            let index = *group_of.entry(parent).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[index].push((order, element));
        }

        let mut selected: Vec<(usize, Arc<Element>)> = groups
            .into_iter()
            .flat_map(|group| {
                self.predicates
                    .iter()
                    .fold(group, |group, predicate| predicate.filter(group))
            })
            .collect();
        selected.sort_by_key(|(order, _)| *order);
        selected.into_iter().map(|(_, element)| element).collect()
    }

    /// Matching descendants of `context` in document order, with their parents.
    fn descendants(&self, context: &Arc<Element>) -> Vec<Candidate> {
        let mut stack: Vec<(*const Element, Arc<Element>)> = context
            .child_elements()
            .rev()
            .map(|child| (Arc::as_ptr(context), Arc::clone(child)))
            .collect();
        let mut found = Vec::new();
        let mut order = 0;

        while let Some((parent, element)) = stack.pop() {
            let this = Arc::as_ptr(&element);
            stack.extend(
                element
                    .child_elements()
                    .rev()
                    .map(|child| (this, Arc::clone(child))),
            );
            if self.test.matches(element.name()) {
                found.push((parent, order, element));
                order += 1;
            }
        }
        found
    }
}

impl Predicate {
    fn filter(&self, candidates: Vec<(usize, Arc<Element>)>) -> Vec<(usize, Arc<Element>)> {
        match self {
            Self::Position(n) => candidates.into_iter().nth(n - 1).into_iter().collect(),
            Self::Last => candidates.into_iter().last().into_iter().collect(),
            _ => candidates.into_iter().filter(|(_, el)| self.holds(el)).collect(),
        }
    }

    fn holds(&self, element: &Element) -> bool {
        match self {
            Self::HasAttribute(name) => element.attribute(name).is_some(),
            Self::AttributeEquals(name, value) => element.attribute(name) == Some(value.as_str()),
            Self::HasChild(test) => element.child_elements().any(|c| test.matches(c.name())),
            Self::ChildTextEquals(test, text) => element
                .child_elements()
                .any(|c| test.matches(c.name()) && c.itertext() == *text),
            Self::TextEquals(text) => element.itertext() == *text,
            Self::Position(_) | Self::Last => true,
        }
    }
}

/// Split on `/` outside of `{...}` and `[...]`.
fn split_segments(path: &str) -> std::result::Result<Vec<&str>, String> {
    let mut segments = Vec::new();
    let mut depth_brace = 0usize;
    let mut depth_bracket = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in path.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' if depth_bracket > 0 => quote = Some(c),
            '{' => depth_brace += 1,
            '}' => depth_brace = depth_brace.checked_sub(1).ok_or("unbalanced '}'")?,
            '[' => depth_bracket += 1,
            ']' => depth_bracket = depth_bracket.checked_sub(1).ok_or("unbalanced ']'")?,
            '/' if depth_brace == 0 && depth_bracket == 0 => {
                segments.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() || depth_brace > 0 || depth_bracket > 0 {
        return Err("unterminated expression".to_string());
    }
    segments.push(&path[start..]);
    Ok(segments)
}

fn parse_step(segment: &str, descend: bool) -> std::result::Result<Step, String> {
    let (name, mut rest) = match find_predicate_start(segment) {
        Some(i) => segment.split_at(i),
        None => (segment, ""),
    };

    let (axis, test) = match name {
        ".." => return Err("parent steps are not supported".to_string()),
        "." if descend => return Err("'.' cannot follow '//'".to_string()),
        "." => (Axis::SelfNode, TagMatcher::Any),
        name if descend => (Axis::Descendant, parse_name_test(name)?),
        name => (Axis::Child, parse_name_test(name)?),
    };

    let mut predicates = Vec::new();
    while !rest.is_empty() {
        let body_end = closing_bracket(rest).ok_or("unterminated predicate")?;
        predicates.push(parse_predicate(&rest[1..body_end])?);
        rest = &rest[body_end + 1..];
    }

    Ok(Step {
        axis,
        test,
        predicates,
    })
}

/// Index of the first `[` outside a Clark namespace.
fn find_predicate_start(segment: &str) -> Option<usize> {
    let mut in_brace = false;
    for (i, c) in segment.char_indices() {
        match c {
            '{' => in_brace = true,
            '}' => in_brace = false,
            '[' if !in_brace => return Some(i),
            _ => {}
        }
    }
    None
}

/// Index of the `]` closing the predicate that opens at `rest[0]`.
fn closing_bracket(rest: &str) -> Option<usize> {
    if !rest.starts_with('[') {
        return None;
    }
    let mut quote: Option<char> = None;
    for (i, c) in rest.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_predicate(body: &str) -> std::result::Result<Predicate, String> {
    let body = body.trim();
    if body.is_empty() {
        return Err("empty predicate".to_string());
    }
    if body == "last()" {
        return Ok(Predicate::Last);
    }
    if let Ok(n) = body.parse::<usize>() {
        if n == 0 {
            return Err("positions start at 1".to_string());
        }
        return Ok(Predicate::Position(n));
    }

    let (lhs, value) = match body.split_once('=') {
        Some((lhs, rhs)) => (lhs.trim(), Some(unquote(rhs.trim())?)),
        None => (body, None),
    };

    if let Some(attr) = lhs.strip_prefix('@') {
        return Ok(match value {
            Some(v) => Predicate::AttributeEquals(attr.to_string(), v),
            None => Predicate::HasAttribute(attr.to_string()),
        });
    }
    if lhs == "." {
        return value
            .map(Predicate::TextEquals)
            .ok_or_else(|| "'.' predicate needs a value".to_string());
    }

    let test = parse_name_test(lhs)?;
    Ok(match value {
        Some(v) => Predicate::ChildTextEquals(test, v),
        None => Predicate::HasChild(test),
    })
}

fn unquote(value: &str) -> std::result::Result<String, String> {
    let quoted = (value.starts_with('\'') && value.ends_with('\''))
        || (value.starts_with('"') && value.ends_with('"'));
    if value.len() >= 2 && quoted {
        Ok(value[1..value.len() - 1].to_string())
    } else {
        Err(format!("expected quoted value, found {value}"))
    }
}
