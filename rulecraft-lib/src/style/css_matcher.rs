use crate::dom::dom_tree::{self, ElementNode, Node, NodeRef};
use crate::style::selector::split_alternatives;
use std::collections::HashSet;
use std::rc::{Rc, Weak};
use thiserror::Error;

/// ------------------------------
/// 1. Selector Parsing
/// ------------------------------

/// Reasons a selector cannot be evaluated against a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected character {0:?} in selector")]
    UnexpectedChar(char),
    #[error("combinator without a selector on both sides")]
    DanglingCombinator,
    #[error("unsupported pseudo-class or pseudo-element: {0}")]
    UnsupportedPseudo(String),
    #[error("unterminated attribute selector")]
    UnterminatedAttribute,
    #[error("invalid An+B expression: {0}")]
    InvalidNth(String),
    #[error("pseudo-class :{0} needs an argument")]
    MissingArgument(String),
}

/// Supported attribute selector operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeOperator {
    /// [attr="value"]
    Exact,
    /// [attr~="value"]
    Includes,
    /// [attr^="value"]
    Prefix,
    /// [attr$="value"]
    Suffix,
    /// [attr*="value"]
    Substring,
}

/// Represents one attribute condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSelector {
    pub name: String,
    pub operator: Option<AttributeOperator>, // None means only existence check
    pub value: Option<String>,
}

/// The `An+B` argument of the `:nth-*` pseudo-classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nth {
    pub a: i32,
    pub b: i32,
}

impl Nth {
    /// Parses `odd`, `even`, `3`, `2n+1`, `-n + 3` and the like.
    pub fn parse(text: &str) -> Result<Self, SelectorError> {
        let compact: String = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        let invalid = || SelectorError::InvalidNth(text.trim().to_string());
        match compact.as_str() {
            "odd" => return Ok(Nth { a: 2, b: 1 }),
            "even" => return Ok(Nth { a: 2, b: 0 }),
            "" => return Err(invalid()),
            _ => {}
        }
        match compact.split_once('n') {
            Some((a, b)) => {
                let a = match a {
                    "" | "+" => 1,
                    "-" => -1,
                    other => other.parse().map_err(|_| invalid())?,
                };
                let b = if b.is_empty() {
                    0
                } else if b.starts_with(['+', '-']) {
                    b.parse().map_err(|_| invalid())?
                } else {
                    return Err(invalid());
                };
                Ok(Nth { a, b })
            }
            None => Ok(Nth {
                a: 0,
                b: compact.parse().map_err(|_| invalid())?,
            }),
        }
    }

    /// True if some `n >= 0` gives `a*n + b == index` (1-based).
    pub fn matches(&self, index: i32) -> bool {
        if self.a == 0 {
            return index == self.b;
        }
        let diff = index - self.b;
        diff % self.a == 0 && diff / self.a >= 0
    }
}

/// Pseudo-classes that can be answered from a static tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoClass {
    FirstChild,
    LastChild,
    OnlyChild,
    FirstOfType,
    LastOfType,
    OnlyOfType,
    NthChild(Nth),
    NthLastChild(Nth),
    NthOfType(Nth),
    NthLastOfType(Nth),
    Root,
    Empty,
    Checked,
    Disabled,
    Enabled,
    /// `:not(...)`
    Not(Vec<ComplexSelector>),
    /// `:is(...)`, `:where(...)` and their legacy aliases.
    Is(Vec<ComplexSelector>),
}

/// Elements `:disabled` and `:enabled` apply to.
const FORM_ELEMENTS: &[&str] = &[
    "button", "input", "select", "textarea", "optgroup", "option", "fieldset",
];

/// A compound selector: optional tag, id, classes, attribute and pseudo-class conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundSelector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: HashSet<String>,
    pub attributes: Vec<AttributeSelector>,
    pub pseudo_classes: Vec<PseudoClass>,
}

/// A complex selector composed of a key compound selector and a list of ancestor parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSelector {
    pub key: CompoundSelector,
    /// Ancestors with their combinators, in right-to-left order.
    pub ancestors: Vec<(Combinator, CompoundSelector)>,
}

/// Supported combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Descendant combinator (a space).
    Descendant,
    /// Child combinator (`>`).
    Child,
    /// Adjacent sibling combinator (`+`).
    AdjacentSibling,
    /// General sibling combinator (`~`).
    GeneralSibling,
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Compound(&'a str),
    Combinator(Combinator),
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii()
}

/// Splits one complex selector into compound chunks and combinators. Runs of
/// whitespace become a descendant combinator unless an explicit one is adjacent.
fn tokenize(selector: &str) -> Result<Vec<Token<'_>>, SelectorError> {
    let mut tokens = Vec::new();
    let mut pending_space = false;
    let mut chars = selector.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            pending_space = true;
            chars.next();
            continue;
        }
        let explicit = match ch {
            '>' => Some(Combinator::Child),
            '+' => Some(Combinator::AdjacentSibling),
            '~' => Some(Combinator::GeneralSibling),
            _ => None,
        };
        if let Some(combinator) = explicit {
            if !matches!(tokens.last(), Some(Token::Compound(_))) {
                return Err(SelectorError::DanglingCombinator);
            }
            tokens.push(Token::Combinator(combinator));
            pending_space = false;
            chars.next();
            continue;
        }

        if pending_space && matches!(tokens.last(), Some(Token::Compound(_))) {
            tokens.push(Token::Combinator(Combinator::Descendant));
        }
        pending_space = false;

        // Consume one compound, keeping bracketed and parenthesized parts whole.
        let mut end = start;
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        while let Some(&(i, c)) = chars.peek() {
            if quote.is_none() && depth == 0 && (c.is_whitespace() || matches!(c, '>' | '+' | '~')) {
                break;
            }
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"') | (None, '\'') => quote = Some(c),
                (None, '[') | (None, '(') => depth += 1,
                (None, ']') | (None, ')') => depth = depth.saturating_sub(1),
                _ => {}
            }
            end = i + c.len_utf8();
            chars.next();
        }
        if quote.is_some() || depth > 0 {
            return Err(SelectorError::UnterminatedAttribute);
        }
        tokens.push(Token::Compound(&selector[start..end]));
    }

    match tokens.last() {
        None => Err(SelectorError::Empty),
        Some(Token::Combinator(_)) => Err(SelectorError::DanglingCombinator),
        Some(Token::Compound(_)) => Ok(tokens),
    }
}

fn read_ident<I>(chars: &mut std::iter::Peekable<I>) -> String
where
    I: Iterator<Item = char>,
{
    let mut buffer = String::new();
    while let Some(&ch) = chars.peek() {
        if !is_ident_char(ch) {
            break;
        }
        buffer.push(ch);
        chars.next();
    }
    buffer
}

fn skip_whitespace<I>(chars: &mut std::iter::Peekable<I>)
where
    I: Iterator<Item = char>,
{
    while chars.peek().is_some_and(|ch| ch.is_whitespace()) {
        chars.next();
    }
}

/// Parse a compound selector string, e.g. "div.red#header[disabled][data-type~=\"main\"]:first-child"
pub fn parse_compound_selector(selector: &str) -> Result<CompoundSelector, SelectorError> {
    let mut compound = CompoundSelector::default();
    let mut chars = selector.chars().peekable();

    // A leading identifier or '*' is the tag.
    match chars.peek() {
        Some('*') => {
            chars.next();
        }
        Some(&ch) if is_ident_char(ch) => {
            compound.tag = Some(read_ident(&mut chars));
        }
        _ => {}
    }

    while let Some(ch) = chars.next() {
        match ch {
            '#' => {
                let id = read_ident(&mut chars);
                if id.is_empty() {
                    return Err(SelectorError::UnexpectedChar('#'));
                }
                compound.id = Some(id);
            }
            '.' => {
                let class = read_ident(&mut chars);
                if class.is_empty() {
                    return Err(SelectorError::UnexpectedChar('.'));
                }
                compound.classes.insert(class);
            }
            '[' => compound.attributes.push(parse_attribute(&mut chars)?),
            ':' => {
                if chars.peek() == Some(&':') {
                    chars.next();
                    let name = read_ident(&mut chars);
                    return Err(SelectorError::UnsupportedPseudo(format!("::{}", name)));
                }
                let name = read_ident(&mut chars).to_ascii_lowercase();
                let argument = if chars.peek() == Some(&'(') {
                    chars.next();
                    Some(read_argument(&mut chars)?)
                } else {
                    None
                };
                compound
                    .pseudo_classes
                    .push(parse_pseudo_class(&name, argument.as_deref())?);
            }
            other => return Err(SelectorError::UnexpectedChar(other)),
        }
    }

    Ok(compound)
}

/// Reads a parenthesized argument up to its matching ')'; the '(' is already consumed.
fn read_argument<I>(chars: &mut std::iter::Peekable<I>) -> Result<String, SelectorError>
where
    I: Iterator<Item = char>,
{
    let mut buffer = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for ch in chars.by_ref() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') if depth == 0 => return Ok(buffer),
            (None, ')') => depth -= 1,
            _ => {}
        }
        buffer.push(ch);
    }
    Err(SelectorError::UnterminatedAttribute)
}

fn parse_pseudo_class(name: &str, argument: Option<&str>) -> Result<PseudoClass, SelectorError> {
    let unsupported = || SelectorError::UnsupportedPseudo(format!(":{}", name));
    let Some(argument) = argument else {
        return Ok(match name {
            "first-child" => PseudoClass::FirstChild,
            "last-child" => PseudoClass::LastChild,
            "only-child" => PseudoClass::OnlyChild,
            "first-of-type" => PseudoClass::FirstOfType,
            "last-of-type" => PseudoClass::LastOfType,
            "only-of-type" => PseudoClass::OnlyOfType,
            "root" => PseudoClass::Root,
            "empty" => PseudoClass::Empty,
            "checked" => PseudoClass::Checked,
            "disabled" => PseudoClass::Disabled,
            "enabled" => PseudoClass::Enabled,
            "nth-child" | "nth-last-child" | "nth-of-type" | "nth-last-of-type" | "not"
            | "is" | "where" | "matches" | "any" | "-webkit-any" => {
                return Err(SelectorError::MissingArgument(name.to_string()))
            }
            _ => return Err(unsupported()),
        });
    };
    Ok(match name {
        "nth-child" => PseudoClass::NthChild(Nth::parse(argument)?),
        "nth-last-child" => PseudoClass::NthLastChild(Nth::parse(argument)?),
        "nth-of-type" => PseudoClass::NthOfType(Nth::parse(argument)?),
        "nth-last-of-type" => PseudoClass::NthLastOfType(Nth::parse(argument)?),
        "not" => PseudoClass::Not(parse_selector_list(argument)?),
        "is" | "where" | "matches" | "any" | "-webkit-any" => {
            PseudoClass::Is(parse_selector_list(argument)?)
        }
        _ => return Err(unsupported()),
    })
}

/// Parses the body of an attribute selector; the opening '[' is already consumed.
fn parse_attribute<I>(chars: &mut std::iter::Peekable<I>) -> Result<AttributeSelector, SelectorError>
where
    I: Iterator<Item = char>,
{
    skip_whitespace(chars);
    let name = read_ident(chars);
    if name.is_empty() {
        return Err(SelectorError::UnexpectedChar('['));
    }
    skip_whitespace(chars);

    let mut operator = None;
    let mut value = None;
    match chars.next() {
        Some(']') => {
            return Ok(AttributeSelector {
                name,
                operator,
                value,
            })
        }
        Some('=') => operator = Some(AttributeOperator::Exact),
        Some(prefix @ ('~' | '^' | '$' | '*')) => {
            if chars.next() != Some('=') {
                return Err(SelectorError::UnexpectedChar(prefix));
            }
            operator = Some(match prefix {
                '~' => AttributeOperator::Includes,
                '^' => AttributeOperator::Prefix,
                '$' => AttributeOperator::Suffix,
                _ => AttributeOperator::Substring,
            });
        }
        Some(other) => return Err(SelectorError::UnexpectedChar(other)),
        None => return Err(SelectorError::UnterminatedAttribute),
    }

    skip_whitespace(chars);
    let mut value_buf = String::new();
    match chars.peek() {
        Some(&q) if q == '"' || q == '\'' => {
            chars.next();
            loop {
                match chars.next() {
                    Some(ch) if ch == q => break,
                    Some(ch) => value_buf.push(ch),
                    None => return Err(SelectorError::UnterminatedAttribute),
                }
            }
        }
        _ => {
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() || ch == ']' {
                    break;
                }
                value_buf.push(ch);
                chars.next();
            }
        }
    }
    value = Some(value_buf);

    skip_whitespace(chars);
    if chars.next() != Some(']') {
        return Err(SelectorError::UnterminatedAttribute);
    }
    Ok(AttributeSelector {
        name,
        operator,
        value,
    })
}

/// Parse a complex selector string (e.g. "div.red > p#header + span.foo") into a ComplexSelector.
pub fn parse_complex_selector(selector: &str) -> Result<ComplexSelector, SelectorError> {
    let tokens = tokenize(selector)?;
    let mut iter = tokens.into_iter();
    let mut key = match iter.next() {
        Some(Token::Compound(text)) => parse_compound_selector(text)?,
        _ => return Err(SelectorError::DanglingCombinator),
    };
    let mut ancestors = Vec::new();

    while let Some(token) = iter.next() {
        let combinator = match token {
            Token::Combinator(c) => c,
            Token::Compound(_) => Combinator::Descendant,
        };
        let compound = match iter.next() {
            Some(Token::Compound(text)) => parse_compound_selector(text)?,
            _ => return Err(SelectorError::DanglingCombinator),
        };
        ancestors.push((combinator, key));
        key = compound;
    }
    ancestors.reverse();
    Ok(ComplexSelector { key, ancestors })
}

/// Parse a comma separated selector list.
pub fn parse_selector_list(selector: &str) -> Result<Vec<ComplexSelector>, SelectorError> {
    split_alternatives(selector)
        .into_iter()
        .map(parse_complex_selector)
        .collect()
}

/// ------------------------------
/// 2. Selector Matching
/// ------------------------------

/// Returns true if the given ElementNode matches the compound's tag, id,
/// classes and attribute conditions. Pseudo-classes are checked separately
/// because they need the node's position in the tree.
pub fn matches_compound(elem: &ElementNode, compound: &CompoundSelector) -> bool {
    if let Some(ref tag) = compound.tag {
        if !elem.tag.eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(ref id_val) = compound.id {
        if elem.attributes.get("id") != Some(id_val) {
            return false;
        }
    }
    if !compound.classes.is_empty() {
        let Some(class_attr) = elem.attributes.get("class") else {
            return false;
        };
        let elem_classes: HashSet<&str> = class_attr.split_whitespace().collect();
        if !compound
            .classes
            .iter()
            .all(|class| elem_classes.contains(class.as_str()))
        {
            return false;
        }
    }
    for attr_sel in &compound.attributes {
        let Some(actual_val) = elem.attributes.get(&attr_sel.name) else {
            return false;
        };
        let Some(expected) = &attr_sel.value else {
            continue;
        };
        let matched = match attr_sel.operator {
            Some(AttributeOperator::Exact) => actual_val == expected,
            Some(AttributeOperator::Includes) => {
                actual_val.split_whitespace().any(|word| word == expected)
            }
            Some(AttributeOperator::Prefix) => {
                !expected.is_empty() && actual_val.starts_with(expected.as_str())
            }
            Some(AttributeOperator::Suffix) => {
                !expected.is_empty() && actual_val.ends_with(expected.as_str())
            }
            Some(AttributeOperator::Substring) => {
                !expected.is_empty() && actual_val.contains(expected.as_str())
            }
            None => true,
        };
        if !matched {
            return false;
        }
    }
    true
}

/// 1-based position of `node` among its element siblings, counted from the
/// start or the end, optionally among siblings with the same tag only.
/// `None` for a detached element.
fn sibling_position(node: &NodeRef, tag: &str, same_type: bool, from_end: bool) -> Option<i32> {
    let parent = get_parent(node)?;
    let mut siblings: Vec<NodeRef> = dom_tree::element_children(&parent)
        .into_iter()
        .filter(|sibling| {
            !same_type
                || dom_tree::tag_name(sibling).is_some_and(|t| t.eq_ignore_ascii_case(tag))
        })
        .collect();
    if from_end {
        siblings.reverse();
    }
    siblings
        .iter()
        .position(|sibling| Rc::ptr_eq(sibling, node))
        .map(|index| index as i32 + 1)
}

fn sibling_count(node: &NodeRef, tag: &str, same_type: bool) -> usize {
    let Some(parent) = get_parent(node) else {
        return 0;
    };
    dom_tree::element_children(&parent)
        .iter()
        .filter(|sibling| {
            !same_type
                || dom_tree::tag_name(sibling).is_some_and(|t| t.eq_ignore_ascii_case(tag))
        })
        .count()
}

fn matches_pseudo(node: &NodeRef, elem: &ElementNode, pseudo: &PseudoClass) -> bool {
    let tag = elem.tag.as_str();
    let nth = |same_type: bool, from_end: bool, n: &Nth| {
        sibling_position(node, tag, same_type, from_end).is_some_and(|i| n.matches(i))
    };
    match pseudo {
        PseudoClass::Root => elem
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|p| is_document_root(&p)),
        PseudoClass::FirstChild => nth(false, false, &Nth { a: 0, b: 1 }),
        PseudoClass::LastChild => nth(false, true, &Nth { a: 0, b: 1 }),
        PseudoClass::OnlyChild => sibling_count(node, tag, false) == 1,
        PseudoClass::FirstOfType => nth(true, false, &Nth { a: 0, b: 1 }),
        PseudoClass::LastOfType => nth(true, true, &Nth { a: 0, b: 1 }),
        PseudoClass::OnlyOfType => sibling_count(node, tag, true) == 1,
        PseudoClass::NthChild(n) => nth(false, false, n),
        PseudoClass::NthLastChild(n) => nth(false, true, n),
        PseudoClass::NthOfType(n) => nth(true, false, n),
        PseudoClass::NthLastOfType(n) => nth(true, true, n),
        PseudoClass::Empty => elem.children.iter().all(|child| match &*child.borrow() {
            Node::Text(text) => text.is_empty(),
            _ => false,
        }),
        PseudoClass::Checked => {
            (matches!(tag, "input") && elem.attributes.contains_key("checked"))
                || (matches!(tag, "option") && elem.attributes.contains_key("selected"))
        }
        PseudoClass::Disabled => {
            FORM_ELEMENTS.contains(&tag) && elem.attributes.contains_key("disabled")
        }
        PseudoClass::Enabled => {
            FORM_ELEMENTS.contains(&tag) && !elem.attributes.contains_key("disabled")
        }
        PseudoClass::Not(list) => !list.iter().any(|s| matches_complex_selector(node, s)),
        PseudoClass::Is(list) => list.iter().any(|s| matches_complex_selector(node, s)),
    }
}

fn is_document_root(node: &NodeRef) -> bool {
    matches!(*node.borrow(), Node::DocumentRoot(_))
}

/// True if the node is an element matching every part of the compound.
fn node_matches(node: &NodeRef, compound: &CompoundSelector) -> bool {
    match &*node.borrow() {
        Node::Element(elem) => {
            matches_compound(elem, compound)
                && compound
                    .pseudo_classes
                    .iter()
                    .all(|pseudo| matches_pseudo(node, elem, pseudo))
        }
        _ => false,
    }
}

/// Matches a ComplexSelector against a candidate element.
/// The matching proceeds right-to-left, using parent and sibling pointers,
/// and backtracks when a descendant or general-sibling step picks a node
/// that fails further left.
pub fn matches_complex_selector(candidate: &NodeRef, complex: &ComplexSelector) -> bool {
    node_matches(candidate, &complex.key) && matches_ancestors(candidate, &complex.ancestors)
}

fn matches_ancestors(current: &NodeRef, ancestors: &[(Combinator, CompoundSelector)]) -> bool {
    let Some(((combinator, compound), rest)) = ancestors.split_first() else {
        return true;
    };
    match combinator {
        Combinator::Child => get_parent(current)
            .is_some_and(|parent| node_matches(&parent, compound) && matches_ancestors(&parent, rest)),
        Combinator::Descendant => {
            let mut ancestor = get_parent(current);
            while let Some(node) = ancestor {
                if node_matches(&node, compound) && matches_ancestors(&node, rest) {
                    return true;
                }
                ancestor = get_parent(&node);
            }
            false
        }
        Combinator::AdjacentSibling => get_prev_sibling(current).is_some_and(|sibling| {
            node_matches(&sibling, compound) && matches_ancestors(&sibling, rest)
        }),
        Combinator::GeneralSibling => {
            let mut sibling = get_prev_sibling(current);
            while let Some(node) = sibling {
                if node_matches(&node, compound) && matches_ancestors(&node, rest) {
                    return true;
                }
                sibling = get_prev_sibling(&node);
            }
            false
        }
    }
}

/// Helper: get parent pointer from a node.
fn get_parent(node: &NodeRef) -> Option<NodeRef> {
    if let Node::Element(ref elem) = *node.borrow() {
        elem.parent.as_ref().and_then(Weak::upgrade)
    } else {
        None
    }
}

/// Helper: get immediate previous element sibling from a node.
fn get_prev_sibling(node: &NodeRef) -> Option<NodeRef> {
    if let Node::Element(ref elem) = *node.borrow() {
        elem.prev_sibling.as_ref().and_then(Weak::upgrade)
    } else {
        None
    }
}

/// ------------------------------
/// 3. Document Queries
/// ------------------------------

fn collect_matches(
    node: &NodeRef,
    selectors: &[ComplexSelector],
    first_only: bool,
    out: &mut Vec<NodeRef>,
) {
    let children: Vec<NodeRef> = node.borrow().children().to_vec();
    for child in children {
        if first_only && !out.is_empty() {
            return;
        }
        if !dom_tree::is_element(&child) {
            continue;
        }
        if selectors.iter().any(|s| matches_complex_selector(&child, s)) {
            out.push(child.clone());
        }
        collect_matches(&child, selectors, first_only, out);
    }
}

/// All elements under `root` (excluding `root` itself) matching the selector list, in document order.
pub fn query_all(root: &NodeRef, selector: &str) -> Result<Vec<NodeRef>, SelectorError> {
    let selectors = parse_selector_list(selector)?;
    let mut out = Vec::new();
    collect_matches(root, &selectors, false, &mut out);
    Ok(out)
}

/// The first element under `root` matching the selector list.
pub fn query_first(root: &NodeRef, selector: &str) -> Result<Option<NodeRef>, SelectorError> {
    let selectors = parse_selector_list(selector)?;
    let mut out = Vec::new();
    collect_matches(root, &selectors, true, &mut out);
    Ok(out.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::html::create_dom_tree;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head></head>
<body>
  <div class="red card" id="main">
    <p id="blue" data-kind="note primary">Hello Blue</p>
    <p class="second">Second</p>
  </div>
  <div class="blue">Hello Blue</div>
  <ul><li>one</li><li>two</li><li>three</li></ul>
</body>
</html>"#;

    fn ids(nodes: &[NodeRef]) -> Vec<String> {
        nodes
            .iter()
            .map(|n| {
                dom_tree::get_attribute(n, "id")
                    .or_else(|| dom_tree::get_attribute(n, "class"))
                    .unwrap_or_else(|| dom_tree::text_content(n))
            })
            .collect()
    }

    #[test]
    fn test_parse_compound_with_attributes() {
        let compound =
            parse_compound_selector("div.red#header[disabled][data-type~=\"main\"]").unwrap();
        assert_eq!(compound.tag.as_deref(), Some("div"));
        assert_eq!(compound.id.as_deref(), Some("header"));
        assert!(compound.classes.contains("red"));
        assert_eq!(compound.attributes.len(), 2);
        assert_eq!(compound.attributes[0].operator, None);
        assert_eq!(
            compound.attributes[1].operator,
            Some(AttributeOperator::Includes)
        );
        assert_eq!(compound.attributes[1].value.as_deref(), Some("main"));
    }

    #[test]
    fn test_combinators_without_spaces() {
        let complex = parse_complex_selector(".a>.b+.c").unwrap();
        assert_eq!(
            complex
                .ancestors
                .iter()
                .map(|(c, _)| *c)
                .collect::<Vec<_>>(),
            vec![Combinator::AdjacentSibling, Combinator::Child]
        );
    }

    #[test]
    fn test_rejects_unsupported_syntax() {
        assert_eq!(parse_complex_selector(""), Err(SelectorError::Empty));
        assert_eq!(
            parse_complex_selector("> p"),
            Err(SelectorError::DanglingCombinator)
        );
        assert_eq!(
            parse_complex_selector("&:hover"),
            Err(SelectorError::UnexpectedChar('&'))
        );
        assert!(matches!(
            parse_complex_selector("a:hover"),
            Err(SelectorError::UnsupportedPseudo(_))
        ));
        assert!(matches!(
            parse_complex_selector("p::before"),
            Err(SelectorError::UnsupportedPseudo(_))
        ));
    }

    #[test]
    fn test_query_descendant_and_child() {
        let doc = create_dom_tree(PAGE);
        let found = doc.query_selector_all("div p").unwrap();
        assert_eq!(ids(&found), vec!["blue", "second"]);

        let found = doc.query_selector_all("body> .blue").unwrap();
        assert_eq!(ids(&found), vec!["blue"]);
    }

    #[test]
    fn test_query_sibling_combinators() {
        let doc = create_dom_tree(PAGE);
        assert_eq!(ids(&doc.query_selector_all("#blue + p").unwrap()), vec!["second"]);
        assert_eq!(ids(&doc.query_selector_all(".card ~ div").unwrap()), vec!["blue"]);
    }

    #[test]
    fn test_query_attribute_operators() {
        let doc = create_dom_tree(PAGE);
        assert_eq!(doc.query_selector_all("[data-kind~=primary]").unwrap().len(), 1);
        assert_eq!(doc.query_selector_all("[data-kind^='note']").unwrap().len(), 1);
        assert_eq!(doc.query_selector_all("[data-kind$=\"mary\"]").unwrap().len(), 1);
        assert_eq!(doc.query_selector_all("[data-kind*=te]").unwrap().len(), 1);
        assert_eq!(doc.query_selector_all("[data-kind=note]").unwrap().len(), 0);
    }

    #[test]
    fn test_query_structural_pseudo_classes() {
        let doc = create_dom_tree(PAGE);
        let first = doc.query_selector_all("li:first-child").unwrap();
        assert_eq!(ids(&first), vec!["one"]);
        let last = doc.query_selector_all("li:last-child").unwrap();
        assert_eq!(ids(&last), vec!["three"]);
        assert_eq!(doc.query_selector_all(":root").unwrap().len(), 1);
    }

    #[test]
    fn test_nth_expressions() {
        assert_eq!(Nth::parse("odd").unwrap(), Nth { a: 2, b: 1 });
        assert_eq!(Nth::parse(" 2n + 1 ").unwrap(), Nth { a: 2, b: 1 });
        assert_eq!(Nth::parse("-n+3").unwrap(), Nth { a: -1, b: 3 });
        assert_eq!(Nth::parse("4").unwrap(), Nth { a: 0, b: 4 });
        assert!(Nth::parse("2n1").is_err());
        assert!(Nth::parse("").is_err());

        let first_three = Nth { a: -1, b: 3 };
        assert!(first_three.matches(1) && first_three.matches(3));
        assert!(!first_three.matches(4));
        let even = Nth::parse("even").unwrap();
        assert!(even.matches(2) && !even.matches(3));
    }

    #[test]
    fn test_query_logical_and_nth_pseudo_classes() {
        let doc = create_dom_tree(r#"<ul><li>1</li><li class="a">2</li><li>3</li></ul>"#);
        let count = |selector: &str| doc.query_selector_all(selector).unwrap().len();

        assert_eq!(count("li:nth-child(2)"), 1);
        assert_eq!(count("li:nth-child(odd)"), 2);
        assert_eq!(count("li:nth-last-child(1)"), 1);
        assert_eq!(count("li:not(.a)"), 2);
        assert_eq!(count(":is(ul, ol) > li"), 3);
        assert_eq!(count(":where(.a, .missing)"), 1);
        assert_eq!(count("li:first-of-type"), 1);
        assert_eq!(count("li:nth-of-type(n+2)"), 2);
        assert_eq!(count("ul:only-of-type"), 1);
    }

    #[test]
    fn test_query_empty_and_form_state() {
        let doc = create_dom_tree(
            r#"<div></div><div> </div><input checked><input disabled><select><option selected>a</option></select>"#,
        );
        assert_eq!(doc.query_selector_all("div:empty").unwrap().len(), 1);
        assert_eq!(doc.query_selector_all(":checked").unwrap().len(), 2);
        assert_eq!(doc.query_selector_all("input:disabled").unwrap().len(), 1);
        assert_eq!(doc.query_selector_all("input:enabled").unwrap().len(), 1);
    }

    #[test]
    fn test_pseudo_class_arguments_are_checked() {
        assert_eq!(
            parse_compound_selector("li:nth-child"),
            Err(SelectorError::MissingArgument("nth-child".to_string()))
        );
        assert!(matches!(
            parse_compound_selector("li:nth-child(x)"),
            Err(SelectorError::InvalidNth(_))
        ));
        assert_eq!(
            parse_compound_selector("li:not(.a"),
            Err(SelectorError::UnterminatedAttribute)
        );
    }

    #[test]
    fn test_descendant_matching_backtracks() {
        let doc = create_dom_tree(
            "<div class='a'><div class='b'><div><span>x</span></div></div></div>",
        );
        assert_eq!(doc.query_selector_all(".a > .b span").unwrap().len(), 1);
        assert_eq!(doc.query_selector_all(".a > div span").unwrap().len(), 1);
    }

    #[test]
    fn test_selector_list_keeps_document_order_without_duplicates() {
        let doc = create_dom_tree(PAGE);
        let found = doc.query_selector_all(".second, #blue, p").unwrap();
        assert_eq!(ids(&found), vec!["blue", "second"]);
        let first = doc.query_selector("li").unwrap().unwrap();
        assert_eq!(dom_tree::text_content(&first), "one");
    }
}
