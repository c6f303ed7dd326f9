use html5ever::interface::QuirksMode;
use html5ever::{LocalName, Namespace, QualName};
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Namespace given to elements created outside the parser.
pub const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

pub mod dom_tree {
    use super::*;
    use crate::style::css_matcher::{self, SelectorError};

    /// Shared handle to a node of the document tree.
    pub type NodeRef = Rc<RefCell<Node>>;

    #[derive(Debug, Clone)]
    pub enum Node {
        DocumentRoot(DocumentRootNode),
        Element(ElementNode),
        Text(String),
    }

    #[derive(Debug, Clone)]
    pub struct DocumentRootNode {
        pub children: Vec<NodeRef>,
    }

    #[derive(Debug, Clone)]
    pub struct ElementNode {
        pub tag: String,
        pub qual_name: QualName,
        pub attributes: IndexMap<String, String>,
        pub children: Vec<NodeRef>,
        pub parent: Option<Weak<RefCell<Node>>>,
        /// Previous *element* sibling.
        pub prev_sibling: Option<Weak<RefCell<Node>>>,
    }

    #[derive(Debug)]
    pub struct Document {
        pub root: NodeRef,
        pub doctype: RefCell<Option<Doctype>>,
        /// Set by the parser from the doctype (or its absence).
        pub quirks_mode: Cell<QuirksMode>,
    }

    #[derive(Debug)]
    pub struct Doctype {
        pub name: String,
        pub public_id: String,
        pub system_id: String,
    }

    impl DocumentRootNode {
        pub fn new() -> Self {
            DocumentRootNode {
                children: Vec::new(),
            }
        }
    }

    impl Default for DocumentRootNode {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ElementNode {
        pub fn new(tag: String, qual_name: QualName) -> Self {
            ElementNode {
                tag,
                qual_name,
                attributes: IndexMap::new(),
                children: Vec::new(),
                parent: None,
                prev_sibling: None,
            }
        }
    }

    impl Node {
        pub fn children(&self) -> &[NodeRef] {
            match self {
                Node::DocumentRoot(root) => &root.children,
                Node::Element(elem) => &elem.children,
                Node::Text(_) => &[],
            }
        }
    }

    pub fn new_document() -> Document {
        Document {
            root: Rc::new(RefCell::new(Node::DocumentRoot(DocumentRootNode::new()))),
            doctype: RefCell::new(None),
            quirks_mode: Cell::new(QuirksMode::NoQuirks),
        }
    }

    /// Creates a detached HTML element with the given attributes.
    pub fn create_element(tag: &str, attributes: &[(&str, &str)]) -> NodeRef {
        let qual_name = QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag));
        let mut element = ElementNode::new(tag.to_string(), qual_name);
        for (name, value) in attributes {
            element
                .attributes
                .insert((*name).to_string(), (*value).to_string());
        }
        Rc::new(RefCell::new(Node::Element(element)))
    }

    pub fn create_text(text: &str) -> NodeRef {
        Rc::new(RefCell::new(Node::Text(text.to_string())))
    }

    /// Appends `child` to `parent`, wiring the parent and element-sibling links.
    /// Text nodes cannot have children; appending to one does nothing.
    pub fn append_child(parent: &NodeRef, child: NodeRef) {
        let mut parent_borrow = parent.borrow_mut();
        let children = match &mut *parent_borrow {
            Node::DocumentRoot(root) => &mut root.children,
            Node::Element(elem) => &mut elem.children,
            Node::Text(_) => return,
        };

        if let Node::Element(ref mut child_elem) = *child.borrow_mut() {
            child_elem.parent = Some(Rc::downgrade(parent));
            child_elem.prev_sibling = children
                .iter()
                .rev()
                .find(|node| is_element(node))
                .map(Rc::downgrade);
        }
        children.push(child);
    }

    /// Recomputes the parent and previous-element-sibling links of every
    /// element child of `parent`.
    fn relink_children(parent: &NodeRef) {
        let children = parent.borrow().children().to_vec();
        let mut previous: Option<Weak<RefCell<Node>>> = None;
        for child in &children {
            if let Node::Element(ref mut elem) = *child.borrow_mut() {
                elem.parent = Some(Rc::downgrade(parent));
                elem.prev_sibling = previous.clone();
            } else {
                continue;
            }
            previous = Some(Rc::downgrade(child));
        }
    }

    fn children_mut(node: &mut Node) -> Option<&mut Vec<NodeRef>> {
        match node {
            Node::DocumentRoot(root) => Some(&mut root.children),
            Node::Element(elem) => Some(&mut elem.children),
            Node::Text(_) => None,
        }
    }

    /// The node holding `node` in its child list. Text nodes keep no parent
    /// link, so for them the tree under `root` is searched.
    fn find_parent(root: Option<&NodeRef>, node: &NodeRef) -> Option<NodeRef> {
        if let Node::Element(ref elem) = *node.borrow() {
            return elem.parent.as_ref().and_then(Weak::upgrade);
        }
        let root = root?;
        let children = root.borrow().children().to_vec();
        for child in children {
            if Rc::ptr_eq(&child, node) {
                return Some(root.clone());
            }
            if let Some(found) = find_parent(Some(&child), node) {
                return Some(found);
            }
        }
        None
    }

    /// Removes `node` from its parent's child list and repairs the sibling
    /// links of what remains. `root` is searched when `node` is text.
    pub fn detach(root: Option<&NodeRef>, node: &NodeRef) {
        let Some(parent) = find_parent(root, node) else {
            return;
        };
        if let Some(children) = children_mut(&mut parent.borrow_mut()) {
            children.retain(|child| !Rc::ptr_eq(child, node));
        }
        if let Node::Element(ref mut elem) = *node.borrow_mut() {
            elem.parent = None;
            elem.prev_sibling = None;
        }
        relink_children(&parent);
    }

    /// Inserts `child` right before `sibling`, moving it out of its current
    /// parent first. Does nothing when `sibling` is detached.
    pub fn insert_before(root: Option<&NodeRef>, sibling: &NodeRef, child: NodeRef) {
        let Some(parent) = find_parent(root, sibling) else {
            return;
        };
        if is_element(&child) {
            detach(root, &child);
        }
        if let Some(children) = children_mut(&mut parent.borrow_mut()) {
            let index = children
                .iter()
                .position(|c| Rc::ptr_eq(c, sibling))
                .unwrap_or(children.len());
            children.insert(index, child);
        }
        relink_children(&parent);
    }

    /// Moves every child of `node` to the end of `new_parent`'s children.
    pub fn reparent_children(node: &NodeRef, new_parent: &NodeRef) {
        let moved = match children_mut(&mut node.borrow_mut()) {
            Some(children) => std::mem::take(children),
            None => return,
        };
        if let Some(children) = children_mut(&mut new_parent.borrow_mut()) {
            children.extend(moved);
        }
        relink_children(new_parent);
    }

    pub fn is_element(node: &NodeRef) -> bool {
        matches!(*node.borrow(), Node::Element(_))
    }

    pub fn tag_name(node: &NodeRef) -> Option<String> {
        match &*node.borrow() {
            Node::Element(elem) => Some(elem.tag.clone()),
            _ => None,
        }
    }

    pub fn get_attribute(node: &NodeRef, name: &str) -> Option<String> {
        match &*node.borrow() {
            Node::Element(elem) => elem.attributes.get(name).cloned(),
            _ => None,
        }
    }

    pub fn set_attribute(node: &NodeRef, name: &str, value: &str) {
        if let Node::Element(ref mut elem) = *node.borrow_mut() {
            elem.attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attribute(node: &NodeRef, name: &str) {
        if let Node::Element(ref mut elem) = *node.borrow_mut() {
            elem.attributes.shift_remove(name);
        }
    }

    /// Replaces all children of an element with a single text node.
    pub fn set_text_content(node: &NodeRef, text: &str) {
        if let Node::Element(ref mut elem) = *node.borrow_mut() {
            elem.children = vec![create_text(text)];
        }
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(node: &NodeRef) -> String {
        let mut out = String::new();
        collect_text(node, &mut out);
        out
    }

    fn collect_text(node: &NodeRef, out: &mut String) {
        match &*node.borrow() {
            Node::Text(text) => out.push_str(text),
            other => {
                for child in other.children() {
                    collect_text(child, out);
                }
            }
        }
    }

    /// Element children of a node, in document order.
    pub fn element_children(node: &NodeRef) -> Vec<NodeRef> {
        node.borrow()
            .children()
            .iter()
            .filter(|child| is_element(child))
            .cloned()
            .collect()
    }

    /// Finds the first element with the given tag, searching depth-first.
    pub fn find_element(node: &NodeRef, tag: &str) -> Option<NodeRef> {
        for child in element_children(node) {
            let is_match = tag_name(&child).is_some_and(|t| t.eq_ignore_ascii_case(tag));
            if is_match {
                return Some(child);
            }
            if let Some(found) = find_element(&child, tag) {
                return Some(found);
            }
        }
        None
    }

    impl Document {
        pub fn document_element(&self) -> Option<NodeRef> {
            element_children(&self.root).into_iter().next()
        }

        pub fn head(&self) -> Option<NodeRef> {
            find_element(&self.root, "head")
        }

        pub fn body(&self) -> Option<NodeRef> {
            find_element(&self.root, "body")
        }

        /// Appends a node to `<head>`, creating `<html>` and `<head>` when the
        /// document does not have them yet.
        pub fn append_to_head(&self, node: NodeRef) {
            let head = match self.head() {
                Some(head) => head,
                None => {
                    let html = match self.document_element() {
                        Some(html) => html,
                        None => {
                            let html = create_element("html", &[]);
                            append_child(&self.root, html.clone());
                            html
                        }
                    };
                    let head = create_element("head", &[]);
                    append_child(&html, head.clone());
                    head
                }
            };
            append_child(&head, node);
        }

        /// Every element matching the selector list, in document order.
        pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeRef>, SelectorError> {
            css_matcher::query_all(&self.root, selector)
        }

        pub fn query_selector(&self, selector: &str) -> Result<Option<NodeRef>, SelectorError> {
            css_matcher::query_first(&self.root, selector)
        }
    }
}

/// Ordered inline declarations as found in an element's `style` attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InlineStyle {
    declarations: Vec<(String, String)>,
}

impl InlineStyle {
    /// Parses `name: value; name: value` text. Malformed pieces are dropped.
    pub fn parse(text: &str) -> Self {
        let mut style = InlineStyle::default();
        for piece in split_declarations(text) {
            if let Some((name, value)) = piece.split_once(':') {
                let name = name.trim();
                let value = value.trim();
                if !name.is_empty() && !value.is_empty() {
                    style.set(name, value);
                }
            }
        }
        style
    }

    /// Sets a declaration, overwriting an existing one in place.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.declarations.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = value.to_string(),
            None => self
                .declarations
                .push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Drops a declaration. Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.declarations.len();
        self.declarations.retain(|(n, _)| n != name);
        self.declarations.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }
}

impl std::fmt::Display for InlineStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (name, value) in &self.declarations {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}: {};", name, value)?;
            first = false;
        }
        Ok(())
    }
}

/// Splits on `;` outside of parentheses and quotes, so `url(a;b)` stays whole.
fn split_declarations(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                pieces.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&text[start..]);
    pieces
}

#[cfg(test)]
mod tests {
    use super::dom_tree::*;
    use super::InlineStyle;

    #[test]
    fn test_append_child_links_element_siblings() {
        let parent = create_element("ul", &[]);
        let first = create_element("li", &[("id", "first")]);
        let second = create_element("li", &[("id", "second")]);
        append_child(&parent, first.clone());
        append_child(&parent, create_text(" "));
        append_child(&parent, second.clone());

        if let Node::Element(ref elem) = *second.borrow() {
            let prev = elem.prev_sibling.as_ref().and_then(|w| w.upgrade());
            assert!(prev.is_some_and(|p| std::rc::Rc::ptr_eq(&p, &first)));
            assert!(elem.parent.as_ref().and_then(|w| w.upgrade()).is_some());
        } else {
            panic!("expected element");
        }
        assert_eq!(element_children(&parent).len(), 2);
    }

    #[test]
    fn test_append_to_head_creates_missing_structure() {
        let document = new_document();
        document.append_to_head(create_element("style", &[]));
        let head = document.head().expect("head created");
        assert_eq!(element_children(&head).len(), 1);
        assert_eq!(tag_name(&document.document_element().unwrap()).unwrap(), "html");
    }

    #[test]
    fn test_inline_style_round_trip_keeps_order() {
        let mut style = InlineStyle::parse("color: red; background: url(a;b); ");
        assert_eq!(style.len(), 2);
        assert_eq!(style.get("background"), Some("url(a;b)"));
        style.set("color", "blue");
        style.set("margin", "0");
        assert_eq!(
            style.to_string(),
            "color: blue; background: url(a;b); margin: 0;"
        );
    }

    fn prev_sibling_of(node: &NodeRef) -> Option<NodeRef> {
        match &*node.borrow() {
            Node::Element(elem) => elem.prev_sibling.as_ref().and_then(|w| w.upgrade()),
            _ => None,
        }
    }

    #[test]
    fn test_detach_and_insert_before_relink_siblings() {
        let parent = create_element("div", &[]);
        let a = create_element("a", &[]);
        let b = create_element("b", &[]);
        let c = create_element("i", &[]);
        append_child(&parent, a.clone());
        append_child(&parent, b.clone());
        append_child(&parent, c.clone());

        detach(None, &b);
        assert_eq!(element_children(&parent).len(), 2);
        assert!(prev_sibling_of(&c).is_some_and(|p| std::rc::Rc::ptr_eq(&p, &a)));
        assert!(prev_sibling_of(&b).is_none());

        insert_before(None, &a, b.clone());
        let tags: Vec<String> = element_children(&parent)
            .iter()
            .filter_map(tag_name)
            .collect();
        assert_eq!(tags, vec!["b", "a", "i"]);
        assert!(prev_sibling_of(&b).is_none());
        assert!(prev_sibling_of(&a).is_some_and(|p| std::rc::Rc::ptr_eq(&p, &b)));
    }

    #[test]
    fn test_detach_text_searches_from_root() {
        let root = create_element("div", &[]);
        let p = create_element("p", &[]);
        let text = create_text("x");
        append_child(&root, p.clone());
        append_child(&p, text.clone());

        detach(Some(&root), &text);
        assert_eq!(text_content(&root), "");
    }

    #[test]
    fn test_reparent_children_moves_everything() {
        let from = create_element("b", &[]);
        let to = create_element("p", &[]);
        append_child(&to, create_element("em", &[]));
        let moved = create_element("span", &[]);
        append_child(&from, create_text("t"));
        append_child(&from, moved.clone());

        reparent_children(&from, &to);
        assert!(from.borrow().children().is_empty());
        assert_eq!(to.borrow().children().len(), 3);
        assert_eq!(text_content(&to), "t");
        match &*moved.borrow() {
            Node::Element(elem) => {
                let parent = elem.parent.as_ref().and_then(|w| w.upgrade());
                assert!(parent.is_some_and(|p| std::rc::Rc::ptr_eq(&p, &to)));
            }
            _ => panic!("expected element"),
        }
        assert!(prev_sibling_of(&moved).is_some());
    }

    #[test]
    fn test_inline_style_remove() {
        let mut style = InlineStyle::parse("color: red; margin: 0");
        assert!(style.remove("color"));
        assert!(!style.remove("color"));
        assert_eq!(style.to_string(), "margin: 0;");
    }

    #[test]
    fn test_text_content_and_attributes() {
        let el = create_element("style", &[("media", "print")]);
        set_text_content(&el, "a{}");
        assert_eq!(text_content(&el), "a{}");
        assert_eq!(get_attribute(&el, "media").as_deref(), Some("print"));
        remove_attribute(&el, "media");
        assert_eq!(get_attribute(&el, "media"), None);
    }
}
