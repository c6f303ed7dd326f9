//! HTML parsing into the crate's document tree, and serialization back to text.
//!
//! Parsing uses html5ever with a custom `TreeSink` that builds the tree defined
//! in `crate::dom::dom_tree`. Pages parsed here are what coverage checks and
//! stylesheet injection operate on.

use crate::dom::dom_tree;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{
    interface::{ElemName, NodeOrText, QuirksMode, TreeSink},
    LocalName, Namespace, QualName,
};
use log::trace;
use std::cell::RefCell;
use std::rc::Rc;

/// A list of void (self-closing) elements in HTML.
const VOID_ELEMENTS: &[&str] = &[
    "meta", "img", "br", "hr", "input", "link", "area", "base", "col", "embed", "param", "source",
    "track", "wbr",
];

/// Elements whose text content is emitted without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["style", "script"];

fn write_node(node: &dom_tree::Node, raw_text: bool, out: &mut String) {
    match node {
        dom_tree::Node::DocumentRoot(root) => {
            for child in &root.children {
                write_node(&child.borrow(), false, out);
            }
        }
        dom_tree::Node::Element(elem) => {
            out.push('<');
            out.push_str(&elem.tag);
            for (k, v) in &elem.attributes {
                out.push_str(&format!(" {}=\"{}\"", k, escape(v, true)));
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&elem.tag.as_str()) {
                return;
            }
            let raw = RAW_TEXT_ELEMENTS.contains(&elem.tag.as_str());
            for child in &elem.children {
                write_node(&child.borrow(), raw, out);
            }
            out.push_str(&format!("</{}>", elem.tag));
        }
        dom_tree::Node::Text(text) => {
            if raw_text {
                out.push_str(text);
            } else {
                out.push_str(&escape(text, false));
            }
        }
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' if !attribute => escaped.push_str("&lt;"),
            '>' if !attribute => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Serializes the entire Document, including its DOCTYPE (if any), to HTML text.
pub fn serialize_document(document: &dom_tree::Document) -> String {
    let mut out = String::new();
    if let Some(doctype) = &*document.doctype.borrow() {
        out.push_str(&format!("<!DOCTYPE {}>", doctype.name));
    }

    let root = document.root.borrow();
    write_node(&root, false, &mut out);
    out
}

/// Serializes a single node and its subtree.
pub fn serialize_node(node: &dom_tree::NodeRef) -> String {
    let mut out = String::new();
    write_node(&node.borrow(), false, &mut out);
    out
}

/// Creates a DOM tree from the provided HTML content.
///
/// # Arguments
///
/// * `html_content` - A string slice containing the HTML to parse.
///
/// # Returns
///
/// A `dom_tree::Document` representing the parsed HTML.
pub fn create_dom_tree(html_content: &str) -> dom_tree::Document {
    let tree_sink = RuleCraftTreeSink::new();
    html5ever::parse_document(tree_sink, Default::default()).one(html_content.to_string())
}

/// A custom TreeSink for building the DOM tree used by the parser.
pub struct RuleCraftTreeSink {
    document: dom_tree::Document,
}

impl RuleCraftTreeSink {
    /// Creates a new `RuleCraftTreeSink` with an empty document.
    pub fn new() -> Self {
        Self {
            document: dom_tree::new_document(),
        }
    }
}

impl Default for RuleCraftTreeSink {
    fn default() -> Self {
        Self::new()
    }
}

/// A simple implementation of the `ElemName` trait for our elements.
#[derive(Debug)]
pub struct SinkElemName {
    ns: Namespace,
    local: LocalName,
}

impl ElemName for SinkElemName {
    fn local_name(&self) -> &LocalName {
        &self.local
    }

    fn ns(&self) -> &Namespace {
        &self.ns
    }
}

impl TreeSink for RuleCraftTreeSink {
    type Handle = dom_tree::NodeRef;
    type Output = dom_tree::Document;
    type ElemName<'a>
        = SinkElemName
    where
        Self: 'a;

    /// Finalizes and returns the constructed Document.
    fn finish(self) -> Self::Output {
        self.document
    }

    fn parse_error(&self, msg: std::borrow::Cow<'static, str>) {
        trace!("html parse error: {}", msg);
    }

    fn get_document(&self) -> Self::Handle {
        self.document.root.clone()
    }

    /// Returns the element name for the given element handle. Non-element
    /// handles report an empty name in the HTML namespace.
    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        match *target.borrow() {
            dom_tree::Node::Element(ref elem) => SinkElemName {
                ns: elem.qual_name.ns.clone(),
                local: elem.qual_name.local.clone(),
            },
            _ => SinkElemName {
                ns: Namespace::from(crate::dom::HTML_NAMESPACE),
                local: LocalName::from(""),
            },
        }
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<html5ever::Attribute>,
        _flags: html5ever::interface::ElementFlags,
    ) -> Self::Handle {
        let mut element_node = dom_tree::ElementNode::new(name.local.to_string(), name);
        for attr in attrs {
            element_node
                .attributes
                .insert(attr.name.local.to_string(), attr.value.to_string());
        }
        Rc::new(RefCell::new(dom_tree::Node::Element(element_node)))
    }

    /// Comments are not kept; they become empty text nodes.
    fn create_comment(&self, _text: StrTendril) -> Self::Handle {
        Rc::new(RefCell::new(dom_tree::Node::Text(String::new())))
    }

    fn create_pi(&self, target: StrTendril, data: StrTendril) -> Self::Handle {
        let combined = format!("{} {}", target, data);
        Rc::new(RefCell::new(dom_tree::Node::Text(combined)))
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        let child_node = match child {
            NodeOrText::AppendNode(node) => node,
            NodeOrText::AppendText(text) => dom_tree::create_text(&text),
        };
        if dom_tree::is_element(&child_node) {
            dom_tree::detach(None, &child_node);
        }
        dom_tree::append_child(parent, child_node);
    }

    /// Foster parenting: insert before `element` when it is in the tree,
    /// otherwise append to `prev_element`.
    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        let has_parent = match &*element.borrow() {
            dom_tree::Node::Element(elem) => elem.parent.as_ref().and_then(|w| w.upgrade()).is_some(),
            _ => false,
        };
        if has_parent {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(
        &self,
        name: StrTendril,
        public_id: StrTendril,
        system_id: StrTendril,
    ) {
        *self.document.doctype.borrow_mut() = Some(dom_tree::Doctype {
            name: name.to_string(),
            public_id: public_id.to_string(),
            system_id: system_id.to_string(),
        });
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        target.clone()
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        Rc::ptr_eq(x, y)
    }

    fn set_quirks_mode(&self, mode: QuirksMode) {
        self.document.quirks_mode.set(mode);
    }

    fn append_before_sibling(&self, sibling: &Self::Handle, child: NodeOrText<Self::Handle>) {
        let child_node = match child {
            NodeOrText::AppendNode(node) => node,
            NodeOrText::AppendText(text) => dom_tree::create_text(&text),
        };
        dom_tree::insert_before(Some(&self.document.root), sibling, child_node);
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<html5ever::Attribute>) {
        if let dom_tree::Node::Element(elem_node) = &mut *target.borrow_mut() {
            for attr in attrs {
                let key = attr.name.local.to_string();
                if !elem_node.attributes.contains_key(&key) {
                    elem_node.attributes.insert(key, attr.value.to_string());
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        dom_tree::detach(Some(&self.document.root), target);
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        dom_tree::reparent_children(node, new_parent);
    }
}
