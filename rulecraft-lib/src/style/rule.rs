use crate::dom::dom_tree::{self, NodeRef};
use crate::dom::InlineStyle;
use crate::error::{CssError, Result};
use crate::style::engine::StyleEngine;
use crate::style::properties::{is_valid_property, normalize_property_name};
use crate::style::selector::{compose, is_valid_selector, split_alternatives};
use crate::style::stylesheet::SheetId;
use indexmap::IndexMap;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;
use std::rc::Rc;

/// Handle to a rule owned by a [`StyleEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(pub(crate) usize);

/// What a rule is nested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Rule(RuleId),
    Sheet(SheetId),
}

/// A declaration value: either literal text or a bare number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for StyleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleValue::Number(n) => write!(f, "{}", n),
            StyleValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for StyleValue {
    fn from(value: &str) -> Self {
        StyleValue::Text(value.to_string())
    }
}

impl From<String> for StyleValue {
    fn from(value: String) -> Self {
        StyleValue::Text(value)
    }
}

impl From<f64> for StyleValue {
    fn from(value: f64) -> Self {
        StyleValue::Number(value)
    }
}

impl From<i32> for StyleValue {
    fn from(value: i32) -> Self {
        StyleValue::Number(value as f64)
    }
}

/// Declarations of one rule in insertion order, keyed by kebab-case name.
pub type StyleMap = IndexMap<String, StyleValue>;

/// An element a rule is force-applied to, with the `style` attribute it had
/// before (`None` when it had none).
#[derive(Debug, Clone)]
pub struct Attachment {
    pub element: NodeRef,
    pub original_style: Option<String>,
}

#[derive(Debug)]
pub(crate) struct RuleData {
    pub(crate) selector: String,
    pub(crate) styles: StyleMap,
    pub(crate) owner: Option<Owner>,
    pub(crate) sub_rules: Vec<RuleId>,
    pub(crate) attached: Vec<Attachment>,
    pub(crate) created_at: &'static Location<'static>,
}

/// Formats a style map as `name: value;` lines.
pub fn declarations_to_string(styles: &StyleMap) -> String {
    styles
        .iter()
        .map(|(name, value)| format!("{}: {};", normalize_property_name(name), value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Merges declarations into an element's inline style attribute.
fn apply_to_element(element: &NodeRef, styles: &StyleMap) {
    if styles.is_empty() {
        return;
    }
    let current = dom_tree::get_attribute(element, "style").unwrap_or_default();
    let mut inline = InlineStyle::parse(&current);
    for (name, value) in styles {
        inline.set(name, &value.to_string());
    }
    dom_tree::set_attribute(element, "style", &inline.to_string());
}

/// Takes one declaration back off an element. A value the element carried
/// before it was attached is restored; otherwise the declaration is dropped
/// and an emptied `style` attribute is removed.
fn clear_from_element(attachment: &Attachment, name: &str) {
    let current = dom_tree::get_attribute(&attachment.element, "style").unwrap_or_default();
    let mut inline = InlineStyle::parse(&current);
    let original = attachment.original_style.as_deref().map(InlineStyle::parse);
    match original.as_ref().and_then(|style| style.get(name)) {
        Some(value) => inline.set(name, value),
        None => {
            inline.remove(name);
        }
    }
    if inline.is_empty() {
        dom_tree::remove_attribute(&attachment.element, "style");
    } else {
        dom_tree::set_attribute(&attachment.element, "style", &inline.to_string());
    }
}

impl StyleEngine {
    /// Creates a rule with no declarations.
    #[track_caller]
    pub fn create_rule(&mut self, selector: &str) -> Result<RuleId> {
        self.create_rule_with(selector, std::iter::empty::<(String, StyleValue)>())
    }

    /// Creates a rule with initial declarations. camelCase names are rewritten
    /// to kebab-case; every name that is then neither a known property nor a
    /// custom property is reported in a single error.
    #[track_caller]
    pub fn create_rule_with<I, K, V>(&mut self, selector: &str, styles: I) -> Result<RuleId>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<StyleValue>,
    {
        let created_at = Location::caller();
        if self.config.validate_selectors && !is_valid_selector(selector) {
            return Err(CssError::InvalidSelector(selector.to_string()));
        }

        let mut map = StyleMap::new();
        let mut invalid = Vec::new();
        for (name, value) in styles {
            let name = name.into();
            let normalized = normalize_property_name(&name);
            if is_valid_property(&normalized) {
                map.insert(normalized, value.into());
            } else {
                invalid.push(name);
            }
        }
        if !invalid.is_empty() {
            return Err(CssError::InvalidProperties(invalid));
        }

        let id = RuleId(self.rules.len());
        self.rules.push(RuleData {
            selector: selector.to_string(),
            styles: map,
            owner: None,
            sub_rules: Vec::new(),
            attached: Vec::new(),
            created_at,
        });
        debug!("created rule {:?} for {:?} at {}", id, selector, created_at);
        Ok(id)
    }

    pub fn selector(&self, rule: RuleId) -> &str {
        &self.rule(rule).selector
    }

    pub fn styles(&self, rule: RuleId) -> &StyleMap {
        &self.rule(rule).styles
    }

    pub fn style(&self, rule: RuleId, name: &str) -> Option<&StyleValue> {
        self.rule(rule).styles.get(&normalize_property_name(name))
    }

    pub fn owner(&self, rule: RuleId) -> Option<Owner> {
        self.rule(rule).owner
    }

    pub fn sub_rules(&self, rule: RuleId) -> &[RuleId] {
        &self.rule(rule).sub_rules
    }

    pub fn attached_elements(&self, rule: RuleId) -> impl Iterator<Item = &NodeRef> {
        self.rule(rule).attached.iter().map(|a| &a.element)
    }

    pub fn created_at(&self, rule: RuleId) -> &'static Location<'static> {
        self.rule(rule).created_at
    }

    /// Sets one declaration, then re-applies styles to attached elements and
    /// propagates the update through every owner up to the stylesheet.
    pub fn set_style(
        &mut self,
        rule: RuleId,
        name: &str,
        value: impl Into<StyleValue>,
    ) -> Result<()> {
        let normalized = normalize_property_name(name);
        if !is_valid_property(&normalized) {
            return Err(CssError::InvalidProperty(name.to_string()));
        }
        self.rule_mut(rule).styles.insert(normalized, value.into());
        self.update_rule(rule);
        Ok(())
    }

    /// Removes a declaration, also from the inline style of attached elements.
    /// Returns the old value, if there was one.
    pub fn remove_style(&mut self, rule: RuleId, name: &str) -> Option<StyleValue> {
        let normalized = normalize_property_name(name);
        let removed = self.rule_mut(rule).styles.shift_remove(&normalized)?;
        for attachment in &self.rule(rule).attached {
            clear_from_element(attachment, &normalized);
        }
        self.update_rule(rule);
        Some(removed)
    }

    /// Re-applies this rule's styles to its attached elements, then updates its owner.
    pub fn update_rule(&self, rule: RuleId) {
        let data = self.rule(rule);
        trace!(
            "updating rule {:?} on {} attached elements",
            rule,
            data.attached.len()
        );
        for attachment in &data.attached {
            apply_to_element(&attachment.element, &data.styles);
        }
        match data.owner {
            Some(Owner::Rule(parent)) => self.update_rule(parent),
            Some(Owner::Sheet(sheet)) => self.update_sheet(sheet),
            None => {}
        }
    }

    /// Detaches `child` from its current owner's child list and records the new owner.
    pub(crate) fn adopt(&mut self, child: RuleId, owner: Owner) {
        match self.rule(child).owner {
            Some(Owner::Rule(previous)) => self.rule_mut(previous).sub_rules.retain(|r| *r != child),
            Some(Owner::Sheet(previous)) => self.sheet_mut(previous).rules.retain(|r| *r != child),
            None => {}
        }
        self.rule_mut(child).owner = Some(owner);
        match owner {
            Owner::Rule(parent) => self.rule_mut(parent).sub_rules.push(child),
            Owner::Sheet(sheet) => self.sheet_mut(sheet).rules.push(child),
        }
    }

    /// Nests rules inside `parent`. A rule already nested elsewhere is moved,
    /// not copied. Rules that would become their own ancestor are skipped.
    pub fn add_rules(&mut self, parent: RuleId, children: &[RuleId]) -> RuleId {
        for &child in children {
            if self.is_ancestor_or_self(child, parent) {
                warn!(
                    "not nesting rule {:?} inside {:?}: it would contain itself",
                    child, parent
                );
                continue;
            }
            self.adopt(child, Owner::Rule(parent));
            debug!("nested rule {:?} inside {:?}", child, parent);
        }
        parent
    }

    /// Selector chain from the outermost enclosing rule down to `rule`.
    fn selector_chain(&self, rule: RuleId) -> Vec<&str> {
        let mut chain = vec![self.rule(rule).selector.as_str()];
        let mut current = self.rule(rule).owner;
        while let Some(Owner::Rule(parent)) = current {
            chain.push(self.rule(parent).selector.as_str());
            current = self.rule(parent).owner;
        }
        chain.reverse();
        chain
    }

    /// The fully qualified selector of a rule in its current nesting, with
    /// alternatives separated by `", "`.
    pub fn computed_selector(&self, rule: RuleId) -> String {
        self.computed_selector_joined(rule, ", ")
    }

    /// Like [`computed_selector`](Self::computed_selector), with the final
    /// alternatives joined by `separator`.
    pub fn computed_selector_joined(&self, rule: RuleId, separator: &str) -> String {
        compose(self.selector_chain(rule).into_iter(), separator)
    }

    /// Compiles a rule and its nested rules to CSS text.
    pub fn compile_rule(&self, rule: RuleId, minify: bool) -> String {
        let data = self.rule(rule);
        let children: String = data
            .sub_rules
            .iter()
            .map(|child| self.compile_rule(*child, minify))
            .collect();
        if data.styles.is_empty() {
            return children;
        }

        if minify {
            let selector = self.computed_selector_joined(rule, ",");
            let declarations = data
                .styles
                .iter()
                .map(|(name, value)| format!("{}:{}", name, value))
                .collect::<Vec<_>>()
                .join(";");
            format!("{}{{{}}}{}", selector, declarations, children)
        } else {
            let selector = self.computed_selector_joined(rule, ",\n");
            let declarations = data
                .styles
                .iter()
                .map(|(name, value)| format!("{}: {};", name, value))
                .collect::<Vec<_>>()
                .join("\n    ");
            format!("{} {{\n    {}\n}}\n\n{}", selector, declarations, children)
        }
    }

    /// Force-applies the rule's declarations to the inline style of each
    /// element, remembering the attribute each had before. Non-element nodes
    /// are ignored.
    pub fn attach_to(&mut self, rule: RuleId, elements: &[NodeRef]) {
        for element in elements {
            if !dom_tree::is_element(element) {
                trace!("skipping non-element attach target for rule {:?}", rule);
                continue;
            }
            let original_style = dom_tree::get_attribute(element, "style");
            let data = self.rule_mut(rule);
            data.attached.push(Attachment {
                element: element.clone(),
                original_style,
            });
            apply_to_element(element, &data.styles);
            trace!("attached rule {:?}", rule);
        }
    }

    /// Stops tracking an element. With `revert`, its `style` attribute goes
    /// back to exactly what it was when attached, dropping any later inline
    /// edits. Unknown elements are ignored.
    pub fn detach_from(&mut self, rule: RuleId, element: &NodeRef, revert: bool) {
        if !dom_tree::is_element(element) {
            return;
        }
        let data = self.rule_mut(rule);
        let Some(index) = data
            .attached
            .iter()
            .position(|a| Rc::ptr_eq(&a.element, element))
        else {
            return;
        };
        let attachment = data.attached.remove(index);
        if revert {
            match attachment.original_style {
                Some(style) => dom_tree::set_attribute(element, "style", &style),
                None => dom_tree::remove_attribute(element, "style"),
            }
        }
        trace!("detached rule {:?} (revert: {})", rule, revert);
    }

    /// The rule and all its descendants, pre-order.
    pub fn flatten_rule(&self, rule: RuleId) -> Vec<RuleId> {
        let mut out = vec![rule];
        for child in &self.rule(rule).sub_rules {
            out.extend(self.flatten_rule(*child));
        }
        out
    }

    /// True if `query` is the rule's computed selector or one of its alternatives.
    pub(crate) fn selector_matches_query(&self, rule: RuleId, query: &str) -> bool {
        let query = query.trim();
        let computed = self.computed_selector(rule);
        computed == query || split_alternatives(&computed).contains(&query)
    }

    /// Finds a descendant of `rule` by computed selector, searching pre-order.
    pub fn find_rule_in(&self, rule: RuleId, selector: &str) -> Option<RuleId> {
        self.rule(rule)
            .sub_rules
            .iter()
            .flat_map(|child| self.flatten_rule(*child))
            .find(|candidate| self.selector_matches_query(*candidate, selector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::dom::dom_tree::{create_element, create_text, get_attribute};

    #[test]
    fn test_root_selector_is_normalized() {
        let mut engine = StyleEngine::new();
        let rule = engine.create_rule(" a ,  b ").unwrap();
        assert_eq!(engine.computed_selector(rule), "a, b");
    }

    #[test]
    fn test_nested_selectors_form_cartesian_product() {
        let mut engine = StyleEngine::new();
        let parent = engine.create_rule("a, b").unwrap();
        let child = engine.create_rule("c, d").unwrap();
        engine.add_rules(parent, &[child]);
        assert_eq!(engine.computed_selector(child), "a c, a d, b c, b d");
    }

    #[test]
    fn test_ampersand_joins_without_space() {
        let mut engine = StyleEngine::new();
        let parent = engine.create_rule(".x").unwrap();
        let child = engine.create_rule("&:hover").unwrap();
        engine.add_rules(parent, &[child]);
        assert_eq!(engine.computed_selector(child), ".x:hover");
    }

    #[test]
    fn test_construction_reports_every_invalid_property() {
        let mut engine = StyleEngine::new();
        let err = engine
            .create_rule_with(
                ".a",
                [("color", "red"), ("totallyFakeProp", "1"), ("nope", "2")],
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid style properties: totallyFakeProp, nope"
        );
        assert_eq!(engine.rule_count(), 0);
    }

    #[test]
    fn test_construction_normalizes_camel_case() {
        let mut engine = StyleEngine::new();
        let rule = engine
            .create_rule_with(".a", [("backgroundColor", "red"), ("--brandColor", "blue")])
            .unwrap();
        let names: Vec<&str> = engine.styles(rule).keys().map(String::as_str).collect();
        assert_eq!(names, vec!["background-color", "--brandColor"]);
    }

    #[test]
    fn test_invalid_selector_is_rejected_unless_headless() {
        let mut engine = StyleEngine::new();
        assert!(matches!(
            engine.create_rule("..nope"),
            Err(CssError::InvalidSelector(_))
        ));

        let mut headless = StyleEngine::with_config(EngineConfig {
            validate_selectors: false,
            ..EngineConfig::default()
        });
        assert!(headless.create_rule("").is_ok());
    }

    #[test]
    fn test_set_style_rejects_unknown_without_mutation() {
        let mut engine = StyleEngine::new();
        let rule = engine.create_rule_with(".a", [("color", "red")]).unwrap();
        let err = engine.set_style(rule, "totallyFakeProp", "1").unwrap_err();
        assert!(matches!(err, CssError::InvalidProperty(ref name) if name == "totallyFakeProp"));
        assert_eq!(engine.styles(rule).len(), 1);

        engine.set_style(rule, "--my-var", 3).unwrap();
        engine.set_style(rule, "fontSize", "12px").unwrap();
        assert_eq!(engine.style(rule, "--my-var"), Some(&StyleValue::Number(3.0)));
        assert_eq!(engine.style(rule, "font-size").map(|v| v.to_string()).as_deref(), Some("12px"));
    }

    #[test]
    fn test_set_style_keeps_declaration_position() {
        let mut engine = StyleEngine::new();
        let rule = engine
            .create_rule_with("p", [("color", "red"), ("margin", "0")])
            .unwrap();
        engine.set_style(rule, "color", "blue").unwrap();
        assert_eq!(engine.compile_rule(rule, true), "p{color:blue;margin:0}");
    }

    #[test]
    fn test_remove_style() {
        let mut engine = StyleEngine::new();
        let rule = engine
            .create_rule_with("p", [("color", "red"), ("marginTop", "1em")])
            .unwrap();
        assert_eq!(
            engine.remove_style(rule, "marginTop"),
            Some(StyleValue::from("1em"))
        );
        assert_eq!(engine.remove_style(rule, "margin-top"), None);
        assert_eq!(engine.compile_rule(rule, true), "p{color:red}");
    }

    #[test]
    fn test_compile_pretty_and_minified() {
        let mut engine = StyleEngine::new();
        let parent = engine
            .create_rule_with("a, b", [("color", "red"), ("padding", "2px")])
            .unwrap();
        let child = engine.create_rule_with("&:hover", [("opacity", 0.5)]).unwrap();
        engine.add_rules(parent, &[child]);

        assert_eq!(
            engine.compile_rule(parent, false),
            "a,\nb {\n    color: red;\n    padding: 2px;\n}\n\na:hover,\nb:hover {\n    opacity: 0.5;\n}\n\n"
        );
        assert_eq!(
            engine.compile_rule(parent, true),
            "a,b{color:red;padding:2px}a:hover,b:hover{opacity:0.5}"
        );
    }

    #[test]
    fn test_empty_parent_compiles_to_children_only() {
        let mut engine = StyleEngine::new();
        let parent = engine.create_rule(".wrap").unwrap();
        let child = engine.create_rule_with("p", [("margin", 0)]).unwrap();
        engine.add_rules(parent, &[child]);
        assert_eq!(engine.compile_rule(parent, true), ".wrap p{margin:0}");
        assert_eq!(engine.compile_rule(parent, false), ".wrap p {\n    margin: 0;\n}\n\n");
    }

    #[test]
    fn test_add_rules_reparents_instead_of_duplicating() {
        let mut engine = StyleEngine::new();
        let first = engine.create_rule(".first").unwrap();
        let second = engine.create_rule(".second").unwrap();
        let child = engine.create_rule("span").unwrap();
        engine.add_rules(first, &[child]);
        engine.add_rules(second, &[child]);

        assert!(engine.sub_rules(first).is_empty());
        assert_eq!(engine.sub_rules(second), &[child]);
        assert_eq!(engine.owner(child), Some(Owner::Rule(second)));
        assert_eq!(engine.computed_selector(child), ".second span");
    }

    #[test]
    fn test_add_rules_refuses_cycles() {
        let mut engine = StyleEngine::new();
        let outer = engine.create_rule(".outer").unwrap();
        let inner = engine.create_rule(".inner").unwrap();
        engine.add_rules(outer, &[inner]);
        engine.add_rules(inner, &[outer, inner]);
        assert_eq!(engine.owner(outer), None);
        assert!(engine.sub_rules(inner).is_empty());
    }

    #[test]
    fn test_attach_then_detach_restores_attribute() {
        let mut engine = StyleEngine::new();
        let rule = engine
            .create_rule_with(".a", [("color", "red"), ("margin", "0")])
            .unwrap();
        let styled = create_element("div", &[("style", "color:green;display: block")]);
        let plain = create_element("div", &[]);

        engine.attach_to(rule, &[styled.clone(), plain.clone(), create_text("x")]);
        assert_eq!(
            get_attribute(&styled, "style").as_deref(),
            Some("color: red; display: block; margin: 0;")
        );
        assert_eq!(get_attribute(&plain, "style").as_deref(), Some("color: red; margin: 0;"));
        assert_eq!(engine.attached_elements(rule).count(), 2);

        engine.detach_from(rule, &styled, true);
        engine.detach_from(rule, &plain, true);
        assert_eq!(
            get_attribute(&styled, "style").as_deref(),
            Some("color:green;display: block")
        );
        assert_eq!(get_attribute(&plain, "style"), None);
        assert_eq!(engine.attached_elements(rule).count(), 0);
    }

    #[test]
    fn test_detach_without_revert_keeps_styles() {
        let mut engine = StyleEngine::new();
        let rule = engine.create_rule_with(".a", [("color", "red")]).unwrap();
        let el = create_element("p", &[]);
        engine.attach_to(rule, &[el.clone()]);
        engine.detach_from(rule, &el, false);
        engine.detach_from(rule, &el, true);
        assert_eq!(get_attribute(&el, "style").as_deref(), Some("color: red;"));
    }

    #[test]
    fn test_style_write_reaches_attached_elements() {
        let mut engine = StyleEngine::new();
        let parent = engine.create_rule_with(".a", [("color", "red")]).unwrap();
        let child = engine.create_rule_with("p", [("margin", "0")]).unwrap();
        engine.add_rules(parent, &[child]);
        let parent_el = create_element("div", &[]);
        let child_el = create_element("p", &[]);
        engine.attach_to(parent, &[parent_el.clone()]);
        engine.attach_to(child, &[child_el.clone()]);

        engine.set_style(child, "margin", "4px").unwrap();
        assert_eq!(get_attribute(&child_el, "style").as_deref(), Some("margin: 4px;"));
        assert_eq!(get_attribute(&parent_el, "style").as_deref(), Some("color: red;"));
    }

    #[test]
    fn test_remove_style_reaches_attached_elements() {
        let mut engine = StyleEngine::new();
        let rule = engine
            .create_rule_with("p", [("color", "red"), ("margin", "0")])
            .unwrap();
        let bare = create_element("p", &[]);
        let styled = create_element("p", &[("style", "color: blue; padding: 1px;")]);
        engine.attach_to(rule, &[bare.clone(), styled.clone()]);

        engine.remove_style(rule, "color");
        assert_eq!(get_attribute(&bare, "style").as_deref(), Some("margin: 0;"));
        assert_eq!(
            get_attribute(&styled, "style").as_deref(),
            Some("color: blue; padding: 1px; margin: 0;")
        );

        engine.remove_style(rule, "margin");
        assert_eq!(get_attribute(&bare, "style"), None);
        assert_eq!(
            get_attribute(&styled, "style").as_deref(),
            Some("color: blue; padding: 1px;")
        );
    }

    #[test]
    fn test_find_rule_by_computed_selector() {
        let mut engine = StyleEngine::new();
        let root = engine.create_rule(".menu, .bar").unwrap();
        let item = engine.create_rule("li").unwrap();
        let link = engine.create_rule("a").unwrap();
        engine.add_rules(item, &[link]);
        engine.add_rules(root, &[item]);

        assert_eq!(engine.find_rule_in(root, ".bar li a"), Some(link));
        assert_eq!(engine.find_rule_in(root, ".menu li, .bar li"), Some(item));
        assert_eq!(engine.find_rule_in(root, ".menu"), None);
    }

    #[test]
    fn test_declarations_to_string() {
        let mut styles = StyleMap::new();
        styles.insert("color".into(), "red".into());
        styles.insert("zIndex".into(), 2.into());
        assert_eq!(declarations_to_string(&styles), "color: red;\nz-index: 2;");
    }
}
