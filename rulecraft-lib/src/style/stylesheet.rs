use crate::dom::dom_tree::{self, Document, NodeRef};
use crate::style::coverage::CoverageWatch;
use crate::style::engine::StyleEngine;
use crate::style::rule::{Owner, RuleId};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, trace};
use std::panic::Location;

/// Handle to a stylesheet owned by a [`StyleEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SheetId(pub(crate) usize);

#[derive(Debug)]
pub(crate) struct SheetData {
    pub(crate) rules: Vec<RuleId>,
    pub(crate) injected: bool,
    pub(crate) style_element: Option<NodeRef>,
    pub(crate) link_mode: bool,
    pub(crate) watch: CoverageWatch,
    pub(crate) created_at: &'static Location<'static>,
}

fn data_uri(css: &str) -> String {
    format!("data:text/css;base64,{}", STANDARD.encode(css))
}

impl StyleEngine {
    /// Creates a stylesheet owning the given rules as its top-level rules.
    #[track_caller]
    pub fn create_stylesheet(&mut self, rules: &[RuleId]) -> SheetId {
        let created_at = Location::caller();
        let id = SheetId(self.sheets.len());
        self.sheets.push(SheetData {
            rules: Vec::with_capacity(rules.len()),
            injected: false,
            style_element: None,
            link_mode: self.config.link_mode,
            watch: CoverageWatch::new(self.config.coverage_interval()),
            created_at,
        });
        for &rule in rules {
            self.adopt(rule, Owner::Sheet(id));
        }
        debug!("created stylesheet {:?} with {} rules", id, rules.len());
        id
    }

    /// Appends top-level rules, moving them out of any previous owner, and
    /// refreshes the injected node.
    pub fn add_rules_to_sheet(&mut self, sheet: SheetId, rules: &[RuleId]) -> SheetId {
        for &rule in rules {
            self.adopt(rule, Owner::Sheet(sheet));
        }
        self.update_sheet(sheet);
        sheet
    }

    pub fn sheet_rules(&self, sheet: SheetId) -> &[RuleId] {
        &self.sheet(sheet).rules
    }

    pub fn is_injected(&self, sheet: SheetId) -> bool {
        self.sheet(sheet).injected
    }

    /// The `<style>` or `<link>` node created by [`StyleEngine::inject`].
    pub fn style_element(&self, sheet: SheetId) -> Option<&NodeRef> {
        self.sheet(sheet).style_element.as_ref()
    }

    pub fn link_mode(&self, sheet: SheetId) -> bool {
        self.sheet(sheet).link_mode
    }

    /// Chooses between `<link>` and `<style>` for the next injection.
    /// Has no effect on an already injected sheet.
    pub fn set_link_mode(&mut self, sheet: SheetId, link_mode: bool) {
        self.sheet_mut(sheet).link_mode = link_mode;
    }

    pub fn compile_sheet(&self, sheet: SheetId, minify: bool) -> String {
        let compiled: Vec<String> = self
            .sheet(sheet)
            .rules
            .iter()
            .map(|rule| self.compile_rule(*rule, minify))
            .collect();
        compiled.join(if minify { "" } else { "\n" })
    }

    /// Adds the minified sheet to the document head and returns the CSS that
    /// was written. Injecting twice does nothing and returns an empty string.
    pub fn inject(&mut self, sheet: SheetId, document: &Document) -> String {
        if self.sheet(sheet).injected {
            debug!("stylesheet {:?} already injected", sheet);
            return String::new();
        }
        let css = self.compile_sheet(sheet, true);
        let link_mode = self.sheet(sheet).link_mode;

        let node = if link_mode {
            dom_tree::create_element("link", &[("rel", "stylesheet"), ("href", &data_uri(&css))])
        } else {
            let style = dom_tree::create_element("style", &[]);
            dom_tree::set_text_content(&style, &css);
            style
        };
        document.append_to_head(node.clone());

        let rules = self.sheet(sheet).rules.clone();
        for rule in rules {
            self.rule_mut(rule).owner = Some(Owner::Sheet(sheet));
        }
        let data = self.sheet_mut(sheet);
        data.style_element = Some(node);
        data.injected = true;
        debug!(
            "injected stylesheet {:?} as <{}> ({} bytes)",
            sheet,
            if link_mode { "link" } else { "style" },
            css.len()
        );
        css
    }

    /// Rewrites the injected node with a fresh minified compile. Does nothing
    /// before injection.
    pub fn update_sheet(&self, sheet: SheetId) {
        let data = self.sheet(sheet);
        let Some(node) = data.style_element.as_ref().filter(|_| data.injected) else {
            return;
        };
        let css = self.compile_sheet(sheet, true);
        if dom_tree::tag_name(node).as_deref() == Some("link") {
            dom_tree::set_attribute(node, "href", &data_uri(&css));
        } else {
            dom_tree::set_text_content(node, &css);
        }
        trace!("refreshed injected stylesheet {:?}", sheet);
    }

    /// Every rule of the sheet, pre-order.
    pub fn flatten_sheet(&self, sheet: SheetId) -> Vec<RuleId> {
        self.sheet(sheet)
            .rules
            .iter()
            .flat_map(|rule| self.flatten_rule(*rule))
            .collect()
    }

    /// Finds any rule of the sheet by computed selector, searching pre-order.
    pub fn find_rule_in_sheet(&self, sheet: SheetId, selector: &str) -> Option<RuleId> {
        self.flatten_sheet(sheet)
            .into_iter()
            .find(|rule| self.selector_matches_query(*rule, selector))
    }
}
