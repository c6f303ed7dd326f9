use crate::config::{EngineConfig, RuleDefinition, SheetDefinition};
use crate::error::Result;
use crate::style::rule::{Owner, RuleData, RuleId};
use crate::style::stylesheet::{SheetData, SheetId};
use log::debug;

/// Owns every rule and stylesheet. Rules and sheets refer to each other by id,
/// so reparenting only rewrites ids and never moves data.
#[derive(Debug, Default)]
pub struct StyleEngine {
    pub(crate) config: EngineConfig,
    pub(crate) rules: Vec<RuleData>,
    pub(crate) sheets: Vec<SheetData>,
}

/// Anything the engine can summarize for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inspectable {
    Rule(RuleId),
    Stylesheet(SheetId),
}

impl From<RuleId> for Inspectable {
    fn from(id: RuleId) -> Self {
        Inspectable::Rule(id)
    }
}

impl From<SheetId> for Inspectable {
    fn from(id: SheetId) -> Self {
        Inspectable::Stylesheet(id)
    }
}

impl StyleEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        StyleEngine {
            config,
            rules: Vec::new(),
            sheets: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub(crate) fn rule(&self, id: RuleId) -> &RuleData {
        &self.rules[id.0]
    }

    pub(crate) fn rule_mut(&mut self, id: RuleId) -> &mut RuleData {
        &mut self.rules[id.0]
    }

    pub(crate) fn sheet(&self, id: SheetId) -> &SheetData {
        &self.sheets[id.0]
    }

    pub(crate) fn sheet_mut(&mut self, id: SheetId) -> &mut SheetData {
        &mut self.sheets[id.0]
    }

    /// Builds a stylesheet and its whole rule tree from a definition.
    pub fn load_sheet(&mut self, definition: &SheetDefinition) -> Result<SheetId> {
        let mut roots = Vec::with_capacity(definition.rules.len());
        for rule in &definition.rules {
            roots.push(self.load_rule(rule)?);
        }
        let sheet = self.create_stylesheet(&roots);
        self.set_link_mode(sheet, definition.link.unwrap_or(self.config.link_mode));
        debug!(
            "loaded stylesheet {:?} with {} top-level rules",
            sheet,
            roots.len()
        );
        Ok(sheet)
    }

    fn load_rule(&mut self, definition: &RuleDefinition) -> Result<RuleId> {
        let id = self.create_rule_with(
            &definition.selector,
            definition
                .styles
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        )?;
        let mut children = Vec::with_capacity(definition.rules.len());
        for child in &definition.rules {
            children.push(self.load_rule(child)?);
        }
        self.add_rules(id, &children);
        Ok(id)
    }

    /// Plain-text summary of a rule or stylesheet: selectors, origin and compiled output.
    pub fn describe(&self, item: impl Into<Inspectable>) -> String {
        match item.into() {
            Inspectable::Rule(id) => {
                let rule = self.rule(id);
                let mut out = format!("Rule {:?}\n", rule.selector);
                out.push_str(&format!(
                    "  computed selector: {:?}\n",
                    self.computed_selector(id)
                ));
                out.push_str(&format!("  created at: {}\n", rule.created_at));
                out.push_str(&format!("  attached elements: {}\n", rule.attached.len()));
                if !rule.sub_rules.is_empty() {
                    out.push_str(&format!("  sub rules: {}\n", rule.sub_rules.len()));
                }
                out.push_str("  compiled:\n");
                for line in self.compile_rule(id, false).lines() {
                    out.push_str("    ");
                    out.push_str(line);
                    out.push('\n');
                }
                out
            }
            Inspectable::Stylesheet(id) => {
                let sheet = self.sheet(id);
                let mut out = format!(
                    "Stylesheet ({} rules, injected: {}, link: {})\n",
                    sheet.rules.len(),
                    sheet.injected,
                    sheet.link_mode
                );
                out.push_str(&format!("  created at: {}\n", sheet.created_at));
                for line in self.compile_sheet(id, false).lines() {
                    out.push_str("    ");
                    out.push_str(line);
                    out.push('\n');
                }
                out
            }
        }
    }

    /// True if `ancestor` appears on the owner chain of `rule` (or is `rule`).
    pub(crate) fn is_ancestor_or_self(&self, ancestor: RuleId, rule: RuleId) -> bool {
        let mut current = Some(rule);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = match self.rule(id).owner {
                Some(Owner::Rule(parent)) => Some(parent),
                _ => None,
            };
        }
        false
    }
}
