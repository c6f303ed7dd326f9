use crate::config::{EngineConfig, SheetDefinition};
use crate::error::Result;
use crate::parser::html;
use crate::style::engine::StyleEngine;

/// End-to-end operations behind the command line: load a definition, then
/// compile it, measure it against a page or inject it into one.
pub mod rulecraft {
    use super::*;
    use log::info;
    use std::fmt::Write as _;

    pub fn compile(config: &EngineConfig, definition: &SheetDefinition, minify: bool) -> Result<String> {
        let mut engine = StyleEngine::with_config(config.clone());
        let sheet = engine.load_sheet(definition)?;
        Ok(engine.compile_sheet(sheet, minify))
    }

    /// One line per rule (`<count>\t<selector>`), then the unused selectors.
    pub fn coverage(config: &EngineConfig, definition: &SheetDefinition, html_content: &str) -> Result<String> {
        let mut engine = StyleEngine::with_config(config.clone());
        let sheet = engine.load_sheet(definition)?;
        let document = html::create_dom_tree(html_content);
        let report = engine.check_sheet_coverage(sheet, &document);

        let mut out = String::new();
        for result in &report.results {
            let _ = writeln!(out, "{}\t{}", result.count, result.selector);
        }
        let _ = writeln!(out, "\n{}/{} rules used", report.covered, report.total);
        if !report.unused.is_empty() {
            out.push_str("unused:\n");
            for rule in &report.unused {
                let _ = writeln!(out, "  {}", engine.computed_selector(*rule));
            }
        }
        Ok(out)
    }

    /// Injects the sheet into the page and returns the page as HTML.
    /// `link` overrides the definition and config link mode when set.
    pub fn inject(
        config: &EngineConfig,
        definition: &SheetDefinition,
        html_content: &str,
        link: Option<bool>,
    ) -> Result<String> {
        let mut engine = StyleEngine::with_config(config.clone());
        let sheet = engine.load_sheet(definition)?;
        if let Some(link) = link {
            engine.set_link_mode(sheet, link);
        }
        let document = html::create_dom_tree(html_content);
        let css = engine.inject(sheet, &document);
        info!("injected {} bytes of CSS", css.len());
        Ok(html::serialize_document(&document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> SheetDefinition {
        SheetDefinition::from_toml_str(
            r#"
            [[rule]]
            selector = ".red"
            styles = { color = "red" }

              [[rule.rule]]
              selector = "> #blue"
              styles = { fontSize = "20px" }

            [[rule]]
            selector = "table"
            styles = { borderCollapse = "collapse" }
            "#,
        )
        .unwrap()
    }

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>t</title></head>
<body>
  <div class="red">Hello Red
    <div id="blue">Hello Blue</div>
  </div>
</body>
</html>"#;

    #[test]
    fn test_compile_minified() {
        let css = rulecraft::compile(&EngineConfig::default(), &definition(), true).unwrap();
        assert_eq!(
            css,
            ".red{color:red}.red> #blue{font-size:20px}table{border-collapse:collapse}"
        );
    }

    #[test]
    fn test_coverage_report_lists_unused() {
        let out = rulecraft::coverage(&EngineConfig::default(), &definition(), PAGE).unwrap();
        assert!(out.starts_with("1\t.red\n1\t.red> #blue\n0\ttable\n"));
        assert!(out.contains("2/3 rules used"));
        assert!(out.ends_with("unused:\n  table\n"));
    }

    #[test]
    fn test_inject_into_page() {
        let out = rulecraft::inject(&EngineConfig::default(), &definition(), PAGE, None).unwrap();
        assert!(out.contains(
            "<style>.red{color:red}.red> #blue{font-size:20px}table{border-collapse:collapse}</style></head>"
        ));
    }

    #[test]
    fn test_inject_as_link() {
        let out = rulecraft::inject(&EngineConfig::default(), &definition(), PAGE, Some(true)).unwrap();
        assert!(out.contains("<link rel=\"stylesheet\" href=\"data:text/css;base64,"));
        assert!(!out.contains("<style>"));
    }

    #[test]
    fn test_bad_definition_is_an_error() {
        let bad = SheetDefinition::from_toml_str(
            "[[rule]]\nselector = \"p\"\nstyles = { colour = \"red\" }",
        )
        .unwrap();
        assert!(rulecraft::compile(&EngineConfig::default(), &bad, false).is_err());
    }
}
