pub mod config;
pub mod dom;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod style;

pub use config::{EngineConfig, RuleDefinition, SheetDefinition};
pub use error::{CssError, Result};
pub use style::coverage::{CoverageReport, CoverageStats, PollOutcome, RuleCoverage, SheetCoverage};
pub use style::engine::{Inspectable, StyleEngine};
pub use style::rule::{Owner, RuleId, StyleMap, StyleValue};
pub use style::stylesheet::SheetId;
