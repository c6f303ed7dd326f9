pub mod coverage;
pub mod css_matcher;
pub mod engine;
pub mod properties;
pub mod rule;
pub mod selector;
pub mod stylesheet;
