//! Selector text helpers: splitting selector groups, combining nested
//! selectors, stripping dynamic pseudo-classes and syntax validation.

use lightningcss::stylesheet::{ParserOptions, StyleSheet as LightningStyleSheet};
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Pseudo-classes and pseudo-elements that a static document query can never
/// match. They are removed before coverage queries.
static DYNAMIC_PSEUDO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":?:(after|before|hover|link|visited|active|focus(-within)?)")
        .expect("dynamic pseudo pattern is valid")
});

/// Class used in place of `&` when validating nested selectors on their own.
const NESTING_PLACEHOLDER: &str = ".rulecraft-parent";

/// Splits a selector group on commas that are not inside `()`, `[]` or quotes.
/// Every piece is trimmed. Like `str::split`, an empty input yields one empty piece.
pub fn split_alternatives(group: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in group.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '(') | (None, '[') => depth += 1,
            (None, ')') | (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                pieces.push(group[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(group[start..].trim());
    pieces
}

/// Cartesian product of two selector groups: every parent alternative (outer
/// loop) followed by every child alternative (inner loop), joined by a space.
pub fn combine(parent: &str, child: &str, separator: &str) -> String {
    let children = split_alternatives(child);
    let mut result = Vec::new();
    for p in split_alternatives(parent) {
        for c in &children {
            result.push(format!("{} {}", p, c).trim().to_string());
        }
    }
    result.join(separator).trim().to_string()
}

/// Folds a chain of selectors, outermost first, into one fully qualified
/// selector and collapses the nesting markers. Levels are combined on `", "`
/// and only the final alternatives are joined with `separator`, which may be
/// any text.
pub fn compose<'a, I>(chain: I, separator: &str) -> String
where
    I: DoubleEndedIterator<Item = &'a str>,
{
    let combined = chain
        .rev()
        .fold(String::new(), |inner, outer| combine(outer, &inner, ", "));
    let collapsed = collapse_nesting_markers(&combined);
    if separator == ", " {
        return collapsed;
    }
    split_alternatives(&collapsed).join(separator)
}

/// Removes a space followed by `&` (together with the `&`), and a space
/// directly before `>`, so `.x &:hover` reads `.x:hover`.
pub fn collapse_nesting_markers(selector: &str) -> String {
    let mut out = String::with_capacity(selector.len());
    let mut chars = selector.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == ' ' {
            match chars.peek() {
                Some('&') => {
                    chars.next();
                    continue;
                }
                Some('>') => continue,
                _ => {}
            }
        }
        out.push(ch);
    }
    out
}

/// Strips pseudo-classes that depend on user interaction or generated content.
pub fn strip_dynamic_pseudos(selector: &str) -> Cow<'_, str> {
    DYNAMIC_PSEUDO.replace_all(selector, "")
}

/// Rewrites one alternative so it stands alone: `&` becomes a placeholder
/// class and a leading combinator is anchored on the placeholder.
fn resolve_nesting(alternative: &str) -> String {
    let resolved = alternative.replace('&', NESTING_PLACEHOLDER);
    if resolved.starts_with(['>', '+', '~']) {
        format!("{} {}", NESTING_PLACEHOLDER, resolved)
    } else {
        resolved
    }
}

/// Checks selector syntax with lightningcss. Empty selectors, empty
/// alternatives and text that would produce anything other than exactly one
/// style rule are rejected.
pub fn is_valid_selector(selector: &str) -> bool {
    let selector = selector.trim();
    if selector.is_empty() {
        return false;
    }
    let alternatives = split_alternatives(selector);
    if alternatives.iter().any(|alt| alt.is_empty()) {
        return false;
    }
    let resolved = alternatives
        .into_iter()
        .map(resolve_nesting)
        .collect::<Vec<_>>()
        .join(", ");
    let css_text = format!("{}{{}}", resolved);

    let valid = match LightningStyleSheet::parse(&css_text, ParserOptions::default()) {
        Ok(sheet) => sheet.rules.0.len() == 1,
        Err(_) => false,
    };
    valid
}
