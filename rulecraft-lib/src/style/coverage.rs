//! Coverage: which rules match anything in a document, either at one point
//! in time or accumulated over a host-driven polling watch.

use crate::dom::dom_tree::{Document, NodeRef};
use crate::style::engine::StyleEngine;
use crate::style::rule::RuleId;
use crate::style::selector::strip_dynamic_pseudos;
use crate::style::stylesheet::SheetId;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// Matches of one rule at the time of the check.
#[derive(Debug, Clone)]
pub struct RuleCoverage {
    pub rule: RuleId,
    pub selector: String,
    pub count: usize,
    pub elements: Vec<NodeRef>,
}

#[derive(Debug, Clone)]
pub struct SheetCoverage {
    pub results: Vec<RuleCoverage>,
    pub covered: usize,
    pub total: usize,
    pub unused: Vec<RuleId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageStats {
    pub covered: usize,
    pub uncovered: usize,
    pub total: usize,
    pub covered_percent: f64,
    pub uncovered_percent: f64,
}

/// Covered/uncovered partition returned when a watch stops.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    pub covered: Vec<RuleId>,
    pub uncovered: Vec<RuleId>,
    pub stats: CoverageStats,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// No watch is running.
    Stopped,
    /// The interval since the last tick has not elapsed.
    NotDue,
    /// A tick ran; these rules matched for the first time.
    Ticked { newly_covered: Vec<RuleId> },
}

/// Watch state kept on each stylesheet.
#[derive(Debug, Clone)]
pub struct CoverageWatch {
    watching: bool,
    pending: Vec<RuleId>,
    covered: Vec<RuleId>,
    interval: Duration,
    next_due: Option<Instant>,
}

impl CoverageWatch {
    pub fn new(interval: Duration) -> Self {
        CoverageWatch {
            watching: false,
            pending: Vec::new(),
            covered: Vec::new(),
            interval,
            next_due: None,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watching
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn report(&self) -> CoverageReport {
        let covered = self.covered.len();
        let uncovered = self.pending.len();
        let total = covered + uncovered;
        let percent = |n: usize| {
            if total == 0 {
                0.0
            } else {
                n as f64 * 100.0 / total as f64
            }
        };
        CoverageReport {
            covered: self.covered.clone(),
            uncovered: self.pending.clone(),
            stats: CoverageStats {
                covered,
                uncovered,
                total,
                covered_percent: percent(covered),
                uncovered_percent: percent(uncovered),
            },
        }
    }
}

/// Queries with dynamic pseudo-classes removed, falling back to the selector
/// as written when the stripped one does not parse. A selector that fails
/// both ways matches nothing.
fn static_matches(document: &Document, selector: &str) -> Vec<NodeRef> {
    let stripped = strip_dynamic_pseudos(selector);
    match document.query_selector_all(&stripped) {
        Ok(found) => found,
        Err(stripped_err) => match document.query_selector_all(selector) {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    "coverage query for {:?} failed ({}; unstripped: {})",
                    selector, stripped_err, err
                );
                Vec::new()
            }
        },
    }
}

impl StyleEngine {
    /// Counts the elements currently matched by the rule's computed selector.
    pub fn check_coverage(&self, rule: RuleId, document: &Document) -> RuleCoverage {
        let selector = self.computed_selector(rule);
        let elements = static_matches(document, &selector);
        debug!("coverage {:?}: {} matches", selector, elements.len());
        RuleCoverage {
            rule,
            selector,
            count: elements.len(),
            elements,
        }
    }

    /// Checks every rule of the sheet, nested ones included.
    pub fn check_sheet_coverage(&self, sheet: SheetId, document: &Document) -> SheetCoverage {
        let results: Vec<RuleCoverage> = self
            .flatten_sheet(sheet)
            .into_iter()
            .map(|rule| self.check_coverage(rule, document))
            .collect();
        let unused: Vec<RuleId> = results
            .iter()
            .filter(|r| r.count == 0)
            .map(|r| r.rule)
            .collect();
        let total = results.len();
        let covered = total - unused.len();
        info!(
            "stylesheet {:?}: {}/{} rules match the document",
            sheet, covered, total
        );
        SheetCoverage {
            results,
            covered,
            total,
            unused,
        }
    }

    /// Starts or stops the coverage watch of a sheet.
    ///
    /// Starting snapshots the sheet's current rule tree as pending and
    /// returns `None`; starting an active watch changes nothing. Stopping
    /// returns the covered/uncovered partition accumulated so far, whether or
    /// not a watch was running.
    pub fn watch_coverage(&mut self, sheet: SheetId, enable: bool) -> Option<CoverageReport> {
        if enable {
            if self.sheet(sheet).watch.watching {
                return None;
            }
            let rules = self.flatten_sheet(sheet);
            let watch = &mut self.sheet_mut(sheet).watch;
            debug!("watching coverage of {} rules", rules.len());
            watch.pending = rules;
            watch.covered.clear();
            watch.watching = true;
            watch.next_due = Some(Instant::now() + watch.interval);
            None
        } else {
            let watch = &mut self.sheet_mut(sheet).watch;
            watch.watching = false;
            watch.next_due = None;
            let report = watch.report();
            info!(
                "coverage of stylesheet {:?}: {:.1}% covered ({}/{})",
                sheet, report.stats.covered_percent, report.stats.covered, report.stats.total
            );
            Some(report)
        }
    }

    /// Runs a watch tick if one is due at `now`. Pending rules that match
    /// anything become covered and are never checked again.
    pub fn poll_coverage(&mut self, sheet: SheetId, document: &Document, now: Instant) -> PollOutcome {
        let watch = &self.sheet(sheet).watch;
        if !watch.watching {
            return PollOutcome::Stopped;
        }
        if watch.next_due.is_some_and(|due| now < due) {
            return PollOutcome::NotDue;
        }

        let (newly_covered, still_pending): (Vec<RuleId>, Vec<RuleId>) = watch
            .pending
            .iter()
            .partition(|rule| !static_matches(document, &self.computed_selector(**rule)).is_empty());

        let watch = &mut self.sheet_mut(sheet).watch;
        watch.pending = still_pending;
        watch.covered.extend(newly_covered.iter().copied());
        watch.next_due = Some(now + watch.interval);
        if !newly_covered.is_empty() {
            debug!(
                "coverage tick: {} newly covered, {} pending",
                newly_covered.len(),
                watch.pending.len()
            );
        }
        PollOutcome::Ticked { newly_covered }
    }

    pub fn is_watching_coverage(&self, sheet: SheetId) -> bool {
        self.sheet(sheet).watch.watching
    }
}
