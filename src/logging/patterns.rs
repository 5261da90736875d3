// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error pattern detection over a request's error timeline.
//!
//! Four detectors run after every recorded error once the timeline holds at
//! least [`MIN_ERRORS_FOR_DETECTION`] entries:
//!
//! - **Recurring**: one error type appears 3+ times in the last 10 errors.
//! - **Cascade**: the last 5 errors walk up infrastructure → core → service →
//!   api across 3+ entries.
//! - **Burst**: 5+ errors inside the trailing 60 seconds.
//! - **Degradation**: the latest 5-minute window has more than 1.5× the errors
//!   of the 5 minutes before it.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::error_context::{ErrorInfo, Severity};
use super::fields::Fields;
use super::layer::Layer;

/// Detection is skipped below this many errors.
pub const MIN_ERRORS_FOR_DETECTION: usize = 3;

const RECURRING_WINDOW: usize = 10;
const RECURRING_MIN_OCCURRENCES: usize = 3;
const CASCADE_WINDOW: usize = 5;
const CASCADE_MIN_LENGTH: usize = 3;
const BURST_MIN_ERRORS: usize = 5;
const DEGRADATION_RATIO: f64 = 1.5;

/// One entry in the append-only error timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub layer: String,
    pub error: ErrorInfo,
    pub severity: Severity,
    pub metadata: Fields,
}

/// Kind of recognized error pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Recurring,
    Cascade,
    Burst,
    Degradation,
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatternType::Recurring => "recurring",
            PatternType::Cascade => "cascade",
            PatternType::Burst => "burst",
            PatternType::Degradation => "degradation",
        };
        f.write_str(name)
    }
}

/// A recognized pattern with its confidence and suggested remediation.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPattern {
    pub pattern_type: PatternType,
    pub description: String,
    pub confidence: f64,
    pub affected_layers: Vec<String>,
    pub first_occurrence: DateTime<Utc>,
    pub last_occurrence: DateTime<Utc>,
    pub frequency: usize,
    pub remediation: String,
}

impl ErrorPattern {
    /// Two patterns are the same pattern if type and first occurrence match.
    pub fn same_identity(&self, other: &ErrorPattern) -> bool {
        self.pattern_type == other.pattern_type && self.first_occurrence == other.first_occurrence
    }
}

/// Run every detector against `timeline`.
pub fn detect_patterns(timeline: &[TimelineEntry]) -> Vec<ErrorPattern> {
    if timeline.len() < MIN_ERRORS_FOR_DETECTION {
        return Vec::new();
    }

    let mut found = detect_recurring(timeline);
    found.extend(detect_cascade(timeline));
    found.extend(detect_burst(timeline));
    found.extend(detect_degradation(timeline));
    found
}

fn tail(timeline: &[TimelineEntry], n: usize) -> &[TimelineEntry] {
    &timeline[timeline.len().saturating_sub(n)..]
}

fn distinct_layers<'a>(entries: impl Iterator<Item = &'a TimelineEntry>) -> Vec<String> {
    let mut layers: Vec<String> = Vec::new();
    for entry in entries {
        if !layers.contains(&entry.layer) {
            layers.push(entry.layer.clone());
        }
    }
    layers
}

fn detect_recurring(timeline: &[TimelineEntry]) -> Vec<ErrorPattern> {
    let recent = tail(timeline, RECURRING_WINDOW);

    // Group by error type, keeping first-seen order for stable output.
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&TimelineEntry>> = HashMap::new();
    for entry in recent {
        let key = entry.error.error_type.as_str();
        groups
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(entry);
    }

    order
        .into_iter()
        .filter_map(|error_type| {
            let entries = groups.get(error_type)?;
            if entries.len() < RECURRING_MIN_OCCURRENCES {
                return None;
            }
            let first = entries.first()?;
            let last = entries.last()?;
            let layers = distinct_layers(entries.iter().copied());
            Some(ErrorPattern {
                pattern_type: PatternType::Recurring,
                description: format!(
                    "{error_type} occurred {} times in the last {} errors",
                    entries.len(),
                    recent.len()
                ),
                confidence: (entries.len() as f64 / RECURRING_WINDOW as f64).min(0.9),
                remediation: format!(
                    "Investigate the persistent {error_type} failure in {}; retries are unlikely to help",
                    layers.join(", ")
                ),
                affected_layers: layers,
                first_occurrence: first.timestamp,
                last_occurrence: last.timestamp,
                frequency: entries.len(),
            })
        })
        .collect()
}

fn detect_cascade(timeline: &[TimelineEntry]) -> Option<ErrorPattern> {
    let ranked: Vec<(&TimelineEntry, u8)> = tail(timeline, CASCADE_WINDOW)
        .iter()
        .filter_map(|entry| {
            entry
                .layer
                .parse::<Layer>()
                .ok()
                .map(|layer| (entry, layer.cascade_rank()))
        })
        .collect();

    // Longest contiguous run of strictly increasing rank.
    let mut best: &[(&TimelineEntry, u8)] = &[];
    let mut start = 0;
    for i in 1..=ranked.len() {
        let run_continues = i < ranked.len() && ranked[i].1 > ranked[i - 1].1;
        if !run_continues {
            if i - start > best.len() {
                best = &ranked[start..i];
            }
            start = i;
        }
    }

    if best.len() < CASCADE_MIN_LENGTH {
        return None;
    }

    let (first, _) = best.first()?;
    let (last, _) = best.last()?;
    let layers = distinct_layers(best.iter().map(|(entry, _)| *entry));
    Some(ErrorPattern {
        pattern_type: PatternType::Cascade,
        description: format!("Error cascaded through {}", layers.join(" -> ")),
        confidence: 0.8,
        affected_layers: layers,
        first_occurrence: first.timestamp,
        last_occurrence: last.timestamp,
        frequency: best.len(),
        remediation: "Check the infrastructure layer first; the root cause is likely a failing dependency"
            .to_string(),
    })
}

fn detect_burst(timeline: &[TimelineEntry]) -> Option<ErrorPattern> {
    let now = timeline.last()?.timestamp;
    let window_start = now - Duration::seconds(60);
    let recent: Vec<&TimelineEntry> = timeline
        .iter()
        .filter(|entry| entry.timestamp >= window_start)
        .collect();

    if recent.len() < BURST_MIN_ERRORS {
        return None;
    }

    let first = recent.first()?;
    Some(ErrorPattern {
        pattern_type: PatternType::Burst,
        description: format!("{} errors within 60 seconds", recent.len()),
        confidence: 0.9,
        affected_layers: distinct_layers(recent.iter().copied()),
        first_occurrence: first.timestamp,
        last_occurrence: now,
        frequency: recent.len(),
        remediation: "Throttle incoming work or open a circuit breaker until the burst subsides"
            .to_string(),
    })
}

fn detect_degradation(timeline: &[TimelineEntry]) -> Option<ErrorPattern> {
    let now = timeline.last()?.timestamp;
    let window = Duration::minutes(5);
    let recent_start = now - window;
    let older_start = recent_start - window;

    let recent: Vec<&TimelineEntry> = timeline
        .iter()
        .filter(|entry| entry.timestamp > recent_start)
        .collect();
    let older = timeline
        .iter()
        .filter(|entry| entry.timestamp > older_start && entry.timestamp <= recent_start)
        .count();

    if older == 0 || (recent.len() as f64) <= older as f64 * DEGRADATION_RATIO {
        return None;
    }

    let first = recent.first()?;
    Some(ErrorPattern {
        pattern_type: PatternType::Degradation,
        description: format!(
            "Error rate rising: {} errors in the last 5 minutes vs {older} before",
            recent.len()
        ),
        confidence: 0.7,
        affected_layers: distinct_layers(recent.iter().copied()),
        first_occurrence: first.timestamp,
        last_occurrence: now,
        frequency: recent.len(),
        remediation: "Check for resource exhaustion, leaks, or a recent deployment".to_string(),
    })
}
