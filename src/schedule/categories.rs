//! Collapses the category labels of a whole schedule into a small canonical set.
use crate::schedule::Session;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tracing::debug;
use tracing::info;

/// Sorted distinct non-empty categories
pub fn distinct_labels(sessions: &[Session]) -> Vec<String> {
    sessions
        .iter()
        .map(|session| session.group_header.trim())
        .filter(|label| !label.is_empty())
        .map(str::to_owned)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Makes a mapping total over `labels`: unknown keys are dropped, missing or blank targets map
/// a label to itself
pub fn repair_mapping(labels: &[String], mut mapping: BTreeMap<String, String>) -> BTreeMap<String, String> {
    labels
        .iter()
        .map(|label| {
            let target = mapping
                .remove(label)
                .map(|target| target.trim().to_owned())
                .filter(|target| !target.is_empty())
                .unwrap_or_else(|| label.clone());
            (label.clone(), target)
        })
        .collect()
}

pub fn apply_mapping(sessions: &mut [Session], mapping: &BTreeMap<String, String>) {
    for session in sessions.iter_mut() {
        if let Some(target) = mapping.get(session.group_header.trim()) {
            session.group_header = target.clone();
        }
    }
}

/// Copies the category of another session with exactly the same name
pub fn backfill_by_name(sessions: &mut [Session]) {
    let mut by_name: BTreeMap<String, String> = BTreeMap::new();
    for session in sessions.iter().filter(|session| !session.group_header.is_empty()) {
        by_name.entry(session.name.clone()).or_insert_with(|| session.group_header.clone());
    }
    for session in sessions.iter_mut().filter(|session| session.group_header.is_empty()) {
        if let Some(category) = by_name.get(&session.name) {
            session.group_header = category.clone();
        }
    }
}

/// Assigns the longest known category contained in the session name, ignoring case
pub fn backfill_by_substring(sessions: &mut [Session]) {
    let mut known = distinct_labels(sessions);
    known.sort_by_key(|label| std::cmp::Reverse(label.chars().count()));
    let lowered: Vec<(String, &String)> = known.iter().map(|label| (label.to_lowercase(), label)).collect();
    for session in sessions.iter_mut().filter(|session| session.group_header.is_empty()) {
        let name = session.name.to_lowercase();
        if let Some((_, label)) = lowered.iter().find(|(lower, _)| name.contains(lower.as_str())) {
            session.group_header = (*label).clone();
        }
    }
}

/// Normalizes categories in place.
///
/// # Arguments
///
/// * `sessions` - Every session of the meeting
/// * `simplify` - Text service call producing a mapping for the sorted distinct labels
///
/// # Returns
///
/// The repaired mapping, empty when at most one distinct label exists
pub fn normalize_categories<F>(sessions: &mut [Session], simplify: F) -> BTreeMap<String, String>
where
    F: FnOnce(&[String]) -> BTreeMap<String, String>,
{
    let labels = distinct_labels(sessions);
    if labels.len() <= 1 {
        debug!(labels = labels.len(), "category normalization skipped");
        return BTreeMap::new();
    }

    let mapping = repair_mapping(&labels, simplify(&labels));
    apply_mapping(sessions, &mapping);
    backfill_by_name(sessions);
    backfill_by_substring(sessions);

    let simplified: BTreeSet<&String> = mapping.values().collect();
    info!(original = labels.len(), simplified = simplified.len(), "categories normalized");
    mapping
}
