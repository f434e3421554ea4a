//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random action scripts against a
//! change-recording list, together with an interpreter that keeps the
//! scripts inside the folding algorithm's documented preconditions
//! (structural edits on the loaded region first, then appends, then removes
//! of appended elements).

use deltaview_model::{AttributeValue, RecordingList, ScalarValue};
use proptest::prelude::*;

/// A raw action script: interpreted phase by phase against a recording
/// list.
#[derive(Debug, Clone)]
pub struct ListScript {
    /// The loaded element labels.
    pub seed: Vec<String>,
    /// Remove positions, applied first (each taken modulo the current
    /// length).
    pub removes: Vec<usize>,
    /// Position/label replacement pairs, applied second.
    pub sets: Vec<(usize, String)>,
    /// Labels appended third.
    pub appends: Vec<String>,
    /// Remove positions inside the appended region, applied last.
    pub appended_removes: Vec<usize>,
}

fn label() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,6}").expect("valid regex")
}

/// Strategy for list scripts.
pub fn list_script_strategy() -> impl Strategy<Value = ListScript> {
    (
        prop::collection::vec(label(), 0..8),
        prop::collection::vec(any::<usize>(), 0..6),
        prop::collection::vec((any::<usize>(), label()), 0..4),
        prop::collection::vec(label(), 0..6),
        prop::collection::vec(any::<usize>(), 0..3),
    )
        .prop_map(|(seed, removes, sets, appends, appended_removes)| ListScript {
            seed,
            removes,
            sets,
            appends,
            appended_removes,
        })
}

fn text(value: &str) -> AttributeValue {
    AttributeValue::Scalar(ScalarValue::Text(value.into()))
}

/// Runs a script against a fresh recording list seeded with the script's
/// loaded elements, returning the original content and the mutated list.
#[must_use]
pub fn run_list_script(script: &ListScript) -> (Vec<AttributeValue>, RecordingList) {
    let original: Vec<AttributeValue> = script.seed.iter().map(|label| text(label)).collect();
    let mut list = RecordingList::from_elements(original.clone());

    for position in &script.removes {
        if list.is_empty() {
            break;
        }
        let index = position % list.len();
        list.remove(index).expect("index is in range");
    }
    for (position, label) in &script.sets {
        if list.is_empty() {
            break;
        }
        let index = position % list.len();
        list.set(index, text(label)).expect("index is in range");
    }
    let append_start = list.len();
    for label in &script.appends {
        list.push(text(label));
    }
    for position in &script.appended_removes {
        let appended = list.len().saturating_sub(append_start);
        if appended == 0 {
            break;
        }
        let index = append_start + position % appended;
        list.remove(index).expect("index is in range");
    }

    (original, list)
}

/// Strategy for valid scalar map keys.
pub fn map_key_strategy() -> impl Strategy<Value = ScalarValue> {
    label().prop_map(ScalarValue::Text)
}
