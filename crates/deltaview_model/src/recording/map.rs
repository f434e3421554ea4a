//! Change-recording map.

use crate::error::{ModelError, ModelResult};
use crate::value::ScalarValue;
use crate::view::AttributeValue;
use std::collections::BTreeMap;

/// A structural mutation recorded against a [`RecordingMap`].
#[derive(Debug, Clone)]
pub enum MapAction {
    /// Associate a key with a value.
    Put {
        /// The key.
        key: ScalarValue,
        /// The previously associated value, if the key was present.
        old: Option<AttributeValue>,
        /// The new value.
        new: AttributeValue,
    },
    /// Remove a key.
    Remove {
        /// The key.
        key: ScalarValue,
        /// The removed value.
        old: AttributeValue,
    },
}

/// A keyed container that records every structural mutation.
#[derive(Debug, Clone, Default)]
pub struct RecordingMap {
    current: BTreeMap<ScalarValue, AttributeValue>,
    actions: Vec<MapAction>,
}

impl RecordingMap {
    /// Creates an empty map with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map from loaded entries, with an empty log.
    #[must_use]
    pub fn from_entries(entries: Vec<(ScalarValue, AttributeValue)>) -> Self {
        Self {
            current: entries.into_iter().collect(),
            actions: Vec::new(),
        }
    }

    /// Returns the current entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Returns whether the map is currently empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &ScalarValue) -> Option<&AttributeValue> {
        self.current.get(key)
    }

    /// Returns the current content.
    #[must_use]
    pub fn entries(&self) -> &BTreeMap<ScalarValue, AttributeValue> {
        &self.current
    }

    /// Iterates the current entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ScalarValue, &AttributeValue)> {
        self.current.iter()
    }

    /// Associates `key` with `value`, recording the action.
    ///
    /// Returns the previously associated value, if any.
    pub fn put(&mut self, key: ScalarValue, value: AttributeValue) -> Option<AttributeValue> {
        let old = self.current.insert(key.clone(), value.clone());
        self.actions.push(MapAction::Put {
            key,
            old: old.clone(),
            new: value,
        });
        old
    }

    /// Removes `key`, recording the action.
    ///
    /// Returns the removed value, or `None` if the key was absent (absent
    /// keys record nothing).
    pub fn remove(&mut self, key: &ScalarValue) -> Option<AttributeValue> {
        let old = self.current.remove(key)?;
        self.actions.push(MapAction::Remove {
            key: key.clone(),
            old: old.clone(),
        });
        Some(old)
    }

    /// Removes every entry, recording one remove per entry.
    pub fn clear(&mut self) {
        let entries: Vec<(ScalarValue, AttributeValue)> =
            std::mem::take(&mut self.current).into_iter().collect();
        for (key, old) in entries {
            self.actions.push(MapAction::Remove { key, old });
        }
    }

    /// Moves the entry at `old_key` to `new_key` without recording an action.
    ///
    /// The element must be removed from the keyed container before its
    /// stored identity is rewritten and re-inserted afterwards; this
    /// operation performs both halves atomically against the current
    /// content.
    pub fn rekey(&mut self, old_key: &ScalarValue, new_key: ScalarValue) -> ModelResult<()> {
        let value = self
            .current
            .remove(old_key)
            .ok_or_else(|| ModelError::key_not_found(old_key.to_string()))?;
        self.current.insert(new_key, value);
        Ok(())
    }

    /// Associates `key` with `value` without recording an action.
    pub fn put_untracked(&mut self, key: ScalarValue, value: AttributeValue) {
        self.current.insert(key, value);
    }

    /// Returns the recorded action log.
    #[must_use]
    pub fn actions(&self) -> &[MapAction] {
        &self.actions
    }

    /// Returns whether any action has been recorded.
    #[must_use]
    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }

    /// Drops the action log, keeping the current content.
    pub fn reset_actions(&mut self) {
        self.actions.clear();
    }

    /// Returns a copy of the current content with an empty log.
    #[must_use]
    pub fn clone_content(&self) -> Self {
        Self {
            current: self.current.clone(),
            actions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ScalarValue {
        ScalarValue::Text(s.into())
    }

    fn val(i: i64) -> AttributeValue {
        AttributeValue::Scalar(ScalarValue::Integer(i))
    }

    #[test]
    fn put_records_old_and_new() {
        let mut map = RecordingMap::from_entries(vec![(key("a"), val(1))]);
        map.put(key("a"), val(2));
        match &map.actions()[0] {
            MapAction::Put { old, new, .. } => {
                assert_eq!(old, &Some(val(1)));
                assert_eq!(new, &val(2));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn remove_absent_key_records_nothing() {
        let mut map = RecordingMap::new();
        assert!(map.remove(&key("missing")).is_none());
        assert!(!map.has_actions());
    }

    #[test]
    fn clear_records_one_remove_per_entry() {
        let mut map = RecordingMap::from_entries(vec![(key("a"), val(1)), (key("b"), val(2))]);
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.actions().len(), 2);
    }

    #[test]
    fn rekey_moves_without_recording() {
        let mut map = RecordingMap::from_entries(vec![(key("a"), val(1))]);
        map.rekey(&key("a"), key("b")).unwrap();
        assert!(map.get(&key("a")).is_none());
        assert_eq!(map.get(&key("b")), Some(&val(1)));
        assert!(!map.has_actions());
    }

    #[test]
    fn rekey_missing_key_errors() {
        let mut map = RecordingMap::new();
        assert!(map.rekey(&key("a"), key("b")).is_err());
    }
}
