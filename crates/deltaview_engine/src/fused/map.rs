//! Fused actions for maps.

use deltaview_model::{AttributeValue, MapAction, ScalarValue};
use std::collections::BTreeMap;

/// The net effect of an action log against a keyed collection: three
/// disjoint sets of removed keys, added entries, and replaced entries.
#[derive(Debug, Clone, Default)]
pub struct FusedMapActions {
    removed: BTreeMap<ScalarValue, AttributeValue>,
    added: BTreeMap<ScalarValue, AttributeValue>,
    replaced: BTreeMap<ScalarValue, (AttributeValue, AttributeValue)>,
}

impl FusedMapActions {
    /// Folds an action log into its net removed/added/replaced sets.
    ///
    /// `value_dirty` reports whether a value has internal changes of its
    /// own; a put that restores a removed key with the same value identity
    /// still becomes a replace when the value is independently dirty.
    #[must_use]
    pub fn new(actions: &[MapAction], value_dirty: &dyn Fn(&AttributeValue) -> bool) -> Self {
        let mut fused = Self::default();
        for action in actions {
            match action {
                MapAction::Put { key, old, new } => fused.fold_put(key, old.as_ref(), new, value_dirty),
                MapAction::Remove { key, old } => fused.fold_remove(key, old),
            }
        }
        fused
    }

    fn fold_put(
        &mut self,
        key: &ScalarValue,
        old: Option<&AttributeValue>,
        new: &AttributeValue,
        value_dirty: &dyn Fn(&AttributeValue) -> bool,
    ) {
        if let Some(pending_old) = self.removed.remove(key) {
            // A put whose key matches a pending remove cancels the remove,
            // unless the value identity changed or the new value is
            // independently dirty — then it is a replace.
            if !pending_old.identity_eq(new) || value_dirty(new) {
                self.replaced
                    .insert(key.clone(), (pending_old, new.clone()));
            }
            return;
        }
        if self.added.contains_key(key) {
            // Re-put over a pending add stays an add, with the latest value.
            self.added.insert(key.clone(), new.clone());
            return;
        }
        if let Some((original_old, _)) = self.replaced.remove(key) {
            if !original_old.identity_eq(new) || value_dirty(new) {
                self.replaced
                    .insert(key.clone(), (original_old, new.clone()));
            }
            return;
        }
        match old {
            Some(old) if old.identity_eq(new) && !value_dirty(new) => {}
            Some(old) => {
                self.replaced.insert(key.clone(), (old.clone(), new.clone()));
            }
            None => {
                self.added.insert(key.clone(), new.clone());
            }
        }
    }

    fn fold_remove(&mut self, key: &ScalarValue, old: &AttributeValue) {
        // A remove whose key matches a pending add cancels the add.
        if self.added.remove(key).is_some() {
            return;
        }
        if let Some((original_old, _)) = self.replaced.remove(key) {
            self.removed.insert(key.clone(), original_old);
            return;
        }
        self.removed.insert(key.clone(), old.clone());
    }

    /// The keys to remove, with the values they held.
    #[must_use]
    pub fn removed(&self) -> &BTreeMap<ScalarValue, AttributeValue> {
        &self.removed
    }

    /// The entries to add.
    #[must_use]
    pub fn added(&self) -> &BTreeMap<ScalarValue, AttributeValue> {
        &self.added
    }

    /// The entries to replace, with old and new values.
    #[must_use]
    pub fn replaced(&self) -> &BTreeMap<ScalarValue, (AttributeValue, AttributeValue)> {
        &self.replaced
    }

    /// The number of operations the summary will issue.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.removed.len() + self.added.len() + self.replaced.len()
    }

    /// Returns whether the log collapsed to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.replaced.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltaview_model::RecordingMap;

    fn key(s: &str) -> ScalarValue {
        ScalarValue::Text(s.into())
    }

    fn val(i: i64) -> AttributeValue {
        AttributeValue::Scalar(ScalarValue::Integer(i))
    }

    fn never_dirty(_: &AttributeValue) -> bool {
        false
    }

    #[test]
    fn remove_then_put_same_value_is_empty() {
        let mut map = RecordingMap::from_entries(vec![(key("k1"), val(1)), (key("k2"), val(2))]);
        map.remove(&key("k1"));
        map.put(key("k1"), val(1));
        let fused = FusedMapActions::new(map.actions(), &never_dirty);
        assert!(fused.is_empty());
    }

    #[test]
    fn remove_then_put_different_value_is_replace() {
        let mut map = RecordingMap::from_entries(vec![(key("k"), val(1))]);
        map.remove(&key("k"));
        map.put(key("k"), val(2));
        let fused = FusedMapActions::new(map.actions(), &never_dirty);
        assert!(fused.removed().is_empty());
        assert!(fused.added().is_empty());
        assert_eq!(fused.replaced().get(&key("k")), Some(&(val(1), val(2))));
    }

    #[test]
    fn remove_then_put_dirty_value_is_replace() {
        let mut map = RecordingMap::from_entries(vec![(key("k"), val(1))]);
        map.remove(&key("k"));
        map.put(key("k"), val(1));
        let always_dirty = |_: &AttributeValue| true;
        let fused = FusedMapActions::new(map.actions(), &always_dirty);
        assert_eq!(fused.replaced().len(), 1);
    }

    #[test]
    fn put_then_remove_cancels_the_add() {
        let mut map = RecordingMap::new();
        map.put(key("k"), val(1));
        map.remove(&key("k"));
        let fused = FusedMapActions::new(map.actions(), &never_dirty);
        assert!(fused.is_empty());
    }

    #[test]
    fn direct_overwrite_is_replace() {
        let mut map = RecordingMap::from_entries(vec![(key("k"), val(1))]);
        map.put(key("k"), val(2));
        let fused = FusedMapActions::new(map.actions(), &never_dirty);
        assert_eq!(fused.replaced().get(&key("k")), Some(&(val(1), val(2))));
    }

    #[test]
    fn replace_then_remove_reports_original_value() {
        let mut map = RecordingMap::from_entries(vec![(key("k"), val(1))]);
        map.put(key("k"), val(2));
        map.remove(&key("k"));
        let fused = FusedMapActions::new(map.actions(), &never_dirty);
        assert_eq!(fused.removed().get(&key("k")), Some(&val(1)));
        assert!(fused.replaced().is_empty());
    }

    #[test]
    fn sets_are_disjoint() {
        let mut map = RecordingMap::from_entries(vec![(key("a"), val(1)), (key("b"), val(2))]);
        map.remove(&key("a"));
        map.put(key("b"), val(3));
        map.put(key("c"), val(4));
        let fused = FusedMapActions::new(map.actions(), &never_dirty);
        assert_eq!(fused.removed().len(), 1);
        assert_eq!(fused.replaced().len(), 1);
        assert_eq!(fused.added().len(), 1);
        assert_eq!(fused.operation_count(), 3);
    }
}
