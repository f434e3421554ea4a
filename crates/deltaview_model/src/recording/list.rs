//! Change-recording list.

use crate::error::{ModelError, ModelResult};
use crate::view::AttributeValue;

/// A structural mutation recorded against a [`RecordingList`].
///
/// Indices are the positions observed at the time the action was recorded,
/// i.e. against the list content as it was at that moment.
#[derive(Debug, Clone)]
pub enum ListAction {
    /// Insert a value at an interior index, shifting later elements right.
    Insert {
        /// Position at record time.
        index: usize,
        /// The inserted value.
        value: AttributeValue,
    },
    /// Append a value at the end.
    Append {
        /// The length of the list at record time (the appended position).
        index: usize,
        /// The appended value.
        value: AttributeValue,
    },
    /// Replace the value at an index.
    Set {
        /// Position at record time.
        index: usize,
        /// The previous value.
        old: AttributeValue,
        /// The new value.
        new: AttributeValue,
    },
    /// Remove the value at an index, shifting later elements left.
    Remove {
        /// Position at record time.
        index: usize,
        /// The removed value.
        old: AttributeValue,
    },
    /// Remove every element from `from` to the end.
    ///
    /// Each removed element is logically removed at position `from`, one
    /// after the other.
    Trim {
        /// First removed position.
        from: usize,
        /// The removed values, in their former order.
        removed: Vec<AttributeValue>,
    },
}

/// An ordered container that records every structural mutation.
///
/// The current content and the action log are kept side by side; the log is
/// append-only until [`RecordingList::reset_actions`] is called after a
/// successful flush.
#[derive(Debug, Clone, Default)]
pub struct RecordingList {
    current: Vec<AttributeValue>,
    actions: Vec<ListAction>,
}

impl RecordingList {
    /// Creates an empty list with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a list from loaded elements, with an empty log.
    #[must_use]
    pub fn from_elements(elements: Vec<AttributeValue>) -> Self {
        Self {
            current: elements,
            actions: Vec::new(),
        }
    }

    /// Returns the current length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Returns whether the list is currently empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Returns the element at `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&AttributeValue> {
        self.current.get(index)
    }

    /// Returns the current content as a slice.
    #[must_use]
    pub fn elements(&self) -> &[AttributeValue] {
        &self.current
    }

    /// Iterates the current content.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeValue> {
        self.current.iter()
    }

    /// Appends a value, recording the action.
    pub fn push(&mut self, value: AttributeValue) {
        self.actions.push(ListAction::Append {
            index: self.current.len(),
            value: value.clone(),
        });
        self.current.push(value);
    }

    /// Inserts a value at `index`, recording the action.
    ///
    /// Inserting at the current length is recorded as an append.
    pub fn insert(&mut self, index: usize, value: AttributeValue) -> ModelResult<()> {
        if index > self.current.len() {
            return Err(ModelError::IndexOutOfBounds {
                index,
                len: self.current.len(),
            });
        }
        if index == self.current.len() {
            self.push(value);
        } else {
            self.actions.push(ListAction::Insert {
                index,
                value: value.clone(),
            });
            self.current.insert(index, value);
        }
        Ok(())
    }

    /// Replaces the value at `index`, recording the action and returning the
    /// previous value.
    pub fn set(&mut self, index: usize, value: AttributeValue) -> ModelResult<AttributeValue> {
        let len = self.current.len();
        let slot = self
            .current
            .get_mut(index)
            .ok_or(ModelError::IndexOutOfBounds { index, len })?;
        let old = std::mem::replace(slot, value.clone());
        self.actions.push(ListAction::Set {
            index,
            old: old.clone(),
            new: value,
        });
        Ok(old)
    }

    /// Removes the value at `index`, recording the action.
    pub fn remove(&mut self, index: usize) -> ModelResult<AttributeValue> {
        if index >= self.current.len() {
            return Err(ModelError::IndexOutOfBounds {
                index,
                len: self.current.len(),
            });
        }
        let old = self.current.remove(index);
        self.actions.push(ListAction::Remove {
            index,
            old: old.clone(),
        });
        Ok(old)
    }

    /// Removes every element from `from` to the end, recording one trim.
    pub fn trim(&mut self, from: usize) {
        if from >= self.current.len() {
            return;
        }
        let removed: Vec<AttributeValue> = self.current.drain(from..).collect();
        self.actions.push(ListAction::Trim { from, removed });
    }

    /// Removes all elements, recording a trim from position zero.
    pub fn clear(&mut self) {
        self.trim(0);
    }

    /// Replaces the element at `index` without recording an action.
    ///
    /// Used when an element's stored identity is rewritten during a flush;
    /// the positional content changes but no structural mutation happened.
    pub fn replace_untracked(&mut self, index: usize, value: AttributeValue) -> ModelResult<()> {
        let len = self.current.len();
        let slot = self
            .current
            .get_mut(index)
            .ok_or(ModelError::IndexOutOfBounds { index, len })?;
        *slot = value;
        Ok(())
    }

    /// Returns the recorded action log.
    #[must_use]
    pub fn actions(&self) -> &[ListAction] {
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
    use crate::value::ScalarValue;

    fn text(s: &str) -> AttributeValue {
        AttributeValue::Scalar(ScalarValue::Text(s.into()))
    }

    fn texts(list: &RecordingList) -> Vec<String> {
        list.iter()
            .map(|v| match v {
                AttributeValue::Scalar(ScalarValue::Text(s)) => s.clone(),
                other => panic!("unexpected element {other:?}"),
            })
            .collect()
    }

    #[test]
    fn push_records_append_with_position() {
        let mut list = RecordingList::from_elements(vec![text("a")]);
        list.push(text("b"));
        assert_eq!(texts(&list), vec!["a", "b"]);
        assert!(
            matches!(&list.actions()[0], ListAction::Append { index: 1, .. }),
            "append should carry the record-time position"
        );
    }

    #[test]
    fn insert_at_len_is_an_append() {
        let mut list = RecordingList::from_elements(vec![text("a")]);
        list.insert(1, text("b")).unwrap();
        assert!(matches!(&list.actions()[0], ListAction::Append { .. }));
    }

    #[test]
    fn interior_insert_records_insert() {
        let mut list = RecordingList::from_elements(vec![text("a"), text("c")]);
        list.insert(1, text("b")).unwrap();
        assert_eq!(texts(&list), vec!["a", "b", "c"]);
        assert!(matches!(&list.actions()[0], ListAction::Insert { index: 1, .. }));
    }

    #[test]
    fn remove_records_old_value() {
        let mut list = RecordingList::from_elements(vec![text("a"), text("b")]);
        let old = list.remove(0).unwrap();
        assert_eq!(old, text("a"));
        assert_eq!(texts(&list), vec!["b"]);
    }

    #[test]
    fn set_records_old_and_new() {
        let mut list = RecordingList::from_elements(vec![text("a")]);
        list.set(0, text("z")).unwrap();
        match &list.actions()[0] {
            ListAction::Set { index: 0, old, new } => {
                assert_eq!(old, &text("a"));
                assert_eq!(new, &text("z"));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn clear_records_trim_from_zero() {
        let mut list = RecordingList::from_elements(vec![text("a"), text("b")]);
        list.clear();
        assert!(list.is_empty());
        match &list.actions()[0] {
            ListAction::Trim { from: 0, removed } => assert_eq!(removed.len(), 2),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn replace_untracked_leaves_log_empty() {
        let mut list = RecordingList::from_elements(vec![text("a")]);
        list.replace_untracked(0, text("b")).unwrap();
        assert!(!list.has_actions());
        assert_eq!(texts(&list), vec!["b"]);
    }

    #[test]
    fn out_of_bounds_operations_error() {
        let mut list = RecordingList::new();
        assert!(list.remove(0).is_err());
        assert!(list.set(0, text("x")).is_err());
        assert!(list.insert(1, text("x")).is_err());
    }

    #[test]
    fn reset_actions_keeps_content() {
        let mut list = RecordingList::new();
        list.push(text("a"));
        list.reset_actions();
        assert!(!list.has_actions());
        assert_eq!(list.len(), 1);
    }
}
