//! Fused actions for unordered collections.

use deltaview_model::{AttributeValue, ListAction};

/// The net effect of an action log against an unordered collection: the
/// elements to remove and the elements to add, with add/remove pairs of the
/// same identity cancelled out.
#[derive(Debug, Clone, Default)]
pub struct FusedCollectionActions {
    removed: Vec<AttributeValue>,
    added: Vec<AttributeValue>,
}

impl FusedCollectionActions {
    /// Folds an action log into its net add/remove sets.
    #[must_use]
    pub fn new(actions: &[ListAction]) -> Self {
        let mut fused = Self::default();
        for action in actions {
            match action {
                ListAction::Insert { value, .. } | ListAction::Append { value, .. } => {
                    fused.fold_add(value);
                }
                ListAction::Remove { old, .. } => fused.fold_remove(old),
                ListAction::Set { old, new, .. } => {
                    fused.fold_remove(old);
                    fused.fold_add(new);
                }
                ListAction::Trim { removed, .. } => {
                    for old in removed {
                        fused.fold_remove(old);
                    }
                }
            }
        }
        fused
    }

    fn fold_remove(&mut self, value: &AttributeValue) {
        // Removing something still pending as an add cancels the add.
        if let Some(position) = self.added.iter().position(|v| v.identity_eq(value)) {
            self.added.remove(position);
        } else {
            self.removed.push(value.clone());
        }
    }

    fn fold_add(&mut self, value: &AttributeValue) {
        // Re-adding something pending as a remove cancels the remove.
        if let Some(position) = self.removed.iter().position(|v| v.identity_eq(value)) {
            self.removed.remove(position);
        } else {
            self.added.push(value.clone());
        }
    }

    /// The elements to remove from the stored collection.
    #[must_use]
    pub fn removed(&self) -> &[AttributeValue] {
        &self.removed
    }

    /// The elements to add to the stored collection.
    #[must_use]
    pub fn added(&self) -> &[AttributeValue] {
        &self.added
    }

    /// The number of operations the summary will issue.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.removed.len() + self.added.len()
    }

    /// Returns whether the log collapsed to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}
