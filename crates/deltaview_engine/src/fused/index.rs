//! Fused actions for indexed lists.
//!
//! Folds an ordered action log into a minimal operation set against the
//! stored positional index: run-length-encoded remove ranges, interval
//! index translations that batch-renumber surviving rows, single-position
//! replaces, and a trailing append list.
//!
//! Preconditions carried over from the folding rules:
//! - Only a remove followed by an insert at the same resulting position
//!   collapses into a replace; the reverse order is not recomposed. A single
//!   list-set action therefore contributes at most one replace operation.
//! - Appends are assumed to stay trailing: once an append is recorded,
//!   interior inserts below the append region are not re-translated under
//!   it.

use deltaview_model::{AttributeValue, ListAction};

/// Sentinel for an unbounded interval end.
const END: i64 = i64::MAX;

/// A single removal at a stored position.
#[derive(Debug, Clone)]
struct RemoveOperation {
    index: i64,
    removed: AttributeValue,
}

/// A contiguous run of removals; `start` inclusive, `end` exclusive.
#[derive(Debug, Clone)]
pub struct RemoveRange {
    /// First removed position, inclusive.
    pub start: i64,
    /// End position, exclusive.
    pub end: i64,
    removed: Vec<AttributeValue>,
}

impl RemoveRange {
    /// The removed elements, in position order.
    #[must_use]
    pub fn removed(&self) -> &[AttributeValue] {
        &self.removed
    }
}

/// An interval renumbering: positions in `[start, end]` shift by `offset`.
#[derive(Debug, Clone)]
pub struct IndexTranslation {
    /// First affected position, inclusive.
    pub start: i64,
    /// Last affected position, inclusive ([`i64::MAX`] = unbounded).
    pub end: i64,
    /// The shift applied to affected positions.
    pub offset: i64,
    removes: Vec<RemoveOperation>,
}

/// A single-position replacement. An operation without an old value is an
/// insert at that position.
#[derive(Debug, Clone)]
pub struct ReplaceOperation {
    /// The stored position.
    pub index: i64,
    new_value: AttributeValue,
    old_value: Option<AttributeValue>,
}

impl ReplaceOperation {
    /// The value written at the position.
    #[must_use]
    pub fn new_value(&self) -> &AttributeValue {
        &self.new_value
    }

    /// The value previously at the position, or `None` when the operation
    /// is a positional insert.
    #[must_use]
    pub fn old_value(&self) -> Option<&AttributeValue> {
        self.old_value.as_ref()
    }
}

/// The compressed net effect of an indexed-list action log.
///
/// Applying `{removes, translations, replaces, appends}` to the stored
/// collection in that order reproduces the content and ordering that
/// replaying the raw log would have produced.
#[derive(Debug, Clone)]
pub struct FusedCollectionIndexActions {
    remove_ranges: Vec<RemoveRange>,
    translations: Vec<IndexTranslation>,
    replaces: Vec<ReplaceOperation>,
    appended: Vec<AttributeValue>,
    append_index: Option<i64>,
    remove_count: usize,
    add_count: usize,
    update_count: usize,
}

impl FusedCollectionIndexActions {
    /// Folds an action log.
    ///
    /// `element_dirty` reports whether an element has internal changes of
    /// its own; a remove/insert pair restoring the same identity still
    /// survives as a replace when the element is independently dirty.
    #[must_use]
    pub fn new(actions: &[ListAction], element_dirty: &dyn Fn(&AttributeValue) -> bool) -> Self {
        let mut translations: Vec<IndexTranslation> = Vec::new();
        let mut replaces: Vec<ReplaceOperation> = Vec::new();
        let mut appended: Vec<AttributeValue> = Vec::new();
        // The position at and after which only appends happen.
        let mut append_index: i64 = END;

        for action in actions {
            let mut inserted: Vec<(AttributeValue, i64)> = Vec::new();
            let mut appended_entries: Vec<(AttributeValue, i64)> = Vec::new();
            let mut removed: Vec<(AttributeValue, i64)> = Vec::new();
            let mut trimmed: Vec<(AttributeValue, i64)> = Vec::new();
            match action {
                ListAction::Insert { index, value } => {
                    inserted.push((value.clone(), *index as i64));
                }
                ListAction::Append { index, value } => {
                    appended_entries.push((value.clone(), *index as i64));
                }
                ListAction::Set { index, old, new } => {
                    removed.push((old.clone(), *index as i64));
                    inserted.push((new.clone(), *index as i64));
                }
                ListAction::Remove { index, old } => {
                    removed.push((old.clone(), *index as i64));
                }
                ListAction::Trim { from, removed: values } => {
                    // A trim removes each element at the trim position, one
                    // after the other.
                    for value in values {
                        trimmed.push((value.clone(), *from as i64));
                    }
                }
            }

            for (value, recorded_index) in removed {
                if append_index <= recorded_index {
                    // Removing a pending append just drops it from the
                    // append list.
                    let index_to_remove = (recorded_index - append_index) as usize;
                    if index_to_remove < appended.len() {
                        appended.remove(index_to_remove);
                    }
                    if appended.is_empty() {
                        append_index = END;
                    }
                } else {
                    let index = apply_index_translations(&translations, -recorded_index);
                    let remove = RemoveOperation {
                        index,
                        removed: value,
                    };
                    add_translate_operation(
                        &mut translations,
                        index,
                        END,
                        -1,
                        Some(remove),
                        None,
                        element_dirty,
                    );
                }
            }
            for (value, recorded_index) in trimmed {
                let index = apply_index_translations(&translations, -recorded_index);
                append_index = append_index.min(index);
                let remove = RemoveOperation {
                    index,
                    removed: value,
                };
                add_translate_operation(
                    &mut translations,
                    index,
                    END,
                    -1,
                    Some(remove),
                    None,
                    element_dirty,
                );
            }
            for (value, index) in inserted {
                if append_index < index && append_index + appended.len() as i64 == index {
                    // Inserting into the last position is an append.
                    appended_entries.push((value, index));
                } else {
                    let mut replace = ReplaceOperation {
                        index,
                        new_value: value,
                        old_value: None,
                    };
                    if add_translate_operation(
                        &mut translations,
                        index,
                        END,
                        1,
                        None,
                        Some(&mut replace),
                        element_dirty,
                    ) {
                        replaces.push(replace);
                    }
                }
            }
            'appends: for (value, index) in appended_entries {
                for i in 0..translations.len() {
                    let translation = &translations[i];
                    // Look only at intervals that removed the range this
                    // append falls into.
                    if translation.offset == -1
                        && translation.start <= index
                        && index <= translation.end
                    {
                        let mut cancelled = None;
                        for (j, remove) in translation.removes.iter().enumerate() {
                            if index == remove.index {
                                if remove.removed.identity_eq(&value) {
                                    cancelled = Some(j);
                                }
                                break;
                            }
                        }
                        if let Some(j) = cancelled {
                            // Re-adding an object removed before: drop the
                            // remove and skip the append.
                            translations[i].removes.remove(j);
                            if translations[i].removes.is_empty() {
                                translations.remove(i);
                            }
                            continue 'appends;
                        }
                        break;
                    }
                }
                append_index = append_index.min(index);
                appended.push(value);
            }
        }

        // Collect removals out of the surviving intervals, trimming or
        // dropping intervals that reach into the append region.
        let mut remove_operations: Vec<RemoveOperation> = Vec::new();
        if append_index != END {
            let mut i = 0;
            while i < translations.len() {
                remove_operations.extend(translations[i].removes.iter().cloned());
                if translations[i].end == END {
                    let start = translations[i].start;
                    let removes_len = translations[i].removes.len() as i64;
                    let removes_empty = translations[i].removes.is_empty();
                    // An unbounded interval that starts after the append
                    // region and removes nothing, or that removes a full
                    // tail without leaving holes, can be dropped.
                    if start > append_index && removes_empty
                        || start + removes_len == append_index + 1
                    {
                        translations.remove(i);
                        continue;
                    }
                    translations[i].end = append_index;
                }
                i += 1;
            }
        } else {
            for translation in &translations {
                remove_operations.extend(translation.removes.iter().cloned());
            }
        }

        remove_operations.sort_by_key(|remove| remove.index);
        remove_operations.dedup_by_key(|remove| remove.index);

        let mut remove_ranges: Vec<RemoveRange> = Vec::new();
        for remove in remove_operations {
            match remove_ranges.last_mut() {
                Some(last) if last.end == remove.index => {
                    last.end += 1;
                    last.removed.push(remove.removed);
                }
                _ => remove_ranges.push(RemoveRange {
                    start: remove.index,
                    end: remove.index + 1,
                    removed: vec![remove.removed],
                }),
            }
        }

        let mut update_count = translations.len();
        let mut add_count = appended.len();
        for replace in &replaces {
            if replace.old_value.is_none() {
                add_count += 1;
            } else {
                update_count += 1;
            }
        }

        Self {
            remove_count: remove_ranges.len(),
            remove_ranges,
            translations,
            replaces,
            appended,
            append_index: if append_index == END {
                None
            } else {
                Some(append_index)
            },
            add_count,
            update_count,
        }
    }

    /// The remove ranges, in ascending position order.
    #[must_use]
    pub fn remove_ranges(&self) -> &[RemoveRange] {
        &self.remove_ranges
    }

    /// The interval renumberings, in fold order.
    #[must_use]
    pub fn translations(&self) -> &[IndexTranslation] {
        &self.translations
    }

    /// The single-position replaces.
    #[must_use]
    pub fn replaces(&self) -> &[ReplaceOperation] {
        &self.replaces
    }

    /// The trailing appends, in order.
    #[must_use]
    pub fn appended(&self) -> &[AttributeValue] {
        &self.appended
    }

    /// The position of the first trailing append, if any.
    #[must_use]
    pub fn append_index(&self) -> Option<i64> {
        self.append_index
    }

    /// The removed elements across all ranges, in position order.
    #[must_use]
    pub fn removed_elements(&self) -> Vec<AttributeValue> {
        self.remove_ranges
            .iter()
            .flat_map(|range| range.removed.iter().cloned())
            .collect()
    }

    /// The number of remove operations the summary will issue.
    #[must_use]
    pub fn remove_count(&self) -> usize {
        self.remove_count
    }

    /// The number of add operations the summary will issue.
    #[must_use]
    pub fn add_count(&self) -> usize {
        self.add_count
    }

    /// The number of update operations the summary will issue.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.update_count
    }

    /// The total number of operations.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.remove_count + self.add_count + self.update_count
    }

    /// Returns whether the log collapsed to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0
    }

    /// Applies the compressed operations to an in-memory copy of the
    /// original content.
    ///
    /// Index translations renumber stored positions only; for contiguous
    /// in-memory content they are a no-op.
    pub fn apply_to(&self, elements: &mut Vec<AttributeValue>) {
        for range in self.remove_ranges.iter().rev() {
            for index in (range.start..range.end).rev() {
                let index = index as usize;
                if index < elements.len() {
                    elements.remove(index);
                }
            }
        }
        for replace in &self.replaces {
            let index = replace.index as usize;
            if replace.old_value.is_some() {
                if index < elements.len() {
                    elements[index] = replace.new_value.clone();
                }
            } else if index <= elements.len() {
                elements.insert(index, replace.new_value.clone());
            } else {
                elements.push(replace.new_value.clone());
            }
        }
        elements.extend(self.appended.iter().cloned());
    }
}

/// Maps a recorded position back to its stored position by undoing the
/// shifts of every interval that covers it.
///
/// Callers pass the negated recorded position: adding an interval's offset
/// to the negative value subtracts the shift that interval applied, and the
/// absolute value is re-checked against later intervals.
fn apply_index_translations(translations: &[IndexTranslation], index: i64) -> i64 {
    let mut index = index;
    let mut abs_index = index.abs();
    for translation in translations {
        if abs_index >= translation.start && abs_index <= translation.end {
            index += translation.offset;
            abs_index = index.abs();
        }
    }
    abs_index
}

/// Folds a new shift interval into the existing ones, merging neighbouring
/// intervals with matching ends, splitting partially overlapped ones, and
/// collapsing a remove followed by an insert at the same position into a
/// replace.
///
/// Returns whether the caller's replace operation (if any) survives as an
/// output operation.
fn add_translate_operation(
    translations: &mut Vec<IndexTranslation>,
    start: i64,
    end: i64,
    offset: i64,
    remove: Option<RemoveOperation>,
    mut replace: Option<&mut ReplaceOperation>,
    element_dirty: &dyn Fn(&AttributeValue) -> bool,
) -> bool {
    let into_removes = |remove: Option<RemoveOperation>| match remove {
        Some(remove) => vec![remove],
        None => Vec::new(),
    };

    if translations.is_empty() {
        translations.push(IndexTranslation {
            start,
            end,
            offset,
            removes: into_removes(remove),
        });
        return true;
    }

    for i in 0..translations.len() {
        let (existing_start, existing_end, existing_offset, existing_removes_len) = {
            let existing = &translations[i];
            (
                existing.start,
                existing.end,
                existing.offset,
                existing.removes.len(),
            )
        };
        if existing_start <= start && existing_end >= end {
            let index_diff = (existing_start - start).abs();
            let collapses = index_diff == 0
                && existing_offset + offset == 0
                && existing_removes_len == 1;
            if collapses {
                if let Some(replace) = replace.as_mut() {
                    // The remove and the insert at the same position cancel;
                    // the interval disappears and the insert becomes a
                    // replace of the removed element.
                    let removed_translation = translations.remove(i);
                    let old_value = removed_translation
                        .removes
                        .into_iter()
                        .next()
                        .map(|remove| remove.removed);
                    let survives = match &old_value {
                        Some(old) => {
                            !old.identity_eq(&replace.new_value)
                                || element_dirty(&replace.new_value)
                        }
                        None => true,
                    };
                    replace.old_value = old_value;
                    return survives;
                }
            }
            if index_diff == 1 && existing_end == end {
                // Neighbouring intervals with the same end are merged.
                let mut removes = translations[i].removes.clone();
                if let Some(remove) = remove {
                    removes.push(remove);
                }
                translations[i] = IndexTranslation {
                    start: existing_start.min(start),
                    end,
                    offset: existing_offset + offset,
                    removes,
                };
            } else {
                // Split the containing interval at the new start.
                translations[i].end = start;
                translations.insert(
                    i + 1,
                    IndexTranslation {
                        start,
                        end,
                        offset,
                        removes: into_removes(remove),
                    },
                );
            }
            return true;
        }
    }

    translations.push(IndexTranslation {
        start,
        end,
        offset,
        removes: into_removes(remove),
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltaview_model::{RecordingList, ScalarValue};

    fn text(s: &str) -> AttributeValue {
        AttributeValue::Scalar(ScalarValue::Text(s.into()))
    }

    fn never_dirty(_: &AttributeValue) -> bool {
        false
    }

    fn loaded(names: &[&str]) -> RecordingList {
        RecordingList::from_elements(names.iter().map(|n| text(n)).collect())
    }

    fn fuse(list: &RecordingList) -> FusedCollectionIndexActions {
        FusedCollectionIndexActions::new(list.actions(), &never_dirty)
    }

    fn replay_reference(original: &[&str], fused: &FusedCollectionIndexActions) -> Vec<AttributeValue> {
        let mut elements: Vec<AttributeValue> = original.iter().map(|n| text(n)).collect();
        fused.apply_to(&mut elements);
        elements
    }

    #[test]
    fn remove_then_insert_collapses_to_single_replace() {
        let mut list = loaded(&["a", "b", "c"]);
        list.remove(1).unwrap();
        list.insert(1, text("d")).unwrap();

        let fused = fuse(&list);
        assert!(fused.remove_ranges().is_empty());
        assert!(fused.translations().is_empty());
        assert_eq!(fused.replaces().len(), 1);
        let replace = &fused.replaces()[0];
        assert_eq!(replace.index, 1);
        assert_eq!(replace.new_value(), &text("d"));
        assert_eq!(replace.old_value(), Some(&text("b")));

        assert_eq!(
            replay_reference(&["a", "b", "c"], &fused),
            vec![text("a"), text("d"), text("c")]
        );
    }

    #[test]
    fn readding_removed_identity_cancels_everything() {
        let mut list = loaded(&["a", "b", "x"]);
        list.remove(2).unwrap();
        list.push(text("x"));

        let fused = fuse(&list);
        assert!(fused.is_empty());
        assert_eq!(
            replay_reference(&["a", "b", "x"], &fused),
            vec![text("a"), text("b"), text("x")]
        );
    }

    #[test]
    fn readding_different_identity_survives() {
        let mut list = loaded(&["a", "b", "x"]);
        list.remove(2).unwrap();
        list.push(text("y"));

        let fused = fuse(&list);
        assert!(!fused.is_empty());
        assert_eq!(
            replay_reference(&["a", "b", "x"], &fused),
            vec![text("a"), text("b"), text("y")]
        );
    }

    #[test]
    fn repeated_removes_merge_into_one_range() {
        let mut list = loaded(&["a", "b", "c", "d"]);
        list.remove(1).unwrap();
        list.remove(1).unwrap();

        let fused = fuse(&list);
        assert_eq!(fused.remove_ranges().len(), 1);
        let range = &fused.remove_ranges()[0];
        assert_eq!((range.start, range.end), (1, 3));
        assert_eq!(range.removed(), &[text("b"), text("c")]);
        assert_eq!(
            replay_reference(&["a", "b", "c", "d"], &fused),
            vec![text("a"), text("d")]
        );
    }

    #[test]
    fn scattered_removes_produce_translations() {
        let mut list = loaded(&["a", "b", "c", "d", "e"]);
        list.remove(0).unwrap();
        list.remove(2).unwrap(); // removes "d"

        let fused = fuse(&list);
        assert_eq!(fused.remove_ranges().len(), 2);
        assert!(!fused.translations().is_empty());
        assert_eq!(
            replay_reference(&["a", "b", "c", "d", "e"], &fused),
            vec![text("b"), text("c"), text("e")]
        );
    }

    #[test]
    fn pure_appends_use_the_append_list() {
        let mut list = loaded(&["a"]);
        list.push(text("b"));
        list.push(text("c"));

        let fused = fuse(&list);
        assert!(fused.remove_ranges().is_empty());
        assert!(fused.translations().is_empty());
        assert_eq!(fused.appended(), &[text("b"), text("c")]);
        assert_eq!(fused.append_index(), Some(1));
        assert_eq!(
            replay_reference(&["a"], &fused),
            vec![text("a"), text("b"), text("c")]
        );
    }

    #[test]
    fn append_then_remove_of_the_append_is_a_no_op() {
        let mut list = loaded(&["a"]);
        list.push(text("b"));
        list.remove(1).unwrap();

        let fused = fuse(&list);
        assert!(fused.is_empty(), "ops: {fused:?}");
        assert_eq!(replay_reference(&["a"], &fused), vec![text("a")]);
    }

    #[test]
    fn append_then_remove_of_a_later_append() {
        let mut list = loaded(&["a"]);
        list.push(text("b"));
        list.push(text("c"));
        list.remove(2).unwrap();

        let fused = fuse(&list);
        assert_eq!(fused.appended(), &[text("b")]);
        assert_eq!(
            replay_reference(&["a"], &fused),
            vec![text("a"), text("b")]
        );
    }

    #[test]
    fn set_produces_one_replace() {
        let mut list = loaded(&["a", "b"]);
        list.set(0, text("z")).unwrap();

        let fused = fuse(&list);
        assert_eq!(fused.replaces().len(), 1);
        assert_eq!(fused.update_count(), 1);
        assert!(fused.remove_ranges().is_empty());
        assert_eq!(
            replay_reference(&["a", "b"], &fused),
            vec![text("z"), text("b")]
        );
    }

    #[test]
    fn set_to_same_identity_is_a_no_op() {
        let mut list = loaded(&["a", "b"]);
        list.set(0, text("a")).unwrap();

        let fused = fuse(&list);
        assert!(fused.is_empty());
    }

    #[test]
    fn set_to_same_identity_but_dirty_element_survives() {
        let mut list = loaded(&["a", "b"]);
        list.set(0, text("a")).unwrap();

        let always_dirty = |_: &AttributeValue| true;
        let fused = FusedCollectionIndexActions::new(list.actions(), &always_dirty);
        assert_eq!(fused.replaces().len(), 1);
    }

    #[test]
    fn clear_removes_the_whole_range() {
        let mut list = loaded(&["a", "b", "c"]);
        list.clear();

        let fused = fuse(&list);
        assert_eq!(fused.remove_ranges().len(), 1);
        let range = &fused.remove_ranges()[0];
        assert_eq!((range.start, range.end), (0, 3));
        assert!(replay_reference(&["a", "b", "c"], &fused).is_empty());
    }

    #[test]
    fn remove_then_append_combination() {
        let mut list = loaded(&["a", "b", "c"]);
        list.remove(2).unwrap();
        list.push(text("d"));
        list.push(text("e"));

        let fused = fuse(&list);
        assert_eq!(
            replay_reference(&["a", "b", "c"], &fused),
            vec![text("a"), text("b"), text("d"), text("e")]
        );
    }

    #[test]
    fn counts_are_consistent() {
        let mut list = loaded(&["a", "b", "c"]);
        list.remove(0).unwrap();
        list.push(text("d"));
        let fused = fuse(&list);
        assert_eq!(
            fused.operation_count(),
            fused.remove_count() + fused.add_count() + fused.update_count()
        );
    }
}
