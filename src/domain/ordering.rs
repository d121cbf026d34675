//! Positional ordering of small collections.
//!
//! The functions here are pure: they take a slice and return a new vector,
//! never mutating the input. They never fail; malformed targets (unknown or
//! duplicated ids) degrade to the closest sensible result.
//!
//! # Reorder semantics
//!
//! Given the current items and a target id sequence:
//!
//! - each item named in the target gets `position == index in the target`
//! - unknown ids are ignored, and only the first occurrence of a repeated id
//!   counts (later occurrences leave a gap that is closed below)
//! - items not named in the target are kept, appended after the named ones in
//!   their previous relative order
//!
//! The result is always renumbered `0..n`, so positions are contiguous and
//! unique after every reorder.

use std::collections::HashMap;
use std::hash::Hash;

/// An item with a stable key and a zero-based position.
pub trait Positioned: Clone {
    /// Identity of the item within its collection.
    type Key: Eq + Hash;

    /// Returns the item's key.
    fn key(&self) -> &Self::Key;

    /// Returns the item's current position.
    fn position(&self) -> u32;

    /// Returns the item moved to `position`.
    #[must_use]
    fn with_position(self, position: u32) -> Self;
}

fn to_position(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

/// Reorders `items` to follow `target`.
///
/// See the module documentation for how unknown, duplicate and missing ids
/// are treated.
pub fn reorder<T: Positioned>(items: &[T], target: &[T::Key]) -> Vec<T> {
    let mut index_of: HashMap<&T::Key, usize> = HashMap::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        index_of.entry(item.key()).or_insert(index);
    }

    let mut taken = vec![false; items.len()];
    let mut arranged: Vec<&T> = Vec::with_capacity(items.len());

    for key in target {
        if let Some(&index) = index_of.get(key)
            && !taken[index]
        {
            taken[index] = true;
            arranged.push(&items[index]);
        }
    }

    let mut rest: Vec<(usize, &T)> = items
        .iter()
        .enumerate()
        .filter(|(index, _)| !taken[*index])
        .collect();
    rest.sort_by_key(|(index, item)| (item.position(), *index));
    arranged.extend(rest.into_iter().map(|(_, item)| item));

    arranged
        .into_iter()
        .enumerate()
        .map(|(index, item)| item.clone().with_position(to_position(index)))
        .collect()
}

/// Position for an item appended to `items`: `0` when empty, otherwise one past
/// the current maximum.
pub fn next_order<T: Positioned>(items: &[T]) -> u32 {
    items
        .iter()
        .map(Positioned::position)
        .max()
        .map_or(0, |max| max.saturating_add(1))
}

/// Sorts `items` by position. Items sharing a position keep their relative
/// order.
pub fn sort_by_order<T: Positioned>(items: &mut [T]) {
    items.sort_by_key(Positioned::position);
}

/// Returns a copy of `items` sorted by position.
#[must_use]
pub fn sorted_by_order<T: Positioned>(items: &[T]) -> Vec<T> {
    let mut sorted = items.to_vec();
    sort_by_order(&mut sorted);
    sorted
}

/// Returns the keys of `items` in position order.
pub fn keys_in_order<T: Positioned>(items: &[T]) -> Vec<T::Key>
where
    T::Key: Clone,
{
    sorted_by_order(items)
        .iter()
        .map(|item| item.key().clone())
        .collect()
}

/// Returns `true` when the positions are exactly `0..items.len()`.
pub fn is_contiguous<T: Positioned>(items: &[T]) -> bool {
    let mut positions: Vec<u32> = items.iter().map(Positioned::position).collect();
    positions.sort_unstable();
    positions
        .iter()
        .enumerate()
        .all(|(index, position)| *position == to_position(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subtask::{Subtask, SubtaskId};
    use crate::domain::task::TaskId;
    use rstest::{fixture, rstest};

    fn subtask(id: &str, order: u32) -> Subtask {
        Subtask::new(SubtaskId::new(id), TaskId::new("1"), id.to_uppercase(), order)
    }

    fn ids(keys: &[&str]) -> Vec<SubtaskId> {
        keys.iter().map(|key| SubtaskId::new(*key)).collect()
    }

    fn order_of(items: &[Subtask], id: &str) -> u32 {
        items
            .iter()
            .find(|item| item.id.as_str() == id)
            .map(|item| item.order)
            .unwrap()
    }

    #[fixture]
    fn abc() -> Vec<Subtask> {
        vec![subtask("a", 0), subtask("b", 1), subtask("c", 2)]
    }

    #[rstest]
    fn test_reorder_assigns_target_indices(abc: Vec<Subtask>) {
        let result = reorder(&abc, &ids(&["c", "a", "b"]));
        assert_eq!(order_of(&result, "c"), 0);
        assert_eq!(order_of(&result, "a"), 1);
        assert_eq!(order_of(&result, "b"), 2);
        assert_eq!(keys_in_order(&result), ids(&["c", "a", "b"]));
    }

    #[rstest]
    fn test_reorder_with_current_sequence_is_identity(abc: Vec<Subtask>) {
        let result = reorder(&abc, &keys_in_order(&abc));
        assert_eq!(result, abc);
    }

    #[rstest]
    fn test_reorder_ignores_unknown_ids(abc: Vec<Subtask>) {
        let result = reorder(&abc, &ids(&["zzz", "b", "a", "c"]));
        assert_eq!(keys_in_order(&result), ids(&["b", "a", "c"]));
        assert!(is_contiguous(&result));
    }

    #[rstest]
    fn test_reorder_first_duplicate_wins(abc: Vec<Subtask>) {
        let result = reorder(&abc, &ids(&["b", "c", "b", "a"]));
        assert_eq!(keys_in_order(&result), ids(&["b", "c", "a"]));
        assert!(is_contiguous(&result));
    }

    #[rstest]
    fn test_reorder_appends_missing_items_in_previous_order() {
        let items = vec![
            subtask("a", 0),
            subtask("b", 1),
            subtask("c", 2),
            subtask("d", 3),
        ];
        let result = reorder(&items, &ids(&["c"]));
        assert_eq!(keys_in_order(&result), ids(&["c", "a", "b", "d"]));
        assert_eq!(result.len(), items.len());
    }

    #[rstest]
    fn test_reorder_missing_items_follow_position_not_slice_order() {
        let items = vec![subtask("late", 5), subtask("early", 1), subtask("x", 0)];
        let result = reorder(&items, &ids(&["x"]));
        assert_eq!(keys_in_order(&result), ids(&["x", "early", "late"]));
    }

    #[rstest]
    fn test_reorder_of_empty_collection() {
        let result = reorder::<Subtask>(&[], &ids(&["a"]));
        assert!(result.is_empty());
    }

    #[rstest]
    fn test_reorder_does_not_touch_other_fields(abc: Vec<Subtask>) {
        let with_done: Vec<Subtask> = abc
            .into_iter()
            .map(|item| {
                let done = item.id.as_str() == "b";
                item.with_done(done)
            })
            .collect();
        let result = reorder(&with_done, &ids(&["b", "a", "c"]));
        assert!(result[0].done);
        assert_eq!(result[0].title, "B");
    }

    #[rstest]
    #[case(vec![], 0)]
    #[case(vec![0], 1)]
    #[case(vec![0, 1, 2], 3)]
    #[case(vec![4, 1], 5)]
    #[case(vec![2, 2], 3)]
    fn test_next_order(#[case] orders: Vec<u32>, #[case] expected: u32) {
        let items: Vec<Subtask> = orders
            .iter()
            .enumerate()
            .map(|(index, order)| subtask(&format!("s{index}"), *order))
            .collect();
        assert_eq!(next_order(&items), expected);
    }

    #[rstest]
    fn test_sort_by_order_is_stable() {
        let mut items = vec![subtask("b", 1), subtask("x", 0), subtask("y", 0)];
        sort_by_order(&mut items);
        let keys: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(keys, vec!["x", "y", "b"]);
    }

    #[rstest]
    fn test_is_contiguous() {
        assert!(is_contiguous(&[subtask("a", 1), subtask("b", 0)]));
        assert!(!is_contiguous(&[subtask("a", 0), subtask("b", 2)]));
        assert!(!is_contiguous(&[subtask("a", 0), subtask("b", 0)]));
    }
}
