//! Sorted key index and merge join.
//!
//! Each side of a rule is turned into a list of `(key, record index)` entries
//! sorted by key, then index. Walking both lists in lockstep yields every key
//! present on both sides together with the record indices holding it. The
//! order of the walk only depends on the keys, never on hashing.

/// `(key, record index)` entries sorted by key, then index.
pub type SortedIndex<K> = Vec<(K, usize)>;

/// Build a sorted index over `indices`, reading keys through `keys_of`.
///
/// An index producing no key is left out; one producing several keys gets one
/// entry per key.
pub fn build_sorted_index<K, F>(indices: &[usize], mut keys_of: F) -> SortedIndex<K>
where
    K: Ord,
    F: FnMut(usize) -> Vec<K>,
{
    let mut entries: SortedIndex<K> = indices
        .iter()
        .flat_map(|&idx| keys_of(idx).into_iter().map(move |key| (key, idx)))
        .collect();
    entries.sort();
    entries
}

/// A key present on both sides with the record indices holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGroup<'a, K> {
    pub key: &'a K,
    pub left: Vec<usize>,
    pub right: Vec<usize>,
}

impl<K> KeyGroup<'_, K> {
    /// Number of pairs the group expands to.
    pub fn product(&self) -> usize {
        self.left.len().saturating_mul(self.right.len())
    }
}

/// Walk two sorted indexes and call `on_group` for every shared key, in key
/// order.
pub fn merge_join<'a, K, F>(left: &'a [(K, usize)], right: &'a [(K, usize)], mut on_group: F)
where
    K: Ord,
    F: FnMut(KeyGroup<'a, K>),
{
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        match left[i].0.cmp(&right[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                let key = &left[i].0;
                let left_end = run_end(left, i);
                let right_end = run_end(right, j);
                on_group(KeyGroup {
                    key,
                    left: left[i..left_end].iter().map(|(_, idx)| *idx).collect(),
                    right: right[j..right_end].iter().map(|(_, idx)| *idx).collect(),
                });
                i = left_end;
                j = right_end;
            }
        }
    }
}

fn run_end<K: Ord>(entries: &[(K, usize)], start: usize) -> usize {
    let key = &entries[start].0;
    start
        + entries[start..]
            .iter()
            .take_while(|(other, _)| other == key)
            .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys<'a>(
        map: &'a [(usize, &'a [&'static str])],
    ) -> impl FnMut(usize) -> Vec<&'static str> + 'a {
        move |idx| {
            map.iter()
                .find(|(i, _)| *i == idx)
                .map(|(_, ks)| ks.to_vec())
                .unwrap_or_default()
        }
    }

    #[test]
    fn build_sorts_and_expands_multi_keys() {
        let map: &[(usize, &[&str])] = &[(0, &["b"]), (1, &["a", "c"]), (2, &[])];
        let index = build_sorted_index(&[0, 1, 2], keys(map));
        assert_eq!(index, vec![("a", 1), ("b", 0), ("c", 1)]);
    }

    #[test]
    fn build_only_visits_given_indices() {
        let map: &[(usize, &[&str])] = &[(0, &["x"]), (1, &["x"])];
        let index = build_sorted_index(&[1], keys(map));
        assert_eq!(index, vec![("x", 1)]);
    }

    #[test]
    fn merge_join_emits_shared_groups_in_key_order() {
        let left = vec![("a", 0), ("b", 1), ("b", 2), ("d", 3)];
        let right = vec![("b", 5), ("c", 6), ("d", 7), ("d", 8)];
        let mut groups = Vec::new();
        merge_join(&left, &right, |group| {
            groups.push((*group.key, group.left.clone(), group.right.clone(), group.product()))
        });
        assert_eq!(
            groups,
            vec![
                ("b", vec![1, 2], vec![5], 2),
                ("d", vec![3], vec![7, 8], 2),
            ]
        );
    }

    #[test]
    fn merge_join_on_empty_side_emits_nothing() {
        let left: Vec<(&str, usize)> = vec![("a", 0)];
        let mut calls = 0;
        merge_join(&left, &[], |_| calls += 1);
        assert_eq!(calls, 0);
    }
}
