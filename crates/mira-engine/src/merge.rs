//! Binary-search reconciliation over id-sorted collections.
//!
//! Every sorted-by-id collection in a workspace state tree (sessions,
//! messages, parts, permissions, questions) is maintained through these
//! helpers, so the sorted/no-duplicates invariant lives in one place.

/// Insert or replace `item` in a list kept sorted by `id_of`.
///
/// Replacement happens in place, leaving every other element untouched.
pub fn upsert_sorted<T>(list: &mut Vec<T>, item: T, id_of: impl Fn(&T) -> &str) {
    match list.binary_search_by(|probe| id_of(probe).cmp(id_of(&item))) {
        Ok(index) => list[index] = item,
        Err(index) => list.insert(index, item),
    }
}

/// Remove the element with `id` if present. Absence is not an error, which
/// keeps deletion idempotent under event replay.
pub fn remove_sorted<T>(list: &mut Vec<T>, id: &str, id_of: impl Fn(&T) -> &str) -> Option<T> {
    match list.binary_search_by(|probe| id_of(probe).cmp(id)) {
        Ok(index) => Some(list.remove(index)),
        Err(_) => None,
    }
}

pub fn find_sorted<'a, T>(list: &'a [T], id: &str, id_of: impl Fn(&T) -> &str) -> Option<&'a T> {
    list.binary_search_by(|probe| id_of(probe).cmp(id))
        .ok()
        .map(|index| &list[index])
}
