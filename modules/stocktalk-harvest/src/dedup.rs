use std::collections::HashSet;

use stocktalk_common::RecordId;

/// Ids accepted so far in this run. Grows monotonically; nothing is evicted.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen: HashSet<RecordId>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` as seen. Returns false, leaving the index untouched, when
    /// it was already present.
    pub fn accept(&mut self, id: &RecordId) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.clone())
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_accept_of_same_id_is_rejected() {
        let mut index = DedupIndex::new();
        let id = RecordId::new("1790000000000000001");
        assert!(index.accept(&id));
        assert!(!index.accept(&id));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn distinct_ids_are_all_accepted() {
        let mut index = DedupIndex::new();
        for i in 0..50 {
            assert!(index.accept(&RecordId::new(i.to_string())));
        }
        assert_eq!(index.len(), 50);
        assert!(index.contains(&RecordId::new("49")));
        assert!(!index.contains(&RecordId::new("50")));
    }

    #[test]
    fn starts_empty() {
        assert!(DedupIndex::new().is_empty());
    }
}
