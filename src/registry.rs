//! Deduplication of scans found by independent discovery passes.
//!
//! The same tomogram is often reachable from several search roots. Handles are
//! keyed by their label (file name without extension); a second handle with a
//! known label is merged into the first instead of being stored twice.

use std::collections::HashMap;

use tracing::debug;

use crate::scan::ScanHandle;

#[derive(Debug, Clone)]
struct Entry {
    handle: ScanHandle,
    is_private: bool,
}

#[derive(Debug, Default, Clone)]
pub struct DatasetRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle, merging it into an existing entry with the same label.
    ///
    /// On merge the annotations are concatenated (existing first), the shorter
    /// path is kept (ties go to the lexicographically smaller one) along with
    /// that handle's load state, and the entry stays private only if both
    /// contributions were private.
    pub fn add(&mut self, handle: ScanHandle, is_private: bool) {
        let label = handle.label();
        let Some(&position) = self.index.get(&label) else {
            self.index.insert(label, self.entries.len());
            self.entries.push(Entry { handle, is_private });
            return;
        };

        let entry = &mut self.entries[position];
        debug!(
            label = %label,
            existing = %entry.handle.location().display(),
            incoming = %handle.location().display(),
            "Merging duplicate scan"
        );
        entry.handle = merge(std::mem::replace(&mut entry.handle, ScanHandle::new("")), handle);
        entry.is_private &= is_private;
    }

    pub fn extend(&mut self, handles: impl IntoIterator<Item = ScanHandle>, is_private: bool) {
        for handle in handles {
            self.add(handle, is_private);
        }
    }

    pub fn get(&self, label: &str) -> Option<&ScanHandle> {
        self.index.get(label).map(|&i| &self.entries[i].handle)
    }

    pub fn get_mut(&mut self, label: &str) -> Option<&mut ScanHandle> {
        let i = *self.index.get(label)?;
        Some(&mut self.entries[i].handle)
    }

    pub fn is_private(&self, label: &str) -> Option<bool> {
        self.index.get(label).map(|&i| self.entries[i].is_private)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels in insertion order.
    pub fn labels(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().map(|e| e.handle.label())
    }

    /// Handles with their privacy flag, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&ScanHandle, bool)> {
        self.entries.iter().map(|e| (&e.handle, e.is_private))
    }

    pub fn public_handles(&self) -> Vec<&ScanHandle> {
        self.filtered(false)
    }

    pub fn private_handles(&self) -> Vec<&ScanHandle> {
        self.filtered(true)
    }

    pub fn into_handles(self) -> Vec<ScanHandle> {
        self.entries.into_iter().map(|e| e.handle).collect()
    }

    fn filtered(&self, private: bool) -> Vec<&ScanHandle> {
        self.entries
            .iter()
            .filter(|e| e.is_private == private)
            .map(|e| &e.handle)
            .collect()
    }
}

/// Keep the handle at the shorter path and give it both annotation lists,
/// existing first.
fn merge(mut existing: ScanHandle, mut incoming: ScanHandle) -> ScanHandle {
    let mut annotations = existing.replace_annotations(Vec::new());
    annotations.extend(incoming.replace_annotations(Vec::new()));

    let existing_path = existing.location().as_os_str();
    let incoming_path = incoming.location().as_os_str();
    let mut survivor =
        if (existing_path.len(), existing_path) <= (incoming_path.len(), incoming_path) {
            existing
        } else {
            incoming
        };
    survivor.replace_annotations(annotations);
    survivor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::Annotation;

    fn handle(path: &str, annotation: &str) -> ScanHandle {
        ScanHandle::with_annotations(path, vec![Annotation::new(vec![[0.0, 0.0, 0.0]], annotation)])
    }

    #[test]
    fn test_add_distinct_labels() {
        let mut registry = DatasetRegistry::new();
        registry.add(handle("/a/x.rec", "1"), false);
        registry.add(handle("/a/y.rec", "2"), true);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.labels().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(registry.public_handles().len(), 1);
        assert_eq!(registry.private_handles().len(), 1);
    }

    #[test]
    fn test_merge_private_then_public() {
        let mut registry = DatasetRegistry::new();
        registry.add(handle("/private/drive/run/X.rec", "private"), true);
        registry.add(handle("/pub/X.mrc", "public"), false);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.is_private("X"), Some(false));
        let merged = registry.get("X").unwrap();
        assert_eq!(merged.location().to_str(), Some("/pub/X.mrc"));
        let names: Vec<_> = merged.annotations().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["private", "public"]);
        assert!(registry.private_handles().is_empty());
    }

    #[test]
    fn test_merge_stays_private_only_if_both_private() {
        let mut registry = DatasetRegistry::new();
        registry.add(handle("/a/X.rec", "1"), true);
        registry.add(handle("/b/X.rec", "2"), true);
        assert_eq!(registry.is_private("X"), Some(true));

        registry.add(handle("/c/X.rec", "3"), false);
        assert_eq!(registry.is_private("X"), Some(false));

        registry.add(handle("/d/X.rec", "4"), true);
        assert_eq!(registry.is_private("X"), Some(false));
        assert_eq!(registry.get("X").unwrap().annotations().len(), 4);
    }

    #[test]
    fn test_equal_length_tie_break_is_lexicographic() {
        let mut registry = DatasetRegistry::new();
        registry.add(handle("/b/X.rec", "1"), false);
        registry.add(handle("/a/X.rec", "2"), false);

        let merged = registry.get("X").unwrap();
        assert_eq!(merged.location().to_str(), Some("/a/X.rec"));
        // Annotation order follows insertion, not the surviving path.
        assert_eq!(merged.annotations()[0].name(), "1");
    }

    #[test]
    fn test_merged_annotations_are_not_shared() {
        let first = handle("/long/path/X.rec", "1");
        let second = handle("/X.rec", "2");
        let mut registry = DatasetRegistry::new();
        registry.add(first.clone(), false);
        registry.add(second, false);

        registry
            .get_mut("X")
            .unwrap()
            .add_annotation(Annotation::new(vec![], "later"));
        assert_eq!(first.annotations().len(), 1);
        assert_eq!(registry.get("X").unwrap().annotations().len(), 3);
    }
}
