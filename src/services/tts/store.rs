//! Коллекция файлов пакетной обработки.
//!
//! The collection is the only shared mutable state of the batch
//! orchestrator. Every write is a read-modify-write against the current
//! contents under the lock; callers never hold an item across an `.await`,
//! they get clones. The lock itself is never held across an `.await` either.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::{FileId, FileItem, FileStatus, StatusCounts};

#[derive(Debug, Clone, Default)]
pub struct FileCollection {
    items: Arc<Mutex<Vec<FileItem>>>,
}

impl FileCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, new_items: impl IntoIterator<Item = FileItem>) {
        self.items.lock().extend(new_items);
    }

    pub fn snapshot(&self) -> Vec<FileItem> {
        self.items.lock().clone()
    }

    pub fn get(&self, id: &FileId) -> Option<FileItem> {
        self.items.lock().iter().find(|item| &item.id == id).cloned()
    }

    pub fn status_of(&self, id: &FileId) -> Option<FileStatus> {
        self.items
            .lock()
            .iter()
            .find(|item| &item.id == id)
            .map(|item| item.status)
    }

    pub fn has_status(&self, id: &FileId, status: FileStatus) -> bool {
        self.status_of(id) == Some(status)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Apply `transform` to `id` only if it is still present and `accept`
    /// holds for its current value. Returns whether the transform ran.
    pub fn update_where<P, F>(&self, id: &FileId, accept: P, transform: F) -> bool
    where
        P: FnOnce(&FileItem) -> bool,
        F: FnOnce(&mut FileItem),
    {
        let mut items = self.items.lock();
        let Some(item) = items.iter_mut().find(|item| &item.id == id) else {
            return false;
        };
        if !accept(item) {
            return false;
        }
        transform(item);
        true
    }

    /// [`update_where`](Self::update_where) with a status check.
    pub fn update_if<F>(&self, id: &FileId, expected: &[FileStatus], transform: F) -> bool
    where
        F: FnOnce(&mut FileItem),
    {
        self.update_where(id, |item| expected.contains(&item.status), transform)
    }

    pub fn update_all<F>(&self, mut transform: F)
    where
        F: FnMut(&mut FileItem),
    {
        for item in self.items.lock().iter_mut() {
            transform(item);
        }
    }

    /// Move every item of `ids` that is currently `from` to `to` in one
    /// step. Returns clones of the moved items in collection order.
    pub fn transition_many(
        &self,
        ids: &HashSet<FileId>,
        from: FileStatus,
        to: FileStatus,
    ) -> Vec<FileItem> {
        let mut items = self.items.lock();
        items
            .iter_mut()
            .filter(|item| item.status == from && ids.contains(&item.id))
            .map(|item| {
                item.error = None;
                item.set_status(to);
                item.clone()
            })
            .collect()
    }

    pub fn remove(&self, id: &FileId) -> Option<FileItem> {
        let mut items = self.items.lock();
        let index = items.iter().position(|item| &item.id == id)?;
        Some(items.remove(index))
    }

    pub fn clear(&self) -> Vec<FileItem> {
        std::mem::take(&mut *self.items.lock())
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for item in self.items.lock().iter() {
            counts.record(item.status);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(name: &str) -> FileItem {
        let mut item = FileItem::loading(name);
        item.mark_ready("שלום".to_string());
        item
    }

    #[test]
    fn test_update_if_checks_presence_and_status() {
        let collection = FileCollection::new();
        let item = ready("a.txt");
        let id = item.id.clone();
        collection.insert([item]);

        assert!(!collection.update_if(&id, &[FileStatus::Processing], |f| f.mark_error("x")));
        assert_eq!(collection.status_of(&id), Some(FileStatus::Ready));

        assert!(collection.update_if(&id, &[FileStatus::Ready], |f| f.is_selected = true));
        assert!(collection.get(&id).unwrap().is_selected);

        collection.remove(&id);
        assert!(!collection.update_if(&id, &[FileStatus::Ready], |f| f.is_selected = false));
        assert!(collection.is_empty());
    }

    #[test]
    fn test_transition_many_only_moves_matching() {
        let collection = FileCollection::new();
        let a = ready("a.txt");
        let b = ready("b.txt");
        let mut c = FileItem::loading("c.txt");
        c.mark_error("bad");
        let ids: HashSet<FileId> = [a.id.clone(), c.id.clone()].into_iter().collect();
        let b_id = b.id.clone();
        collection.insert([a, b, c]);

        let moved = collection.transition_many(&ids, FileStatus::Ready, FileStatus::Processing);
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].name, "a.txt");

        let counts = collection.counts();
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.ready, 1);
        assert_eq!(counts.error, 1);
        assert_eq!(counts.total(), 3);
        assert_eq!(collection.status_of(&b_id), Some(FileStatus::Ready));
    }

    #[test]
    fn test_clear() {
        let collection = FileCollection::new();
        collection.insert([ready("a.txt"), ready("b.txt")]);
        assert_eq!(collection.clear().len(), 2);
        assert_eq!(collection.len(), 0);
    }
}
