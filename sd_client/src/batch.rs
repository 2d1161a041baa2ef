//! Batch Move Operator and the pending selection it works from.

use crate::{api::DriveApi, error::ClientResult, lifecycle::FileUpdateOutcome};

/// Moves files and folders under `new_parent` in one all-or-nothing
/// submission. Nothing is submitted for empty input.
pub async fn move_items<A: DriveApi + ?Sized>(
    api: &A,
    file_ids: &[u32],
    folder_ids: &[u32],
    new_parent: u32,
) -> ClientResult<()> {
    if file_ids.is_empty() && folder_ids.is_empty() {
        return Ok(());
    }
    api.update_parent(file_ids, folder_ids, new_parent).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    File,
    Folder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionItem {
    pub kind: ItemKind,
    pub id: u32,
    /// Folder the item currently lives in.
    pub parent: u32,
    pub name: String,
}

/// Files and folders picked for a pending move, clipboard style.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    items: Vec<SelectionItem>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[SelectionItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    fn push(&mut self, kind: ItemKind, id: u32, parent: u32, name: impl Into<String>) {
        if !self.has(kind, id) {
            self.items.push(SelectionItem {
                kind,
                id,
                parent,
                name: name.into(),
            });
        }
    }

    fn has(&self, kind: ItemKind, id: u32) -> bool {
        self.items.iter().any(|i| i.kind == kind && i.id == id)
    }

    fn pop(&mut self, kind: ItemKind, id: u32) {
        self.items.retain(|i| i.kind != kind || i.id != id);
    }

    pub fn push_file(&mut self, id: u32, parent: u32, name: impl Into<String>) {
        self.push(ItemKind::File, id, parent, name);
    }

    pub fn push_folder(&mut self, id: u32, parent: u32, name: impl Into<String>) {
        self.push(ItemKind::Folder, id, parent, name);
    }

    pub fn pop_file(&mut self, id: u32) {
        self.pop(ItemKind::File, id);
    }

    pub fn pop_folder(&mut self, id: u32) {
        self.pop(ItemKind::Folder, id);
    }

    pub fn has_file(&self, id: u32) -> bool {
        self.has(ItemKind::File, id)
    }

    pub fn has_folder(&self, id: u32) -> bool {
        self.has(ItemKind::Folder, id)
    }

    /// Follows a file that was recreated under a new id.
    pub fn rename_file(&mut self, outcome: &FileUpdateOutcome) {
        if !outcome.recreated {
            return;
        }
        for item in &mut self.items {
            if item.kind == ItemKind::File && item.id == outcome.previous_id {
                item.id = outcome.id;
            }
        }
    }

    /// Drops items that already live under `parent`.
    pub fn exclude_under(&mut self, parent: u32) {
        self.items.retain(|i| i.parent != parent);
    }

    pub fn file_ids(&self) -> Vec<u32> {
        self.ids(ItemKind::File)
    }

    pub fn folder_ids(&self) -> Vec<u32> {
        self.ids(ItemKind::Folder)
    }

    fn ids(&self, kind: ItemKind) -> Vec<u32> {
        self.items
            .iter()
            .filter(|i| i.kind == kind)
            .map(|i| i.id)
            .collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Moves every selected item under `parent`, then clears the
    /// selection. A folder is never moved into itself.
    pub async fn move_to<A: DriveApi + ?Sized>(&mut self, api: &A, parent: u32) -> ClientResult<()> {
        self.exclude_under(parent);
        self.pop_folder(parent);
        move_items(api, &self.file_ids(), &self.folder_ids(), parent).await?;
        self.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_has() {
        let mut selection = Selection::new();
        selection.push_file(1, 0, "a.txt");
        selection.push_file(1, 0, "a.txt");
        selection.push_folder(1, 0, "docs");
        assert_eq!(selection.len(), 2);
        assert!(selection.has_file(1));
        assert!(selection.has_folder(1));

        selection.pop_file(1);
        assert!(!selection.has_file(1));
        assert!(selection.has_folder(1));
    }

    #[test]
    fn recreated_files_are_followed() {
        let mut selection = Selection::new();
        selection.push_file(1, 0, "a.txt");
        selection.rename_file(&FileUpdateOutcome {
            id: 7,
            previous_id: 1,
            recreated: true,
        });
        assert!(!selection.has_file(1));
        assert!(selection.has_file(7));
    }

    #[test]
    fn items_already_in_place_are_excluded() {
        let mut selection = Selection::new();
        selection.push_file(1, 2, "a.txt");
        selection.push_file(2, 0, "b.txt");
        selection.push_folder(3, 2, "docs");
        selection.exclude_under(2);
        assert_eq!(selection.file_ids(), vec![2]);
        assert!(selection.folder_ids().is_empty());
    }
}
