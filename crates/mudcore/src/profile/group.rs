//! 群組：依插入順序保存各種子項目，並快取攤平排序後的結果

use super::item::{ItemId, ItemKind};

/// 單一種類的子項目清單與其排序快取
#[derive(Debug, Clone)]
pub(crate) struct ChildList {
    /// 本群組直接擁有的項目（插入順序）
    pub(crate) items: Vec<ItemId>,
    /// 含所有子群組、依優先序排序後的結果
    pub(crate) sorted: Vec<ItemId>,
    pub(crate) dirty: bool,
}

impl Default for ChildList {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            sorted: Vec::new(),
            dirty: true,
        }
    }
}

/// 群組節點
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub(crate) groups: Vec<ItemId>,
    pub(crate) aliases: ChildList,
    pub(crate) triggers: ChildList,
    pub(crate) timers: ChildList,
    pub(crate) variables: ChildList,
    pub(crate) accelerators: ChildList,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接子群組（插入順序）
    pub fn groups(&self) -> &[ItemId] {
        &self.groups
    }

    /// 某種類的直接子項目（插入順序）
    pub fn children(&self, kind: ItemKind) -> &[ItemId] {
        match self.list(kind) {
            Some(list) => &list.items,
            None => &self.groups,
        }
    }

    /// 所有直接子項目：先子群組，再依種類
    pub fn all_children(&self) -> Vec<ItemId> {
        let mut out = self.groups.clone();
        for kind in SORTABLE_KINDS {
            out.extend_from_slice(self.children(kind));
        }
        out
    }

    /// 該種類的排序快取是否需要重建
    pub fn is_dirty(&self, kind: ItemKind) -> bool {
        self.list(kind).map(|l| l.dirty).unwrap_or(false)
    }

    pub(crate) fn list(&self, kind: ItemKind) -> Option<&ChildList> {
        match kind {
            ItemKind::Group => None,
            ItemKind::Alias => Some(&self.aliases),
            ItemKind::Trigger => Some(&self.triggers),
            ItemKind::Timer => Some(&self.timers),
            ItemKind::Variable => Some(&self.variables),
            ItemKind::Accelerator => Some(&self.accelerators),
        }
    }

    pub(crate) fn list_mut(&mut self, kind: ItemKind) -> Option<&mut ChildList> {
        match kind {
            ItemKind::Group => None,
            ItemKind::Alias => Some(&mut self.aliases),
            ItemKind::Trigger => Some(&mut self.triggers),
            ItemKind::Timer => Some(&mut self.timers),
            ItemKind::Variable => Some(&mut self.variables),
            ItemKind::Accelerator => Some(&mut self.accelerators),
        }
    }

    pub(crate) fn push_child(&mut self, kind: ItemKind, id: ItemId) {
        match self.list_mut(kind) {
            Some(list) => list.items.push(id),
            None => self.groups.push(id),
        }
    }

    pub(crate) fn remove_child(&mut self, kind: ItemKind, id: ItemId) {
        match self.list_mut(kind) {
            Some(list) => list.items.retain(|c| *c != id),
            None => self.groups.retain(|c| *c != id),
        }
    }

    pub(crate) fn mark_dirty(&mut self, kind: ItemKind) {
        if let Some(list) = self.list_mut(kind) {
            list.dirty = true;
        }
    }

    pub(crate) fn mark_all_dirty(&mut self) {
        for kind in SORTABLE_KINDS {
            self.mark_dirty(kind);
        }
    }
}

/// 有排序清單的種類
pub const SORTABLE_KINDS: [ItemKind; 5] = [
    ItemKind::Alias,
    ItemKind::Trigger,
    ItemKind::Timer,
    ItemKind::Variable,
    ItemKind::Accelerator,
];
