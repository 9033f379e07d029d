//! Profile 樹模組
//!
//! Profile 擁有一棵以群組為節點的樹，樹中保存別名、觸發器、計時器、變數與快捷鍵：
//! - 啟用狀態沿父群組向上計算，停用群組不會改動子項目自身的旗標
//! - 各群組為每種項目快取「攤平 + 依優先序排序」的清單，結構變動時標記為過期，讀取時才重建
//!
//! 項目存放在以 [`ItemId`] 為鍵的表中，父子關係以 id 表示。

mod group;
mod item;
mod matchable;

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

pub use group::{Group, SORTABLE_KINDS};
pub use item::{
    clamp_priority, Accelerator, ItemData, ItemId, ItemKind, ProfileItem, Timer, Variable,
    VariableValue, DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY,
};
pub use matchable::{MatchResult, Matchable, PatternError};

use crate::alias::Alias;
use crate::trigger::Trigger;

/// Profile 操作錯誤
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("找不到項目: {0:?}")]
    NotFound(ItemId),

    #[error("項目 {0:?} 不是群組")]
    NotAGroup(ItemId),

    #[error("不能刪除根群組")]
    CannotRemoveRoot,
}

/// 一組完整的使用者設定
#[derive(Debug, Clone)]
pub struct Profile {
    name: String,
    items: HashMap<ItemId, ProfileItem>,
    root: ItemId,
    active_group: ItemId,
    next_id: u64,
}

impl Profile {
    /// 建立只含根群組的 Profile
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let root = ItemId(1);
        let mut items = HashMap::new();
        items.insert(
            root,
            ProfileItem::new(root, name.clone(), None, ItemData::Group(Group::new())),
        );

        Self {
            name,
            items,
            root,
            active_group: root,
            next_id: 2,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> ItemId {
        self.root
    }

    /// 目前的作用群組（新項目的預設插入點，也是腳本執行時的上下文）
    pub fn active_group(&self) -> ItemId {
        self.active_group
    }

    pub fn set_active_group(&mut self, id: ItemId) -> Result<(), ProfileError> {
        self.group(id)?;
        self.active_group = id;
        Ok(())
    }

    /// 項目總數（含根群組）
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.len() <= 1
    }

    pub fn get(&self, id: ItemId) -> Option<&ProfileItem> {
        self.items.get(&id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn group(&self, id: ItemId) -> Result<&Group, ProfileError> {
        self.items
            .get(&id)
            .ok_or(ProfileError::NotFound(id))?
            .as_group()
            .ok_or(ProfileError::NotAGroup(id))
    }

    fn group_mut(&mut self, id: ItemId) -> Result<&mut Group, ProfileError> {
        match self.items.get_mut(&id) {
            Some(ProfileItem {
                data: ItemData::Group(group),
                ..
            }) => Ok(group),
            Some(_) => Err(ProfileError::NotAGroup(id)),
            None => Err(ProfileError::NotFound(id)),
        }
    }

    pub fn alias_mut(&mut self, id: ItemId) -> Option<&mut Alias> {
        match self.items.get_mut(&id).map(|i| &mut i.data) {
            Some(ItemData::Alias(alias)) => Some(alias),
            _ => None,
        }
    }

    pub fn trigger_mut(&mut self, id: ItemId) -> Option<&mut Trigger> {
        match self.items.get_mut(&id).map(|i| &mut i.data) {
            Some(ItemData::Trigger(trigger)) => Some(trigger),
            _ => None,
        }
    }

    pub fn timer_mut(&mut self, id: ItemId) -> Option<&mut Timer> {
        match self.items.get_mut(&id).map(|i| &mut i.data) {
            Some(ItemData::Timer(timer)) => Some(timer),
            _ => None,
        }
    }

    pub fn variable_mut(&mut self, id: ItemId) -> Option<&mut Variable> {
        match self.items.get_mut(&id).map(|i| &mut i.data) {
            Some(ItemData::Variable(variable)) => Some(variable),
            _ => None,
        }
    }

    pub fn accelerator_mut(&mut self, id: ItemId) -> Option<&mut Accelerator> {
        match self.items.get_mut(&id).map(|i| &mut i.data) {
            Some(ItemData::Accelerator(accelerator)) => Some(accelerator),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // 結構操作
    // ------------------------------------------------------------------

    /// 在 `parent` 群組下新增子項目
    pub fn add_child(
        &mut self,
        parent: ItemId,
        name: impl Into<String>,
        data: impl Into<ItemData>,
    ) -> Result<ItemId, ProfileError> {
        let data = data.into();
        let kind = data.kind();
        self.group(parent)?;

        let id = ItemId(self.next_id);
        self.next_id += 1;
        self.items
            .insert(id, ProfileItem::new(id, name.into(), Some(parent), data));

        self.group_mut(parent)?.push_child(kind, id);
        if kind == ItemKind::Group {
            self.invalidate_all(parent);
        } else {
            self.invalidate(parent, kind);
        }
        Ok(id)
    }

    /// 在作用群組下新增子項目
    pub fn add_to_active(
        &mut self,
        name: impl Into<String>,
        data: impl Into<ItemData>,
    ) -> Result<ItemId, ProfileError> {
        self.add_child(self.active_group, name, data)
    }

    /// 刪除項目；群組會連同所有子孫一起刪除
    pub fn remove(&mut self, id: ItemId) -> Result<ProfileItem, ProfileError> {
        if id == self.root {
            return Err(ProfileError::CannotRemoveRoot);
        }
        let item = self.items.get_mut(&id).ok_or(ProfileError::NotFound(id))?;
        // 先停用，進行中的啟用判斷會立即看到
        item.own_enabled = false;
        let kind = item.kind();
        let parent = item.parent;

        let descendants = self.descendants(id);
        for child in &descendants {
            if let Some(item) = self.items.get_mut(child) {
                item.parent = None;
            }
        }
        for child in &descendants {
            self.items.remove(child);
        }

        if let Some(parent) = parent {
            if let Ok(group) = self.group_mut(parent) {
                group.remove_child(kind, id);
            }
            if kind == ItemKind::Group {
                self.invalidate_all(parent);
            } else {
                self.invalidate(parent, kind);
            }
        }

        let mut removed = self.items.remove(&id).ok_or(ProfileError::NotFound(id))?;
        removed.parent = None;

        if !self.items.contains_key(&self.active_group) {
            self.active_group = parent
                .filter(|p| self.items.contains_key(p))
                .unwrap_or(self.root);
        }
        debug!("已刪除 {} '{}'", kind, removed.name);
        Ok(removed)
    }

    /// 所有子孫（不含自己），深度優先
    pub fn descendants(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = Vec::new();
        self.collect_descendants(id, &mut out);
        out
    }

    fn collect_descendants(&self, id: ItemId, out: &mut Vec<ItemId>) {
        if let Ok(group) = self.group(id) {
            for child in group.all_children() {
                out.push(child);
                self.collect_descendants(child, out);
            }
        }
    }

    /// 在群組的直接子項目中以名稱與種類尋找
    pub fn find_child(&self, group: ItemId, name: &str, kind: ItemKind) -> Option<ItemId> {
        self.group(group)
            .ok()?
            .children(kind)
            .iter()
            .copied()
            .find(|id| self.items.get(id).map(|i| i.name == name).unwrap_or(false))
    }

    /// 以 `/` 分隔的群組路徑尋找項目，例如 `combat/heal`
    pub fn find_path(&self, path: &str, kind: ItemKind) -> Option<ItemId> {
        let mut current = self.root;
        let mut parts = path.split('/').filter(|p| !p.is_empty()).peekable();
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                return self.find_child(current, part, kind);
            }
            current = self.find_child(current, part, ItemKind::Group)?;
        }
        None
    }

    // ------------------------------------------------------------------
    // 屬性
    // ------------------------------------------------------------------

    /// 只設定項目自身的旗標；子孫的旗標不會被改動
    pub fn set_enabled(&mut self, id: ItemId, enabled: bool) -> Result<(), ProfileError> {
        let item = self.items.get_mut(&id).ok_or(ProfileError::NotFound(id))?;
        item.own_enabled = enabled;
        Ok(())
    }

    /// 自身啟用且所有祖先群組皆啟用
    pub fn is_enabled(&self, id: ItemId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            match self.items.get(&cur) {
                Some(item) if item.own_enabled => current = item.parent,
                _ => return false,
            }
        }
        true
    }

    /// 設定優先序（限制在 1..=100000）；改變時排序快取失效
    pub fn set_priority(&mut self, id: ItemId, priority: i32) -> Result<(), ProfileError> {
        let item = self.items.get_mut(&id).ok_or(ProfileError::NotFound(id))?;
        let priority = clamp_priority(priority);
        if item.priority == priority {
            return Ok(());
        }
        item.priority = priority;
        let kind = item.kind();
        if let Some(parent) = item.parent {
            if kind == ItemKind::Group {
                self.invalidate_all(parent);
            } else {
                self.invalidate(parent, kind);
            }
        }
        Ok(())
    }

    pub fn rename(&mut self, id: ItemId, name: impl Into<String>) -> Result<(), ProfileError> {
        let item = self.items.get_mut(&id).ok_or(ProfileError::NotFound(id))?;
        item.name = name.into();
        Ok(())
    }

    /// 所屬群組的名稱路徑，例如 `profile/combat`
    pub fn path_of(&self, id: ItemId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            match self.items.get(&cur) {
                Some(item) => {
                    parts.push(item.name.as_str());
                    current = item.parent;
                }
                None => break,
            }
        }
        parts.reverse();
        parts.join("/")
    }

    // ------------------------------------------------------------------
    // 排序清單
    // ------------------------------------------------------------------

    /// 群組及其所有子群組中某種項目，依優先序排序（同優先序保持走訪順序）
    pub fn sorted_in(&mut self, group: ItemId, kind: ItemKind) -> Result<Vec<ItemId>, ProfileError> {
        let dirty = self.group(group)?.is_dirty(kind);
        if dirty {
            let mut flat = Vec::new();
            self.flatten(group, kind, &mut flat);
            flat.sort_by_key(|id| self.items.get(id).map(|i| i.priority).unwrap_or(MAX_PRIORITY));

            if let Some(list) = self.group_mut(group)?.list_mut(kind) {
                list.sorted = flat;
                list.dirty = false;
            }
        }

        Ok(self
            .group(group)?
            .list(kind)
            .map(|list| list.sorted.clone())
            .unwrap_or_default())
    }

    fn flatten(&self, group: ItemId, kind: ItemKind, out: &mut Vec<ItemId>) {
        if let Ok(g) = self.group(group) {
            out.extend_from_slice(g.children(kind));
            for child in g.groups() {
                self.flatten(*child, kind, out);
            }
        }
    }

    pub fn sorted_aliases(&mut self) -> Vec<ItemId> {
        self.sorted_in(self.root, ItemKind::Alias).unwrap_or_default()
    }

    pub fn sorted_triggers(&mut self) -> Vec<ItemId> {
        self.sorted_in(self.root, ItemKind::Trigger).unwrap_or_default()
    }

    pub fn sorted_timers(&mut self) -> Vec<ItemId> {
        self.sorted_in(self.root, ItemKind::Timer).unwrap_or_default()
    }

    pub fn sorted_variables(&mut self) -> Vec<ItemId> {
        self.sorted_in(self.root, ItemKind::Variable).unwrap_or_default()
    }

    pub fn sorted_accelerators(&mut self) -> Vec<ItemId> {
        self.sorted_in(self.root, ItemKind::Accelerator).unwrap_or_default()
    }

    /// 將群組及所有祖先的某種排序快取標記為過期
    fn invalidate(&mut self, group: ItemId, kind: ItemKind) {
        let mut current = Some(group);
        while let Some(id) = current {
            current = self.items.get(&id).and_then(|i| i.parent);
            if let Ok(g) = self.group_mut(id) {
                g.mark_dirty(kind);
            }
        }
    }

    fn invalidate_all(&mut self, group: ItemId) {
        let mut current = Some(group);
        while let Some(id) = current {
            current = self.items.get(&id).and_then(|i| i.parent);
            if let Ok(g) = self.group_mut(id) {
                g.mark_all_dirty();
            }
        }
    }

    // ------------------------------------------------------------------
    // 合併
    // ------------------------------------------------------------------

    /// 將另一個 Profile 中的 `from` 群組合併進 `into`
    ///
    /// 同名群組遞迴合併；同名同種類的項目就地取代；其餘複製後附加在最後。
    pub fn merge(&mut self, into: ItemId, other: &Profile, from: ItemId) -> Result<(), ProfileError> {
        self.group(into)?;
        let source = other.group(from)?;

        for child in source.all_children() {
            let Some(item) = other.get(child) else {
                continue;
            };
            let kind = item.kind();
            match self.find_child(into, &item.name, kind) {
                Some(existing) if kind == ItemKind::Group => {
                    self.merge(existing, other, child)?;
                }
                Some(existing) => self.replace_item(existing, item),
                None => {
                    self.import_subtree(into, other, child)?;
                }
            }
        }
        Ok(())
    }

    fn replace_item(&mut self, target: ItemId, source: &ProfileItem) {
        let Some(item) = self.items.get_mut(&target) else {
            return;
        };
        let priority_changed = item.priority != source.priority;
        item.own_enabled = source.own_enabled;
        item.priority = source.priority;
        item.data = source.data.clone();
        let kind = item.kind();
        let parent = item.parent;

        if priority_changed {
            if let Some(parent) = parent {
                self.invalidate(parent, kind);
            }
        }
    }

    fn import_subtree(&mut self, parent: ItemId, other: &Profile, source: ItemId) -> Result<ItemId, ProfileError> {
        let item = other.get(source).ok_or(ProfileError::NotFound(source))?;
        let data = match &item.data {
            ItemData::Group(_) => ItemData::Group(Group::new()),
            data => data.clone(),
        };
        let id = self.add_child(parent, item.name.clone(), data)?;
        if let Some(copy) = self.items.get_mut(&id) {
            copy.own_enabled = item.own_enabled;
        }
        self.set_priority(id, item.priority)?;

        if let Ok(group) = other.group(source) {
            for child in group.all_children() {
                self.import_subtree(id, other, child)?;
            }
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(profile: &Profile, ids: &[ItemId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| profile.get(*id).map(|i| i.name().to_string()))
            .collect()
    }

    #[test]
    fn test_sorted_aliases_by_priority() {
        let mut profile = Profile::new("test");
        let root = profile.root();
        for (name, priority) in [("A", 50), ("B", 10), ("C", 30)] {
            let id = profile.add_child(root, name, Alias::new(name, "")).unwrap();
            profile.set_priority(id, priority).unwrap();
        }

        let sorted = profile.sorted_aliases();
        assert_eq!(names(&profile, &sorted), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_sorted_includes_sub_groups_and_is_stable() {
        let mut profile = Profile::new("test");
        let root = profile.root();
        let combat = profile.add_child(root, "combat", Group::new()).unwrap();
        profile.add_child(root, "t1", Trigger::new("a", "")).unwrap();
        profile.add_child(combat, "t2", Trigger::new("b", "")).unwrap();
        let t3 = profile.add_child(root, "t3", Trigger::new("c", "")).unwrap();
        profile.set_priority(t3, 5).unwrap();

        // 同優先序依走訪順序：本群組項目在前，子群組在後
        let sorted = profile.sorted_triggers();
        assert_eq!(names(&profile, &sorted), vec!["t3", "t1", "t2"]);
    }

    #[test]
    fn test_sorted_cache_is_lazy() {
        let mut profile = Profile::new("test");
        let root = profile.root();
        let sub = profile.add_child(root, "sub", Group::new()).unwrap();
        profile.sorted_aliases();
        assert!(!profile.group(root).unwrap().is_dirty(ItemKind::Alias));

        // 子群組變動會讓祖先的快取過期
        profile.add_child(sub, "late", Alias::new("x", "")).unwrap();
        assert!(profile.group(root).unwrap().is_dirty(ItemKind::Alias));
        assert_eq!(names(&profile, &profile.clone().sorted_aliases()), vec!["late"]);

        let sorted = profile.sorted_aliases();
        assert_eq!(sorted.len(), 1);
        assert!(!profile.group(root).unwrap().is_dirty(ItemKind::Alias));
    }

    #[test]
    fn test_enable_cascades_without_mutation() {
        let mut profile = Profile::new("test");
        let root = profile.root();
        let group = profile.add_child(root, "g", Group::new()).unwrap();
        let inner = profile.add_child(group, "inner", Group::new()).unwrap();
        let on = profile.add_child(inner, "on", Alias::new("a", "")).unwrap();
        let off = profile.add_child(inner, "off", Alias::new("b", "")).unwrap();
        profile.set_enabled(off, false).unwrap();

        assert!(profile.is_enabled(on));
        assert!(!profile.is_enabled(off));

        profile.set_enabled(group, false).unwrap();
        assert!(!profile.is_enabled(on));
        assert!(!profile.is_enabled(off));
        assert!(profile.get(on).unwrap().own_enabled());

        profile.set_enabled(group, true).unwrap();
        assert!(profile.is_enabled(on));
        assert!(!profile.is_enabled(off));
    }

    #[test]
    fn test_priority_clamped() {
        let mut profile = Profile::new("test");
        let id = profile.add_to_active("a", Alias::new("a", "")).unwrap();
        assert_eq!(profile.get(id).unwrap().priority(), DEFAULT_PRIORITY);
        profile.set_priority(id, 0).unwrap();
        assert_eq!(profile.get(id).unwrap().priority(), MIN_PRIORITY);
        profile.set_priority(id, 1_000_000).unwrap();
        assert_eq!(profile.get(id).unwrap().priority(), MAX_PRIORITY);
    }

    #[test]
    fn test_remove_group_removes_descendants() {
        let mut profile = Profile::new("test");
        let root = profile.root();
        let group = profile.add_child(root, "g", Group::new()).unwrap();
        let alias = profile.add_child(group, "a", Alias::new("a", "")).unwrap();
        let sub = profile.add_child(group, "sub", Group::new()).unwrap();
        let trigger = profile.add_child(sub, "t", Trigger::new("t", "")).unwrap();
        profile.set_active_group(sub).unwrap();

        let removed = profile.remove(group).unwrap();
        assert!(!removed.own_enabled());
        assert_eq!(removed.parent(), None);
        assert!(!profile.contains(alias));
        assert!(!profile.contains(trigger));
        assert_eq!(profile.active_group(), root);
        assert!(profile.sorted_aliases().is_empty());
        assert!(profile.sorted_triggers().is_empty());
        assert!(profile.group(root).unwrap().groups().is_empty());
    }

    #[test]
    fn test_cannot_remove_root() {
        let mut profile = Profile::new("test");
        let root = profile.root();
        assert_eq!(profile.remove(root).unwrap_err(), ProfileError::CannotRemoveRoot);
    }

    #[test]
    fn test_add_to_non_group_fails() {
        let mut profile = Profile::new("test");
        let alias = profile.add_to_active("a", Alias::new("a", "")).unwrap();
        assert_eq!(
            profile.add_child(alias, "x", Alias::new("x", "")).unwrap_err(),
            ProfileError::NotAGroup(alias)
        );
    }

    #[test]
    fn test_find_path() {
        let mut profile = Profile::new("test");
        let root = profile.root();
        let combat = profile.add_child(root, "combat", Group::new()).unwrap();
        let heal = profile.add_child(combat, "heal", Alias::new("^h$", "")).unwrap();
        assert_eq!(profile.find_path("combat/heal", ItemKind::Alias), Some(heal));
        assert_eq!(profile.find_path("combat", ItemKind::Group), Some(combat));
        assert_eq!(profile.find_path("combat/heal", ItemKind::Trigger), None);
        assert_eq!(profile.path_of(heal), "test/combat/heal");
    }

    #[test]
    fn test_merge() {
        let mut base = Profile::new("base");
        let root = base.root();
        let combat = base.add_child(root, "combat", Group::new()).unwrap();
        let heal = base.add_child(combat, "heal", Alias::new("^h$", "old")).unwrap();
        base.add_child(root, "keep", Trigger::new("keep", "")).unwrap();

        let mut package = Profile::new("package");
        let proot = package.root();
        let pcombat = package.add_child(proot, "combat", Group::new()).unwrap();
        let pheal = package.add_child(pcombat, "heal", Alias::new("^heal$", "new")).unwrap();
        package.set_priority(pheal, 5).unwrap();
        package.add_child(pcombat, "flee", Alias::new("^f$", "")).unwrap();
        let misc = package.add_child(proot, "misc", Group::new()).unwrap();
        package.add_child(misc, "loot", Trigger::new("corpse", "")).unwrap();

        base.sorted_aliases();
        base.merge(root, &package, proot).unwrap();

        // 同名別名就地取代，保留原 id
        let replaced = base.get(heal).unwrap();
        assert_eq!(replaced.priority(), 5);
        assert_eq!(replaced.as_alias().unwrap().matcher.script, "new");
        assert_eq!(replaced.parent(), Some(combat));

        assert!(base.find_child(combat, "flee", ItemKind::Alias).is_some());
        let new_misc = base.find_child(root, "misc", ItemKind::Group).unwrap();
        assert!(base.find_child(new_misc, "loot", ItemKind::Trigger).is_some());
        assert_eq!(base.group(root).unwrap().groups().len(), 2);

        let sorted = base.sorted_aliases();
        assert_eq!(names(&base, &sorted), vec!["heal", "flee"]);
        assert_eq!(names(&base, &base.clone().sorted_triggers()), vec!["keep", "loot"]);
    }
}
