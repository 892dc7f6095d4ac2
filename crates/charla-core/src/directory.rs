use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::info;

use charla_shared::error::ChatError;
use charla_shared::types::{now_millis, Group, User};

/// In-memory user and group records. Entries live for the process
/// lifetime; nothing is ever deleted.
pub struct Directory {
    users: DashMap<String, User>,
    groups: DashMap<String, Group>,
    next_group: AtomicU64,
}

impl Directory {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            groups: DashMap::new(),
            next_group: AtomicU64::new(1),
        }
    }

    /// Create-or-rename. Registering an existing id replaces the whole
    /// record, so a changed display name takes effect immediately.
    pub fn upsert_user(&self, id: &str, display_name: &str) {
        self.users.insert(
            id.to_string(),
            User {
                id: id.to_string(),
                display_name: display_name.to_string(),
            },
        );
    }

    pub fn user(&self, id: &str) -> Option<User> {
        self.users.get(id).map(|entry| entry.clone())
    }

    pub fn contains_user(&self, id: &str) -> bool {
        self.users.contains_key(id)
    }

    pub fn all_users(&self) -> Vec<User> {
        self.users.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Create a group owned by `owner_id`. The owner is folded into the
    /// member set whether or not the caller listed them. Listed members do
    /// not have to be registered yet.
    pub fn create_group(
        &self,
        owner_id: &str,
        name: &str,
        members: &[String],
    ) -> Result<Group, ChatError> {
        if !self.users.contains_key(owner_id) {
            return Err(ChatError::UserNotFound(owner_id.to_string()));
        }

        let id = format!("group_{}", self.next_group.fetch_add(1, Ordering::Relaxed));
        let mut member_set: HashSet<String> = members.iter().cloned().collect();
        member_set.insert(owner_id.to_string());

        let group = Group {
            id: id.clone(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            members: member_set,
            created_at: now_millis(),
        };
        self.groups.insert(id, group.clone());

        info!(
            group = %group.id,
            owner = %owner_id,
            members = group.members.len(),
            "Created group"
        );

        Ok(group)
    }

    /// Union the given ids into the member set. Already-present ids are
    /// harmless no-ops.
    pub fn add_members(&self, group_id: &str, members: &[String]) -> Result<(), ChatError> {
        let mut group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| ChatError::GroupNotFound(group_id.to_string()))?;

        for member in members {
            group.members.insert(member.clone());
        }
        Ok(())
    }

    pub fn group(&self, group_id: &str) -> Result<Group, ChatError> {
        self.groups
            .get(group_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| ChatError::GroupNotFound(group_id.to_string()))
    }

    pub fn group_members(&self, group_id: &str) -> Result<Vec<String>, ChatError> {
        Ok(self.group(group_id)?.members.into_iter().collect())
    }

    /// All groups `user_id` belongs to.
    pub fn groups_with_member(&self, user_id: &str) -> Vec<Group> {
        self.groups
            .iter()
            .filter(|entry| entry.value().contains(user_id))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_user_overwrites_display_name() {
        let dir = Directory::new();
        dir.upsert_user("alice", "Alice");
        dir.upsert_user("alice", "Alicia");

        let user = dir.user("alice").unwrap();
        assert_eq!(user.display_name, "Alicia");
        assert_eq!(dir.all_users().len(), 1);
    }

    #[test]
    fn test_group_ids_are_sequential() {
        let dir = Directory::new();
        dir.upsert_user("alice", "Alice");

        let g1 = dir.create_group("alice", "first", &[]).unwrap();
        let g2 = dir.create_group("alice", "second", &[]).unwrap();
        assert_eq!(g1.id, "group_1");
        assert_eq!(g2.id, "group_2");
    }

    #[test]
    fn test_create_group_folds_in_owner() {
        let dir = Directory::new();
        dir.upsert_user("alice", "Alice");

        let group = dir
            .create_group("alice", "team", &["bob".to_string(), "carol".to_string()])
            .unwrap();
        assert_eq!(group.members.len(), 3);
        assert!(group.contains("alice"));
        assert_eq!(group.owner_id, "alice");
    }

    #[test]
    fn test_create_group_requires_registered_owner() {
        let dir = Directory::new();
        let err = dir.create_group("ghost", "team", &[]).unwrap_err();
        assert!(matches!(err, ChatError::UserNotFound(id) if id == "ghost"));
    }

    #[test]
    fn test_add_members_is_a_union() {
        let dir = Directory::new();
        dir.upsert_user("alice", "Alice");
        let group = dir
            .create_group("alice", "team", &["bob".to_string()])
            .unwrap();

        dir.add_members(&group.id, &["bob".to_string(), "carol".to_string()])
            .unwrap();

        let mut members = dir.group_members(&group.id).unwrap();
        members.sort();
        assert_eq!(members, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_add_members_to_unknown_group_fails() {
        let dir = Directory::new();
        let err = dir.add_members("group_99", &["bob".to_string()]).unwrap_err();
        assert!(matches!(err, ChatError::GroupNotFound(_)));
    }
}
