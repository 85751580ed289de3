//! Conflict detection and resolution against the local change manifest.

use crate::item::SyncItemKey;
use crate::types::ConflictPolicy;

/// Pending local changes of one target, discovered from the change log and
/// the backend delta. The three sets are pairwise disjoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalChanges {
    pub added: Vec<SyncItemKey>,
    pub modified: Vec<SyncItemKey>,
    pub removed: Vec<SyncItemKey>,
}

impl LocalChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// How the losing local change is reverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertPolicy {
    /// Drop the key from every change set.
    RemoveLocal,
    /// A local modification becomes an addition, so the item is re-sent
    /// whole instead of patched.
    ModifyToAdd,
}

/// Policy-based resolver over a target's local changes.
pub struct ConflictResolver<'a> {
    local_changes: &'a mut LocalChanges,
    policy: ConflictPolicy,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(local_changes: &'a mut LocalChanges, policy: ConflictPolicy) -> Self {
        ConflictResolver { local_changes, policy }
    }

    /// A key in `modified` always conflicts; a key in `removed` conflicts
    /// only when the inbound command is not itself a delete.
    pub fn is_conflict(&self, key: &SyncItemKey, is_delete: bool) -> bool {
        let removal_conflict = !is_delete && self.local_changes.removed.contains(key);
        let modification_conflict = self.local_changes.modified.contains(key);
        removal_conflict || modification_conflict
    }

    pub fn local_side_wins(&self) -> bool {
        self.policy == ConflictPolicy::PreferLocal
    }

    /// Mutate the local change manifest for the losing side.
    pub fn revert_local_change(&mut self, key: &SyncItemKey, revert: RevertPolicy) {
        match revert {
            RevertPolicy::RemoveLocal => {
                self.local_changes.added.retain(|k| k != key);
                self.local_changes.modified.retain(|k| k != key);
                self.local_changes.removed.retain(|k| k != key);
            }
            RevertPolicy::ModifyToAdd => {
                if let Some(index) = self.local_changes.modified.iter().position(|k| k == key) {
                    let key = self.local_changes.modified.remove(index);
                    self.local_changes.added.push(key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes() -> LocalChanges {
        LocalChanges {
            added: vec!["a1".into()],
            modified: vec!["m1".into(), "m2".into()],
            removed: vec!["r1".into()],
        }
    }

    #[test]
    fn modified_always_conflicts() {
        let mut local = changes();
        let resolver = ConflictResolver::new(&mut local, ConflictPolicy::PreferLocal);
        assert!(resolver.is_conflict(&"m1".into(), false));
        assert!(resolver.is_conflict(&"m1".into(), true));
    }

    #[test]
    fn removed_conflicts_only_for_non_delete() {
        let mut local = changes();
        let resolver = ConflictResolver::new(&mut local, ConflictPolicy::PreferLocal);
        assert!(resolver.is_conflict(&"r1".into(), false));
        assert!(!resolver.is_conflict(&"r1".into(), true));
    }

    #[test]
    fn untouched_key_is_no_conflict() {
        let mut local = changes();
        let resolver = ConflictResolver::new(&mut local, ConflictPolicy::PreferRemote);
        assert!(!resolver.is_conflict(&"other".into(), false));
    }

    #[test]
    fn policy_decides_winner() {
        let mut local = changes();
        assert!(ConflictResolver::new(&mut local, ConflictPolicy::PreferLocal).local_side_wins());
        assert!(!ConflictResolver::new(&mut local, ConflictPolicy::PreferRemote).local_side_wins());
    }

    #[test]
    fn remove_local_drops_key_everywhere() {
        let mut local = changes();
        let mut resolver = ConflictResolver::new(&mut local, ConflictPolicy::PreferRemote);
        resolver.revert_local_change(&"m1".into(), RevertPolicy::RemoveLocal);
        assert_eq!(local.modified, vec!["m2".to_string()]);
    }

    #[test]
    fn modify_to_add_moves_between_sets() {
        let mut local = changes();
        let mut resolver = ConflictResolver::new(&mut local, ConflictPolicy::PreferLocal);
        resolver.revert_local_change(&"m2".into(), RevertPolicy::ModifyToAdd);
        assert!(resolver.local_changes.added.contains(&"m2".to_string()));
        assert!(!resolver.local_changes.modified.contains(&"m2".to_string()));
        // A key not in modified is left alone.
        resolver.revert_local_change(&"r1".into(), RevertPolicy::ModifyToAdd);
        assert_eq!(local.removed, vec!["r1".to_string()]);
    }
}
