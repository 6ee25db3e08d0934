use serde::{Deserialize, Serialize};

/// Where a node's bytes live. Determines which other storage types it may link to: a node in
/// `Local` storage may link to anything, but `Synced` and `Share` nodes may only link within
/// `{Synced, Share}` — a shared subtree can never pull in something that only exists locally,
/// where the recipient couldn't reach it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Local,
    Synced,
    Share,
}

impl StorageType {
    /// Whether a node of `self`'s storage type may hold a link/child pointing at a node of
    /// `target`'s storage type.
    pub fn can_link_to(&self, target: StorageType) -> bool {
        match self {
            StorageType::Local => true,
            StorageType::Synced | StorageType::Share => {
                matches!(target, StorageType::Synced | StorageType::Share)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_links_anywhere() {
        assert!(StorageType::Local.can_link_to(StorageType::Local));
        assert!(StorageType::Local.can_link_to(StorageType::Synced));
        assert!(StorageType::Local.can_link_to(StorageType::Share));
    }

    #[test]
    fn synced_and_share_reject_local_targets() {
        assert!(!StorageType::Synced.can_link_to(StorageType::Local));
        assert!(!StorageType::Share.can_link_to(StorageType::Local));
        assert!(StorageType::Synced.can_link_to(StorageType::Share));
        assert!(StorageType::Share.can_link_to(StorageType::Synced));
    }
}
