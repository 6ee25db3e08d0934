use serde::{Deserialize, Serialize};

/// Discriminates what a [`crate::filesystem::Node`] represents. Stored alongside every child
/// entry in a folder's payload so a listing doesn't need to open each child to know its kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Folder,
    Link,
}

impl NodeKind {
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File)
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, NodeKind::Folder)
    }

    pub fn is_link(&self) -> bool {
        matches!(self, NodeKind::Link)
    }
}
