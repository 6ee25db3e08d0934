use serde::{Deserialize, Serialize};

/// A validated child name within a folder. Names are non-empty, contain no `/` or NUL, and are
/// compared by exact bytes (no case folding).
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(String);

impl NodeName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for NodeName {
    type Error = NodeNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

impl TryFrom<String> for NodeName {
    type Error = NodeNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(NodeNameError::Empty);
        }

        if value.contains('/') || value.contains('\0') {
            return Err(NodeNameError::IllegalCharacter);
        }

        Ok(Self(value))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NodeNameError {
    #[error("name can't be empty")]
    Empty,

    #[error("name can't contain '/' or a NUL byte")]
    IllegalCharacter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_path_separators() {
        assert_eq!(NodeName::try_from(""), Err(NodeNameError::Empty));
        assert_eq!(
            NodeName::try_from("a/b"),
            Err(NodeNameError::IllegalCharacter)
        );
        assert_eq!(
            NodeName::try_from("a\0b"),
            Err(NodeNameError::IllegalCharacter)
        );
    }

    #[test]
    fn accepts_plain_names() {
        assert!(NodeName::try_from("readme.txt").is_ok());
    }
}
