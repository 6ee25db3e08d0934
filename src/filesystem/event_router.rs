//! Component G: translates the store's `objId`-keyed event stream into path-shaped events for a
//! watched subtree, keeping an `objId ↔ path` map consistent across renames and cross-folder
//! moves.
//!
//! The store delivers events at the object level; consumers of `watch_folder`/`watch_tree` want
//! paths that already reflect the rename or move that produced them. A single [`EventRouter`] is
//! owned by exactly one `watch_tree` subscription (see [`crate::filesystem::Vfs::watch_tree`]) and
//! discarded when that subscription detaches.

use std::collections::HashMap;

use crate::codec::ObjectId;
use crate::store::{MoveLabel, NodeEvent, NodeEventKind};

/// A path-rooted event emitted to a `watch_tree`/`watch_folder` observer.
#[derive(Clone, Debug)]
pub struct PathEvent {
    pub path: String,
    pub kind: NodeEventKind,
}

#[derive(Clone, Debug)]
enum PendingMove {
    NewPath(String),
    ObjId(ObjectId),
}

/// Maps every node inside a watched subtree to its current path, and resolves in-flight
/// cross-folder moves by `moveLabel` so a paired `entry-removal`/`entry-addition` converges to a
/// single consistent mapping regardless of arrival order.
pub struct EventRouter {
    paths: HashMap<ObjectId, String>,
    by_path: HashMap<String, ObjectId>,
    pending_moves: HashMap<MoveLabel, PendingMove>,
}

impl EventRouter {
    /// Seeds the map with `(root_obj_id, ".")`. Callers are expected to then walk the subtree
    /// (depth-first, folders only recurse; files/links contribute themselves as leaves) and call
    /// [`EventRouter::insert`] for every descendant found under a snapshot lock, before handing
    /// this router any live events.
    pub fn new(root_obj_id: ObjectId) -> Self {
        let mut router = Self {
            paths: HashMap::new(),
            by_path: HashMap::new(),
            pending_moves: HashMap::new(),
        };
        router.insert(root_obj_id, ".".to_string());
        router
    }

    pub fn insert(&mut self, obj_id: ObjectId, path: String) {
        self.by_path.insert(path.clone(), obj_id.clone());
        self.paths.insert(obj_id, path);
    }

    pub fn path_of(&self, obj_id: &ObjectId) -> Option<&str> {
        self.paths.get(obj_id).map(|s| s.as_str())
    }

    fn find_obj_id_by_path(&self, path: &str) -> Option<ObjectId> {
        self.by_path.get(path).cloned()
    }

    fn child_path(parent_path: &str, name: &str) -> String {
        if parent_path == "." {
            name.to_string()
        } else {
            format!("{parent_path}/{name}")
        }
    }

    /// Feeds one low-level event through the correction algorithm, returning the path-shaped
    /// event to emit (if any event is visible to this subtree).
    pub fn route(&mut self, event: NodeEvent) -> Option<PathEvent> {
        if let Some(path) = self.paths.get(&event.obj_id).cloned() {
            return self.route_known(event, path);
        }

        if let Some(parent_id) = &event.parent_obj_id {
            if !matches!(event.kind, NodeEventKind::Removed) {
                if let Some(parent_path) = self.paths.get(parent_id).cloned() {
                    return self.route_under_known_parent(event, &parent_path);
                }
            }
        }

        None
    }

    fn route_known(&mut self, event: NodeEvent, path: String) -> Option<PathEvent> {
        match event.kind {
            NodeEventKind::Removed => {
                self.paths.remove(&event.obj_id);
                self.by_path.remove(&path);
                Some(PathEvent {
                    path,
                    kind: NodeEventKind::Removed,
                })
            }
            NodeEventKind::EntryRenaming {
                ref old_name,
                ref new_name,
            } => {
                let old_path = Self::child_path(&path, old_name);
                if let Some(child) = self.find_obj_id_by_path(&old_path) {
                    let new_path = Self::child_path(&path, new_name);
                    self.by_path.remove(&old_path);
                    self.insert(child, new_path.clone());
                    return Some(PathEvent {
                        path: new_path,
                        kind: event.kind,
                    });
                }
                Some(PathEvent {
                    path,
                    kind: event.kind,
                })
            }
            NodeEventKind::EntryRemoval {
                ref name,
                move_label,
            } => {
                let child_path = Self::child_path(&path, name);
                let child = self.find_obj_id_by_path(&child_path);

                if let Some(label) = move_label {
                    if let Some(PendingMove::NewPath(new_path)) = self.pending_moves.remove(&label)
                    {
                        if let Some(child_id) = child.clone() {
                            self.by_path.remove(&child_path);
                            self.insert(child_id, new_path);
                        }
                    } else if let Some(child_id) = child.clone() {
                        self.pending_moves
                            .insert(label, PendingMove::ObjId(child_id));
                    }
                }

                Some(PathEvent {
                    path: child_path,
                    kind: NodeEventKind::EntryRemoval { name: name.clone(), move_label },
                })
            }
            NodeEventKind::EntryAddition {
                ref name,
                move_label,
                ..
            } => {
                let new_path = Self::child_path(&path, name);

                if let Some(label) = move_label {
                    if let Some(PendingMove::ObjId(child_id)) = self.pending_moves.remove(&label) {
                        self.insert(child_id, new_path.clone());
                    } else {
                        self.pending_moves
                            .insert(label, PendingMove::NewPath(new_path.clone()));
                    }
                }

                Some(PathEvent {
                    path: new_path,
                    kind: event.kind,
                })
            }
            NodeEventKind::Changed { .. } => Some(PathEvent {
                path,
                kind: event.kind,
            }),
        }
    }

    fn route_under_known_parent(&mut self, event: NodeEvent, parent_path: &str) -> Option<PathEvent> {
        let name = match &event.kind {
            NodeEventKind::EntryAddition { name, .. } => name.clone(),
            NodeEventKind::EntryRemoval { name, .. } => name.clone(),
            _ => return None,
        };

        let new_path = Self::child_path(parent_path, &name);
        self.insert(event.obj_id.clone(), new_path.clone());

        Some(PathEvent {
            path: new_path,
            kind: event.kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::NodeKind;

    fn obj(id: u8) -> ObjectId {
        ObjectId::opaque(vec![id])
    }

    #[test]
    fn cross_folder_move_converges_regardless_of_arrival_order() {
        let root = obj(0);
        let x = obj(1);
        let y = obj(2);
        let f = obj(3);

        let mut router = EventRouter::new(root.clone());
        router.insert(x.clone(), "x".to_string());
        router.insert(y.clone(), "y".to_string());
        router.insert(f.clone(), "x/f".to_string());

        let label = MoveLabel::generate();

        let removal = NodeEvent {
            obj_id: x.clone(),
            parent_obj_id: Some(root.clone()),
            kind: NodeEventKind::EntryRemoval {
                name: "f".to_string(),
                move_label: Some(label),
            },
        };
        let addition = NodeEvent {
            obj_id: y.clone(),
            parent_obj_id: Some(root.clone()),
            kind: NodeEventKind::EntryAddition {
                name: "g".to_string(),
                child_kind: NodeKind::File,
                move_label: Some(label),
            },
        };

        let removal_event = router.route(removal).unwrap();
        let addition_event = router.route(addition).unwrap();

        assert_eq!(removal_event.path, "x/f");
        assert_eq!(addition_event.path, "y/g");
        assert_eq!(router.path_of(&f), Some("y/g"));
    }

    #[test]
    fn addition_before_removal_still_converges() {
        let root = obj(0);
        let x = obj(1);
        let y = obj(2);
        let f = obj(3);

        let mut router = EventRouter::new(root.clone());
        router.insert(x.clone(), "x".to_string());
        router.insert(y.clone(), "y".to_string());
        router.insert(f.clone(), "x/f".to_string());

        let label = MoveLabel::generate();

        let addition = NodeEvent {
            obj_id: y.clone(),
            parent_obj_id: Some(root.clone()),
            kind: NodeEventKind::EntryAddition {
                name: "g".to_string(),
                child_kind: NodeKind::File,
                move_label: Some(label),
            },
        };
        let removal = NodeEvent {
            obj_id: x.clone(),
            parent_obj_id: Some(root.clone()),
            kind: NodeEventKind::EntryRemoval {
                name: "f".to_string(),
                move_label: Some(label),
            },
        };

        router.route(addition).unwrap();
        router.route(removal).unwrap();

        assert_eq!(router.path_of(&f), Some("y/g"));
    }

    #[test]
    fn unknown_parent_event_is_dropped() {
        let root = obj(0);
        let mut router = EventRouter::new(root);

        let event = NodeEvent {
            obj_id: obj(99),
            parent_obj_id: Some(obj(98)),
            kind: NodeEventKind::EntryAddition {
                name: "ghost".to_string(),
                child_kind: NodeKind::File,
                move_label: None,
            },
        };

        assert!(router.route(event).is_none());
    }
}
