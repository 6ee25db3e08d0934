use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_std::channel::{unbounded, Receiver, Sender};
use async_std::sync::RwLock;
use async_trait::async_trait;

use crate::codec::{ObjectId, StorageType, Version};
use crate::crypto::Subscribe;

use super::{NodeEvent, ObjSource, Storage, StorageError};

struct StoredObject {
    version: Version,
    header: Vec<u8>,
    body: Vec<u8>,
}

/// In-memory reference [`Storage`] implementation, used by the test suite and by applications
/// that want a disposable filesystem (e.g. scratch space, unit tests of their own code against
/// this crate).
pub struct MemoryStorage {
    storage_type: StorageType,
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Sender<NodeEvent>>>,
}

impl MemoryStorage {
    pub fn new(storage_type: StorageType) -> Self {
        Self {
            storage_type,
            objects: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    async fn generate_new_obj_id(&self) -> Result<ObjectId, StorageError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(ObjectId::opaque(id.to_le_bytes().to_vec()))
    }

    async fn get_obj(&self, obj_id: &ObjectId) -> Result<ObjSource, StorageError> {
        let objects = self.objects.read().await;
        let stored = objects.get(obj_id).ok_or(StorageError::NotFound)?;
        Ok(ObjSource::new(
            stored.version,
            stored.header.clone(),
            stored.body.clone(),
        ))
    }

    async fn save_obj(
        &self,
        obj_id: &ObjectId,
        new_version: Version,
        header: Vec<u8>,
        subscribe: Subscribe,
    ) -> Result<(), StorageError> {
        let mut body = Vec::new();
        while let Some(chunk) = subscribe.next_chunk().await {
            body.extend_from_slice(&chunk);
        }

        let mut objects = self.objects.write().await;
        if let Some(existing) = objects.get(obj_id) {
            let expected = existing.version.next();
            if new_version != expected {
                return Err(StorageError::VersionConflict {
                    expected,
                    actual: existing.version,
                });
            }
        } else if new_version != Version::INITIAL {
            return Err(StorageError::VersionConflict {
                expected: Version::INITIAL,
                actual: Version::Unknown,
            });
        }

        objects.insert(
            obj_id.clone(),
            StoredObject {
                version: new_version,
                header,
                body,
            },
        );
        Ok(())
    }

    async fn remove_obj(&self, obj_id: &ObjectId) -> Result<(), StorageError> {
        self.objects.write().await.remove(obj_id);
        Ok(())
    }

    fn get_node_events(&self) -> Receiver<NodeEvent> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .expect("subscribers lock poisoned")
            .push(tx);
        rx
    }

    async fn publish_event(&self, event: NodeEvent) {
        let subscribers = self.subscribers.lock().expect("subscribers lock poisoned");
        for sender in subscribers.iter() {
            let _ = sender.try_send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[async_std::test]
    async fn generated_ids_are_distinct() {
        let store = MemoryStorage::new(StorageType::Local);
        let a = store.generate_new_obj_id().await.unwrap();
        let b = store.generate_new_obj_id().await.unwrap();
        assert_ne!(a, b);
    }

    #[async_std::test]
    async fn save_rejects_out_of_order_versions() {
        let store = MemoryStorage::new(StorageType::Local);
        let id = store.generate_new_obj_id().await.unwrap();

        let (tx, rx) = unbounded();
        tx.close();
        let subscribe = crate::crypto::Subscribe::new(rx);
        let result = store
            .save_obj(&id, Version::Known(5), vec![], subscribe)
            .await;
        assert!(matches!(result, Err(StorageError::VersionConflict { .. })));
    }
}
