//! In-memory persistence collaborator keyed by the entity's primary key.

use crate::crud::entity::{Criteria, Entity};
use crate::crud::persistence::Persistence;
use crate::error::PersistError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type KeyGenerator<K> = Box<dyn Fn(u64) -> K + Send + Sync>;

pub struct MemoryStore<T: Entity> {
    rows: RwLock<BTreeMap<T::Key, T>>,
    sequence: AtomicU64,
    generator: Option<KeyGenerator<T::Key>>,
}

impl<T: Entity> Default for MemoryStore<T> {
    fn default() -> Self {
        MemoryStore {
            rows: RwLock::new(BTreeMap::new()),
            sequence: AtomicU64::new(0),
            generator: None,
        }
    }
}

impl<T: Entity> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys for entities inserted without one are produced from a counter starting at 1.
    pub fn with_key_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(u64) -> T::Key + Send + Sync + 'static,
    {
        self.generator = Some(Box::new(generator));
        self
    }

    pub fn len(&self) -> usize {
        self.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Result<Vec<T>, PersistError> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<T::Key, T>>, PersistError> {
        self.rows
            .read()
            .map_err(|_| PersistError::Unavailable("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<T::Key, T>>, PersistError> {
        self.rows
            .write()
            .map_err(|_| PersistError::Unavailable("memory store lock poisoned".into()))
    }

    fn next_key(&self) -> Result<T::Key, PersistError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| PersistError::Conflict("entity has no key and no generator is set".into()))?;
        Ok(generator(self.sequence.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn keyed(&self, entity: &T) -> Result<(T::Key, T), PersistError> {
        match entity.key() {
            Some(key) => Ok((key, entity.clone())),
            None => {
                let key = self.next_key()?;
                Ok((key.clone(), entity.clone().with_key(key)))
            }
        }
    }

    fn require_key(entity: &T) -> Result<T::Key, PersistError> {
        entity
            .key()
            .ok_or_else(|| PersistError::Conflict("entity has no key".into()))
    }
}

impl<T: Entity> Persistence<T> for MemoryStore<T> {
    fn insert(&self, entity: &T) -> Result<(), PersistError> {
        self.insert_returning_key(entity).map(|_| ())
    }

    fn insert_batch(&self, entities: &[T]) -> Result<(), PersistError> {
        let keyed = entities
            .iter()
            .map(|e| self.keyed(e))
            .collect::<Result<Vec<_>, _>>()?;
        let mut rows = self.write()?;
        for (key, _) in &keyed {
            if rows.contains_key(key) {
                return Err(PersistError::Conflict(format!("duplicate key {}", key)));
            }
        }
        rows.extend(keyed);
        Ok(())
    }

    fn insert_returning_key(&self, entity: &T) -> Result<T::Key, PersistError> {
        let (key, row) = self.keyed(entity)?;
        let mut rows = self.write()?;
        if rows.contains_key(&key) {
            return Err(PersistError::Conflict(format!("duplicate key {}", key)));
        }
        rows.insert(key.clone(), row);
        Ok(key)
    }

    fn update(&self, entity: &T) -> Result<(), PersistError> {
        let key = Self::require_key(entity)?;
        if let Some(row) = self.write()?.get_mut(&key) {
            *row = entity.clone();
        }
        Ok(())
    }

    fn update_batch(&self, entities: &[T]) -> Result<(), PersistError> {
        for entity in entities {
            self.update(entity)?;
        }
        Ok(())
    }

    fn delete(&self, entity: &T) -> Result<(), PersistError> {
        let key = Self::require_key(entity)?;
        self.delete_by_id(&key)
    }

    fn delete_batch(&self, entities: &[T]) -> Result<(), PersistError> {
        let keys = entities
            .iter()
            .map(Self::require_key)
            .collect::<Result<Vec<_>, _>>()?;
        self.delete_by_ids(&keys)
    }

    fn delete_by_id(&self, key: &T::Key) -> Result<(), PersistError> {
        self.write()?.remove(key);
        Ok(())
    }

    fn delete_by_ids(&self, keys: &[T::Key]) -> Result<(), PersistError> {
        let mut rows = self.write()?;
        for key in keys {
            rows.remove(key);
        }
        Ok(())
    }

    fn find_by_id(&self, key: &T::Key) -> Result<Option<T>, PersistError> {
        Ok(self.read()?.get(key).cloned())
    }

    fn search(&self, criteria: &Criteria) -> Result<Vec<T>, PersistError> {
        let rows = self.read()?;
        let mut out = Vec::new();
        for row in rows.values() {
            if criteria.matches(&serde_json::to_value(row)?) {
                out.push(row.clone());
            }
        }
        Ok(out)
    }
}
