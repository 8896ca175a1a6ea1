//! Persistence collaborator contracts, direct and deferred.

use crate::crud::entity::{Criteria, Entity};
use crate::error::PersistError;
use async_trait::async_trait;
use std::sync::Arc;

/// Blocking persistence calls. Must not run on the dispatch loop; wrap the store in
/// [`Offload`] to get the deferred form.
pub trait Persistence<T: Entity>: Send + Sync {
    fn insert(&self, entity: &T) -> Result<(), PersistError>;
    fn insert_batch(&self, entities: &[T]) -> Result<(), PersistError>;
    /// Inserts and returns the generated primary key.
    fn insert_returning_key(&self, entity: &T) -> Result<T::Key, PersistError>;
    fn update(&self, entity: &T) -> Result<(), PersistError>;
    fn update_batch(&self, entities: &[T]) -> Result<(), PersistError>;
    fn delete(&self, entity: &T) -> Result<(), PersistError>;
    fn delete_batch(&self, entities: &[T]) -> Result<(), PersistError>;
    fn delete_by_id(&self, key: &T::Key) -> Result<(), PersistError>;
    fn delete_by_ids(&self, keys: &[T::Key]) -> Result<(), PersistError>;
    fn find_by_id(&self, key: &T::Key) -> Result<Option<T>, PersistError>;
    fn search(&self, criteria: &Criteria) -> Result<Vec<T>, PersistError>;
}

#[async_trait]
pub trait AsyncPersistence<T: Entity>: Send + Sync {
    async fn insert(&self, entity: &T) -> Result<(), PersistError>;
    async fn insert_batch(&self, entities: &[T]) -> Result<(), PersistError>;
    async fn insert_returning_key(&self, entity: &T) -> Result<T::Key, PersistError>;
    async fn update(&self, entity: &T) -> Result<(), PersistError>;
    async fn update_batch(&self, entities: &[T]) -> Result<(), PersistError>;
    async fn delete(&self, entity: &T) -> Result<(), PersistError>;
    async fn delete_batch(&self, entities: &[T]) -> Result<(), PersistError>;
    async fn delete_by_id(&self, key: &T::Key) -> Result<(), PersistError>;
    async fn delete_by_ids(&self, keys: &[T::Key]) -> Result<(), PersistError>;
    async fn find_by_id(&self, key: &T::Key) -> Result<Option<T>, PersistError>;
    async fn search(&self, criteria: &Criteria) -> Result<Vec<T>, PersistError>;
}

/// Runs a direct store on the blocking worker pool. Also forwards the direct calls.
pub struct Offload<P> {
    inner: Arc<P>,
}

impl<P> Offload<P> {
    pub fn new(inner: P) -> Self {
        Offload {
            inner: Arc::new(inner),
        }
    }

    pub fn from_arc(inner: Arc<P>) -> Self {
        Offload { inner }
    }

    pub fn inner(&self) -> &Arc<P> {
        &self.inner
    }
}

impl<P> Clone for Offload<P> {
    fn clone(&self) -> Self {
        Offload {
            inner: Arc::clone(&self.inner),
        }
    }
}

async fn offload<P, R, F>(inner: &Arc<P>, f: F) -> Result<R, PersistError>
where
    P: Send + Sync + 'static,
    R: Send + 'static,
    F: FnOnce(&P) -> Result<R, PersistError> + Send + 'static,
{
    let inner = Arc::clone(inner);
    tokio::task::spawn_blocking(move || f(&inner))
        .await
        .map_err(|e| PersistError::Worker(e.to_string()))?
}

impl<T: Entity, P: Persistence<T>> Persistence<T> for Offload<P> {
    fn insert(&self, entity: &T) -> Result<(), PersistError> {
        self.inner.insert(entity)
    }

    fn insert_batch(&self, entities: &[T]) -> Result<(), PersistError> {
        self.inner.insert_batch(entities)
    }

    fn insert_returning_key(&self, entity: &T) -> Result<T::Key, PersistError> {
        self.inner.insert_returning_key(entity)
    }

    fn update(&self, entity: &T) -> Result<(), PersistError> {
        self.inner.update(entity)
    }

    fn update_batch(&self, entities: &[T]) -> Result<(), PersistError> {
        self.inner.update_batch(entities)
    }

    fn delete(&self, entity: &T) -> Result<(), PersistError> {
        self.inner.delete(entity)
    }

    fn delete_batch(&self, entities: &[T]) -> Result<(), PersistError> {
        self.inner.delete_batch(entities)
    }

    fn delete_by_id(&self, key: &T::Key) -> Result<(), PersistError> {
        self.inner.delete_by_id(key)
    }

    fn delete_by_ids(&self, keys: &[T::Key]) -> Result<(), PersistError> {
        self.inner.delete_by_ids(keys)
    }

    fn find_by_id(&self, key: &T::Key) -> Result<Option<T>, PersistError> {
        self.inner.find_by_id(key)
    }

    fn search(&self, criteria: &Criteria) -> Result<Vec<T>, PersistError> {
        self.inner.search(criteria)
    }
}

#[async_trait]
impl<T, P> AsyncPersistence<T> for Offload<P>
where
    T: Entity,
    P: Persistence<T> + 'static,
{
    async fn insert(&self, entity: &T) -> Result<(), PersistError> {
        let entity = entity.clone();
        offload(&self.inner, move |p: &P| p.insert(&entity)).await
    }

    async fn insert_batch(&self, entities: &[T]) -> Result<(), PersistError> {
        let entities = entities.to_vec();
        offload(&self.inner, move |p: &P| p.insert_batch(&entities)).await
    }

    async fn insert_returning_key(&self, entity: &T) -> Result<T::Key, PersistError> {
        let entity = entity.clone();
        offload(&self.inner, move |p: &P| p.insert_returning_key(&entity)).await
    }

    async fn update(&self, entity: &T) -> Result<(), PersistError> {
        let entity = entity.clone();
        offload(&self.inner, move |p: &P| p.update(&entity)).await
    }

    async fn update_batch(&self, entities: &[T]) -> Result<(), PersistError> {
        let entities = entities.to_vec();
        offload(&self.inner, move |p: &P| p.update_batch(&entities)).await
    }

    async fn delete(&self, entity: &T) -> Result<(), PersistError> {
        let entity = entity.clone();
        offload(&self.inner, move |p: &P| p.delete(&entity)).await
    }

    async fn delete_batch(&self, entities: &[T]) -> Result<(), PersistError> {
        let entities = entities.to_vec();
        offload(&self.inner, move |p: &P| p.delete_batch(&entities)).await
    }

    async fn delete_by_id(&self, key: &T::Key) -> Result<(), PersistError> {
        let key = key.clone();
        offload(&self.inner, move |p: &P| p.delete_by_id(&key)).await
    }

    async fn delete_by_ids(&self, keys: &[T::Key]) -> Result<(), PersistError> {
        let keys = keys.to_vec();
        offload(&self.inner, move |p: &P| p.delete_by_ids(&keys)).await
    }

    async fn find_by_id(&self, key: &T::Key) -> Result<Option<T>, PersistError> {
        let key = key.clone();
        offload(&self.inner, move |p: &P| p.find_by_id(&key)).await
    }

    async fn search(&self, criteria: &Criteria) -> Result<Vec<T>, PersistError> {
        let criteria = criteria.clone();
        offload(&self.inner, move |p: &P| p.search(&criteria)).await
    }
}
