//! CRUD orchestration over a persistence collaborator.
//!
//! Every operation exists in a direct form (store implements [`Persistence`]) and a
//! deferred `*_async` form (store implements [`AsyncPersistence`]). Multi-stage
//! operations run their stages in sequence and stop at the first failure.
//!
//! `delete_by_filter` and `save_by_id` are not atomic. Records that start matching
//! the filter after the search stage survive the delete, and concurrent saves on one
//! key race with the last update winning. The dispatcher holds no locks; callers that
//! need more must layer it outside.

use crate::crud::entity::{Criteria, Entity};
use crate::crud::persistence::{AsyncPersistence, Persistence};
use crate::error::{PersistError, WebError};
use serde_json::Value;
use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;

pub struct CrudDispatcher<T: Entity, P> {
    store: Arc<P>,
    key_field: Cow<'static, str>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, P> Clone for CrudDispatcher<T, P> {
    fn clone(&self) -> Self {
        CrudDispatcher {
            store: Arc::clone(&self.store),
            key_field: self.key_field.clone(),
            _entity: PhantomData,
        }
    }
}

fn failed(op: &'static str) -> impl Fn(PersistError) -> WebError {
    move |e| {
        tracing::debug!(op, error = %e, "persistence call failed");
        WebError::persistence(op, e)
    }
}

impl<T: Entity, P> CrudDispatcher<T, P> {
    pub fn new(store: Arc<P>) -> Self {
        CrudDispatcher {
            store,
            key_field: Cow::Borrowed(T::KEY_FIELD),
            _entity: PhantomData,
        }
    }

    /// Overrides the field read from search results when deleting by filter.
    pub fn with_key_field(mut self, field: impl Into<Cow<'static, str>>) -> Self {
        self.key_field = field.into();
        self
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    pub fn store(&self) -> &Arc<P> {
        &self.store
    }

    /// One key per matched record. A record without a value at `key_field` aborts
    /// the delete before anything is removed.
    fn extract_keys(&self, matched: &[T]) -> Result<Vec<T::Key>, WebError> {
        matched
            .iter()
            .map(|entity| {
                let value = serde_json::to_value(entity)
                    .map_err(|e| WebError::unexpected("crud.delete_by_filter", e))?;
                match value.get(self.key_field.as_ref()) {
                    Some(Value::Null) | None => Err(WebError::unexpected(
                        "crud.delete_by_filter",
                        format!("matched record has no value at key field '{}'", self.key_field),
                    )),
                    Some(key) => serde_json::from_value(key.clone())
                        .map_err(|e| WebError::unexpected("crud.delete_by_filter", e)),
                }
            })
            .collect()
    }
}

impl<T: Entity, P: Persistence<T>> CrudDispatcher<T, P> {
    pub fn insert(&self, entity: T) -> Result<T, WebError> {
        self.store.insert(&entity).map_err(failed("crud.insert"))?;
        Ok(entity)
    }

    pub fn insert_batch(&self, entities: Vec<T>) -> Result<Vec<T>, WebError> {
        self.store
            .insert_batch(&entities)
            .map_err(failed("crud.insert_batch"))?;
        Ok(entities)
    }

    /// Inserts, calls `on_key` once with the generated key and returns the keyed entity.
    pub fn insert_returning_key<F>(&self, entity: T, on_key: F) -> Result<T, WebError>
    where
        F: FnOnce(&T::Key),
    {
        let key = self
            .store
            .insert_returning_key(&entity)
            .map_err(failed("crud.insert_returning_key"))?;
        on_key(&key);
        Ok(entity.with_key(key))
    }

    pub fn update(&self, entity: T) -> Result<T, WebError> {
        self.store.update(&entity).map_err(failed("crud.update"))?;
        Ok(entity)
    }

    pub fn update_batch(&self, entities: Vec<T>) -> Result<Vec<T>, WebError> {
        self.store
            .update_batch(&entities)
            .map_err(failed("crud.update_batch"))?;
        Ok(entities)
    }

    pub fn delete(&self, entity: T) -> Result<T, WebError> {
        self.store.delete(&entity).map_err(failed("crud.delete"))?;
        Ok(entity)
    }

    pub fn delete_batch(&self, entities: Vec<T>) -> Result<Vec<T>, WebError> {
        self.store
            .delete_batch(&entities)
            .map_err(failed("crud.delete_batch"))?;
        Ok(entities)
    }

    pub fn delete_by_id(&self, key: &T::Key) -> Result<bool, WebError> {
        self.store
            .delete_by_id(key)
            .map_err(failed("crud.delete_by_id"))?;
        Ok(true)
    }

    pub fn delete_by_ids(&self, keys: &[T::Key]) -> Result<bool, WebError> {
        self.store
            .delete_by_ids(keys)
            .map_err(failed("crud.delete_by_ids"))?;
        Ok(true)
    }

    pub fn find_by_id(&self, key: &T::Key) -> Result<Option<T>, WebError> {
        self.store.find_by_id(key).map_err(failed("crud.find_by_id"))
    }

    pub fn search(&self, criteria: &Criteria) -> Result<Vec<T>, WebError> {
        self.store.search(criteria).map_err(failed("crud.search"))
    }

    /// Search, extract keys, batch delete.
    pub fn delete_by_filter(&self, criteria: &Criteria) -> Result<bool, WebError> {
        let matched = self.search(criteria)?;
        let keys = self.extract_keys(&matched)?;
        tracing::debug!(matched = keys.len(), "delete by filter");
        if keys.is_empty() {
            return Ok(true);
        }
        self.delete_by_ids(&keys)
    }

    /// Find, apply `mutate`, update.
    pub fn save_by_id<F>(&self, key: &T::Key, mutate: F) -> Result<T, WebError>
    where
        F: FnOnce(T) -> T,
    {
        let current = self
            .find_by_id(key)?
            .ok_or_else(|| WebError::record_missing("crud.save_by_id", key))?;
        self.update(mutate(current))
    }
}

impl<T: Entity, P: AsyncPersistence<T>> CrudDispatcher<T, P> {
    pub async fn insert_async(&self, entity: T) -> Result<T, WebError> {
        self.store
            .insert(&entity)
            .await
            .map_err(failed("crud.insert"))?;
        Ok(entity)
    }

    pub async fn insert_batch_async(&self, entities: Vec<T>) -> Result<Vec<T>, WebError> {
        self.store
            .insert_batch(&entities)
            .await
            .map_err(failed("crud.insert_batch"))?;
        Ok(entities)
    }

    pub async fn insert_returning_key_async<F>(&self, entity: T, on_key: F) -> Result<T, WebError>
    where
        F: FnOnce(&T::Key) + Send,
    {
        let key = self
            .store
            .insert_returning_key(&entity)
            .await
            .map_err(failed("crud.insert_returning_key"))?;
        on_key(&key);
        Ok(entity.with_key(key))
    }

    pub async fn update_async(&self, entity: T) -> Result<T, WebError> {
        self.store
            .update(&entity)
            .await
            .map_err(failed("crud.update"))?;
        Ok(entity)
    }

    pub async fn update_batch_async(&self, entities: Vec<T>) -> Result<Vec<T>, WebError> {
        self.store
            .update_batch(&entities)
            .await
            .map_err(failed("crud.update_batch"))?;
        Ok(entities)
    }

    pub async fn delete_async(&self, entity: T) -> Result<T, WebError> {
        self.store
            .delete(&entity)
            .await
            .map_err(failed("crud.delete"))?;
        Ok(entity)
    }

    pub async fn delete_batch_async(&self, entities: Vec<T>) -> Result<Vec<T>, WebError> {
        self.store
            .delete_batch(&entities)
            .await
            .map_err(failed("crud.delete_batch"))?;
        Ok(entities)
    }

    pub async fn delete_by_id_async(&self, key: &T::Key) -> Result<bool, WebError> {
        self.store
            .delete_by_id(key)
            .await
            .map_err(failed("crud.delete_by_id"))?;
        Ok(true)
    }

    pub async fn delete_by_ids_async(&self, keys: &[T::Key]) -> Result<bool, WebError> {
        self.store
            .delete_by_ids(keys)
            .await
            .map_err(failed("crud.delete_by_ids"))?;
        Ok(true)
    }

    pub async fn find_by_id_async(&self, key: &T::Key) -> Result<Option<T>, WebError> {
        self.store
            .find_by_id(key)
            .await
            .map_err(failed("crud.find_by_id"))
    }

    pub async fn search_async(&self, criteria: &Criteria) -> Result<Vec<T>, WebError> {
        self.store
            .search(criteria)
            .await
            .map_err(failed("crud.search"))
    }

    pub async fn delete_by_filter_async(&self, criteria: &Criteria) -> Result<bool, WebError> {
        let matched = self.search_async(criteria).await?;
        let keys = self.extract_keys(&matched)?;
        tracing::debug!(matched = keys.len(), "delete by filter");
        if keys.is_empty() {
            return Ok(true);
        }
        self.delete_by_ids_async(&keys).await
    }

    pub async fn save_by_id_async<F>(&self, key: &T::Key, mutate: F) -> Result<T, WebError>
    where
        F: FnOnce(T) -> T + Send,
    {
        let current = self
            .find_by_id_async(key)
            .await?
            .ok_or_else(|| WebError::record_missing("crud.save_by_id", key))?;
        self.update_async(mutate(current)).await
    }
}
