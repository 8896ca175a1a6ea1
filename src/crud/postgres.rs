//! PostgreSQL persistence collaborator over a sqlx pool.

use crate::crud::entity::{Criteria, Entity};
use crate::crud::persistence::AsyncPersistence;
use crate::error::PersistError;
use crate::sql::{self, PgBindValue, QueryBuf, TableRef};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool};
use std::marker::PhantomData;

pub struct PgStore<T> {
    pool: PgPool,
    table: TableRef,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for PgStore<T> {
    fn clone(&self) -> Self {
        PgStore {
            pool: self.pool.clone(),
            table: self.table.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> PgStore<T> {
    pub fn new(pool: PgPool, table: TableRef) -> Self {
        PgStore {
            pool,
            table,
            _entity: PhantomData,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    fn row(entity: &T) -> Result<Map<String, Value>, PersistError> {
        match serde_json::to_value(entity)? {
            Value::Object(map) => Ok(map),
            other => Err(PersistError::Conflict(format!(
                "entity must serialize to an object, got {}",
                other
            ))),
        }
    }

    fn key_value(key: &T::Key) -> Result<Value, PersistError> {
        Ok(serde_json::to_value(key)?)
    }

    fn require_key(&self, entity: &T) -> Result<Value, PersistError> {
        let key = entity
            .key()
            .ok_or_else(|| PersistError::Conflict(format!("entity has no {}", self.table.key_column)))?;
        Self::key_value(&key)
    }

    fn decode(row: &PgRow) -> Result<T, PersistError> {
        Ok(serde_json::from_value(row_to_json(row))?)
    }
}

fn bind_all<'q>(
    q: &'q QueryBuf,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    query
}

async fn execute_tx(tx: &mut PgConnection, q: &QueryBuf) -> Result<(), PersistError> {
    bind_all(q).execute(&mut *tx).await?;
    Ok(())
}

#[async_trait]
impl<T: Entity> AsyncPersistence<T> for PgStore<T> {
    async fn insert(&self, entity: &T) -> Result<(), PersistError> {
        let q = sql::insert(&self.table, &Self::row(entity)?, false);
        bind_all(&q).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_batch(&self, entities: &[T]) -> Result<(), PersistError> {
        let mut tx = self.pool.begin().await?;
        for entity in entities {
            let q = sql::insert(&self.table, &Self::row(entity)?, false);
            execute_tx(&mut tx, &q).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_returning_key(&self, entity: &T) -> Result<T::Key, PersistError> {
        let q = sql::insert(&self.table, &Self::row(entity)?, true);
        let row = bind_all(&q).fetch_one(&self.pool).await?;
        Ok(serde_json::from_value(cell_to_value(
            &row,
            &self.table.key_column,
        ))?)
    }

    async fn update(&self, entity: &T) -> Result<(), PersistError> {
        if let Some(q) = sql::update(&self.table, &Self::row(entity)?) {
            bind_all(&q).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn update_batch(&self, entities: &[T]) -> Result<(), PersistError> {
        let mut tx = self.pool.begin().await?;
        for entity in entities {
            if let Some(q) = sql::update(&self.table, &Self::row(entity)?) {
                execute_tx(&mut tx, &q).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, entity: &T) -> Result<(), PersistError> {
        let q = sql::delete_by_id(&self.table, self.require_key(entity)?);
        bind_all(&q).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_batch(&self, entities: &[T]) -> Result<(), PersistError> {
        let keys = entities
            .iter()
            .map(|e| self.require_key(e))
            .collect::<Result<Vec<_>, _>>()?;
        if keys.is_empty() {
            return Ok(());
        }
        let q = sql::delete_by_ids(&self.table, keys);
        bind_all(&q).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_by_id(&self, key: &T::Key) -> Result<(), PersistError> {
        let q = sql::delete_by_id(&self.table, Self::key_value(key)?);
        bind_all(&q).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_by_ids(&self, keys: &[T::Key]) -> Result<(), PersistError> {
        if keys.is_empty() {
            return Ok(());
        }
        let keys = keys
            .iter()
            .map(Self::key_value)
            .collect::<Result<Vec<_>, _>>()?;
        let q = sql::delete_by_ids(&self.table, keys);
        bind_all(&q).execute(&self.pool).await?;
        Ok(())
    }

    async fn find_by_id(&self, key: &T::Key) -> Result<Option<T>, PersistError> {
        let q = sql::select_by_id(&self.table, Self::key_value(key)?);
        let row = bind_all(&q).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn search(&self, criteria: &Criteria) -> Result<Vec<T>, PersistError> {
        let q = sql::select_where(&self.table, criteria);
        let rows = bind_all(&q).fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode).collect()
    }
}

fn row_to_json(row: &PgRow) -> Value {
    use sqlx::{Column, Row};
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

/// Decodes one cell by trying the common column types in turn.
fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
