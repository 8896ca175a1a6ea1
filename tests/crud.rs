//! CRUD dispatcher properties over in-memory and instrumented stores.

use architect_dispatch::{
    Criteria, CrudDispatcher, Entity, MemoryStore, Offload, PersistError, Persistence,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Task {
    key: Option<u32>,
    tag: String,
    hits: u32,
}

impl Entity for Task {
    type Key = u32;

    fn key(&self) -> Option<u32> {
        self.key
    }

    fn with_key(mut self, key: u32) -> Self {
        self.key = Some(key);
        self
    }
}

fn task(key: u32, tag: &str) -> Task {
    Task {
        key: Some(key),
        tag: tag.into(),
        hits: 0,
    }
}

/// Inserts `late` right after the first search returns, as a concurrent writer would.
struct Interleaving {
    inner: MemoryStore<Task>,
    late: Mutex<Option<Task>>,
    deleted: Mutex<Vec<u32>>,
}

impl Persistence<Task> for Interleaving {
    fn insert(&self, entity: &Task) -> Result<(), PersistError> {
        self.inner.insert(entity)
    }
    fn insert_batch(&self, entities: &[Task]) -> Result<(), PersistError> {
        self.inner.insert_batch(entities)
    }
    fn insert_returning_key(&self, entity: &Task) -> Result<u32, PersistError> {
        self.inner.insert_returning_key(entity)
    }
    fn update(&self, entity: &Task) -> Result<(), PersistError> {
        self.inner.update(entity)
    }
    fn update_batch(&self, entities: &[Task]) -> Result<(), PersistError> {
        self.inner.update_batch(entities)
    }
    fn delete(&self, entity: &Task) -> Result<(), PersistError> {
        self.inner.delete(entity)
    }
    fn delete_batch(&self, entities: &[Task]) -> Result<(), PersistError> {
        self.inner.delete_batch(entities)
    }
    fn delete_by_id(&self, key: &u32) -> Result<(), PersistError> {
        self.inner.delete_by_id(key)
    }
    fn delete_by_ids(&self, keys: &[u32]) -> Result<(), PersistError> {
        self.deleted.lock().unwrap().extend_from_slice(keys);
        self.inner.delete_by_ids(keys)
    }
    fn find_by_id(&self, key: &u32) -> Result<Option<Task>, PersistError> {
        self.inner.find_by_id(key)
    }
    fn search(&self, criteria: &Criteria) -> Result<Vec<Task>, PersistError> {
        let found = self.inner.search(criteria)?;
        if let Some(late) = self.late.lock().unwrap().take() {
            self.inner.insert(&late)?;
        }
        Ok(found)
    }
}

#[test]
fn delete_by_filter_spares_records_that_match_after_search() {
    let store = Arc::new(Interleaving {
        inner: MemoryStore::new(),
        late: Mutex::new(Some(task(99, "stale"))),
        deleted: Mutex::new(Vec::new()),
    });
    let crud = CrudDispatcher::new(Arc::clone(&store));
    crud.insert_batch(vec![task(1, "stale"), task(2, "fresh"), task(3, "stale")])
        .unwrap();

    assert!(crud.delete_by_filter(&Criteria::new().eq("tag", "stale")).unwrap());

    assert_eq!(*store.deleted.lock().unwrap(), vec![1, 3]);
    let left: Vec<u32> = store
        .inner
        .snapshot()
        .unwrap()
        .iter()
        .filter_map(|t| t.key)
        .collect();
    assert_eq!(left, vec![2, 99]);
}

#[test]
fn delete_by_filter_with_no_match_skips_the_store() {
    let store = Arc::new(Interleaving {
        inner: MemoryStore::new(),
        late: Mutex::new(None),
        deleted: Mutex::new(Vec::new()),
    });
    let crud = CrudDispatcher::new(Arc::clone(&store));
    crud.insert(task(1, "a")).unwrap();
    assert!(crud.delete_by_filter(&Criteria::new().eq("tag", "zzz")).unwrap());
    assert!(store.deleted.lock().unwrap().is_empty());
}

#[test]
fn sequential_save_equals_mutation_of_found_record() {
    let crud = CrudDispatcher::new(Arc::new(MemoryStore::<Task>::new()));
    crud.insert(task(5, "x")).unwrap();
    let bump = |mut t: Task| {
        t.hits += 1;
        t
    };
    for _ in 0..3 {
        let before = crud.find_by_id(&5).unwrap().unwrap();
        let saved = crud.save_by_id(&5, bump).unwrap();
        assert_eq!(saved, bump(before));
        assert_eq!(crud.find_by_id(&5).unwrap(), Some(saved));
    }
}

#[test]
fn insert_returning_key_reports_the_persisted_key() {
    let store = Arc::new(MemoryStore::<Task>::new().with_key_generator(|n| n as u32 + 100));
    let crud = CrudDispatcher::new(Arc::clone(&store));
    let calls = AtomicUsize::new(0);
    let mut reported = None;
    let stored = crud
        .insert_returning_key(
            Task {
                key: None,
                tag: "new".into(),
                hits: 0,
            },
            |k| {
                calls.fetch_add(1, Ordering::SeqCst);
                reported = Some(*k);
            },
        )
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(reported, stored.key);
    assert_eq!(store.find_by_id(&101).unwrap().map(|t| t.tag), Some("new".into()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_never_blend_mutations() {
    let crud = CrudDispatcher::new(Arc::new(Offload::new(MemoryStore::<Task>::new())));
    crud.insert_async(task(7, "base")).await.unwrap();
    let old = crud.find_by_id_async(&7).await.unwrap().unwrap();

    let m1 = |mut t: Task| {
        std::thread::sleep(Duration::from_millis(5));
        t.tag = "first".into();
        t.hits = 1;
        t
    };
    let m2 = |mut t: Task| {
        t.tag = "second".into();
        t.hits = 2;
        t
    };

    let (a, b) = tokio::join!(crud.save_by_id_async(&7, m1), crud.save_by_id_async(&7, m2));
    a.unwrap();
    b.unwrap();

    let last = crud.find_by_id_async(&7).await.unwrap().unwrap();
    assert!(last == m1(old.clone()) || last == m2(old));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_keys_complete_independently() {
    let crud = CrudDispatcher::new(Arc::new(Offload::new(MemoryStore::<Task>::new())));
    crud.insert_batch_async((1..=8).map(|k| task(k, "t")).collect())
        .await
        .unwrap();

    let handles: Vec<_> = (1..=8u32)
        .map(|k| {
            let crud = crud.clone();
            tokio::spawn(async move {
                crud.save_by_id_async(&k, move |mut t| {
                    t.hits = k;
                    t
                })
                .await
            })
        })
        .collect();
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let all = crud.search_async(&Criteria::new()).await.unwrap();
    assert_eq!(all.len(), 8);
    assert!(all.iter().all(|t| t.key == Some(t.hits)));
}

#[tokio::test]
async fn missing_record_aborts_async_save() {
    let crud = CrudDispatcher::new(Arc::new(Offload::new(MemoryStore::<Task>::new())));
    let called = AtomicUsize::new(0);
    let err = crud
        .save_by_id_async(&1, |t| {
            called.fetch_add(1, Ordering::SeqCst);
            t
        })
        .await
        .unwrap_err();
    assert_eq!(err.status().as_u16(), 404);
    assert_eq!(called.load(Ordering::SeqCst), 0);
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Ticket {
    id: Option<u32>,
    tag: String,
}

impl Entity for Ticket {
    type Key = u32;

    fn key(&self) -> Option<u32> {
        self.id
    }

    fn with_key(mut self, key: u32) -> Self {
        self.id = Some(key);
        self
    }
}

#[test]
fn delete_by_filter_fails_when_key_field_is_not_serialized() {
    let store = Arc::new(MemoryStore::<Ticket>::new());
    let crud = CrudDispatcher::new(Arc::clone(&store));
    crud.insert(Ticket {
        id: Some(1),
        tag: "x".into(),
    })
    .unwrap();

    let err = crud
        .delete_by_filter(&Criteria::new().eq("tag", "x"))
        .unwrap_err();
    assert!(err.status().is_server_error());
    assert_eq!(store.len(), 1);

    let crud = crud.with_key_field("id");
    assert!(crud.delete_by_filter(&Criteria::new().eq("tag", "x")).unwrap());
    assert_eq!(store.len(), 0);
}
