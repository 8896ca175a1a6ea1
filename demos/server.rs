//! Example server: a notes API over PostgreSQL, mounted from route descriptors.

use architect_dispatch::sql::TableRef;
use architect_dispatch::{
    init_tracing, serve, success_many, success_one, Action, Criteria, CrudDispatcher, Entity,
    Envelope, FilterChain, HandlerKind, PgStore, RelayBus, RequestIdFilter, RouteCompiler,
    RouteDescriptor, ServerConfig, WebError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Note {
    #[serde(default)]
    id: Option<i64>,
    title: String,
    #[serde(default)]
    done: bool,
}

impl Entity for Note {
    type Key = i64;
    const KEY_FIELD: &'static str = "id";

    fn key(&self) -> Option<i64> {
        self.id
    }

    fn with_key(mut self, key: i64) -> Self {
        self.id = Some(key);
        self
    }
}

type Notes = Arc<CrudDispatcher<Note, PgStore<Note>>>;

fn id_param(env: &Envelope) -> Result<i64, WebError> {
    env.param("id")
        .ok_or_else(|| WebError::invalid_param("id", "missing"))?
        .parse()
        .map_err(|e| WebError::invalid_param("id", e))
}

fn note_body(env: &Envelope) -> Result<Note, WebError> {
    serde_json::from_value(env.body.clone()).map_err(WebError::invalid_body)
}

fn criteria(env: &Envelope) -> Criteria {
    env.query
        .iter()
        .fold(Criteria::new(), |c, (k, v)| c.eq(k.clone(), v.clone()))
}

fn descriptors(notes: &Notes) -> Vec<RouteDescriptor> {
    let list = Arc::clone(notes);
    let read = Arc::clone(notes);
    let create = Arc::clone(notes);
    let save = Arc::clone(notes);
    let remove = Arc::clone(notes);
    let purge = Arc::clone(notes);
    vec![
        RouteDescriptor::get("/notes").action(Action::deferred(move |env: Envelope| {
            let notes = Arc::clone(&list);
            async move { success_many(notes.search_async(&criteria(&env)).await?) }
        })),
        RouteDescriptor::get("/notes/:id").action(Action::deferred(move |env: Envelope| {
            let notes = Arc::clone(&read);
            async move {
                let id = id_param(&env)?;
                let note = notes
                    .find_by_id_async(&id)
                    .await?
                    .ok_or_else(|| WebError::record_missing("notes", id))?;
                success_one(note)
            }
        })),
        RouteDescriptor::post("/notes")
            .consumes(["application/json"])
            .action(Action::deferred(move |env: Envelope| {
                let notes = Arc::clone(&create);
                async move {
                    let note = note_body(&env)?;
                    let stored = notes
                        .insert_returning_key_async(note, |id| tracing::info!(id, "note created"))
                        .await?;
                    success_one(stored)
                }
            })),
        RouteDescriptor::put("/notes/:id")
            .consumes(["application/json"])
            .action(Action::deferred(move |env: Envelope| {
                let notes = Arc::clone(&save);
                async move {
                    let id = id_param(&env)?;
                    let patch = note_body(&env)?;
                    let saved = notes
                        .save_by_id_async(&id, move |mut n| {
                            n.title = patch.title;
                            n.done = patch.done;
                            n
                        })
                        .await?;
                    success_one(saved)
                }
            })),
        RouteDescriptor::delete("/notes/:id").action(Action::deferred(move |env: Envelope| {
            let notes = Arc::clone(&remove);
            async move {
                notes.delete_by_id_async(&id_param(&env)?).await?;
                Ok::<_, WebError>(Value::Null)
            }
        })),
        RouteDescriptor::delete("/notes")
            .kind(HandlerKind::Async)
            .action(Action::deferred(move |env: Envelope| {
                let notes = Arc::clone(&purge);
                async move {
                    notes.delete_by_filter_async(&criteria(&env)).await?;
                    Ok::<_, WebError>(Value::Null)
                }
            })),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    init_tracing(&config.log_filter);

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/architect".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS public.notes (id BIGSERIAL PRIMARY KEY, title TEXT NOT NULL, done BOOLEAN NOT NULL DEFAULT false)",
    )
    .execute(&pool)
    .await?;

    let store = PgStore::new(pool, TableRef::new("public", "notes", "id"));
    let notes: Notes = Arc::new(CrudDispatcher::new(Arc::new(store)));

    let (routes, report) = RouteCompiler::new(Arc::new(RelayBus::empty())).build(&descriptors(&notes));
    tracing::info!(mounted = report.mounted, skipped = report.skipped, "routes compiled");

    serve(config, routes, FilterChain::new().with(RequestIdFilter)).await?;
    Ok(())
}
