//! Example consumer: a separate Rust project that uses architect-dispatch as a dependency.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Or from this directory: `cargo run`
//!
//! Serves an in-memory users API behind a bearer-token filter, and relays sign-up
//! events to a mailer worker.

use architect_dispatch::{
    init_tracing, serve, success_many, success_one, Action, Criteria, CrudDispatcher, Entity,
    Envelope, Exchange, Filter, FilterChain, MemoryStore, Next, Offload, RelayBus, Reply,
    RequestIdFilter, RouteCompiler, RouteDescriptor, ServerConfig, WebError,
};
use async_trait::async_trait;
use axum::http::{header, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct User {
    #[serde(default)]
    key: Option<u64>,
    name: String,
    #[serde(default)]
    email: Option<String>,
}

impl Entity for User {
    type Key = u64;

    fn key(&self) -> Option<u64> {
        self.key
    }

    fn with_key(mut self, key: u64) -> Self {
        self.key = Some(key);
        self
    }
}

type Users = Arc<CrudDispatcher<User, Offload<MemoryStore<User>>>>;

/// Requires `Authorization: Bearer <token>` and records the token owner in the context.
struct BearerAuth {
    token: String,
}

#[async_trait]
impl Filter for BearerAuth {
    fn name(&self) -> &'static str {
        "bearer-auth"
    }

    async fn do_filter(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), WebError> {
        let presented = exchange
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(self.token.as_str()) {
            exchange.end(Reply::status(StatusCode::UNAUTHORIZED));
            return Ok(());
        }
        self.context(exchange)?.put("principal", "admin");
        next.run(exchange).await
    }
}

fn key_param(env: &Envelope) -> Result<u64, WebError> {
    env.param("key")
        .ok_or_else(|| WebError::invalid_param("key", "missing"))?
        .parse()
        .map_err(|e| WebError::invalid_param("key", e))
}

fn descriptors(users: &Users) -> Vec<RouteDescriptor> {
    let list = Arc::clone(users);
    let read = Arc::clone(users);
    let create = Arc::clone(users);
    let remove = Arc::clone(users);
    vec![
        RouteDescriptor::get("/users").action(Action::deferred(move |env: Envelope| {
            let users = Arc::clone(&list);
            async move {
                let criteria = env
                    .query("name")
                    .map(|n| Criteria::new().eq("name", n))
                    .unwrap_or_default();
                success_many(users.search_async(&criteria).await?)
            }
        })),
        RouteDescriptor::get("/users/:key").action(Action::deferred(move |env: Envelope| {
            let users = Arc::clone(&read);
            async move {
                let key = key_param(&env)?;
                let user = users
                    .find_by_id_async(&key)
                    .await?
                    .ok_or_else(|| WebError::record_missing("users", key))?;
                success_one(user)
            }
        })),
        RouteDescriptor::post("/users")
            .consumes(["application/json"])
            .action(Action::deferred(move |env: Envelope| {
                let users = Arc::clone(&create);
                async move {
                    let user: User =
                        serde_json::from_value(env.body).map_err(WebError::invalid_body)?;
                    users
                        .insert_returning_key_async(user, |key| tracing::info!(key, "user created"))
                        .await
                        .and_then(success_one)
                }
            })),
        RouteDescriptor::delete("/users/:key").action(Action::deferred(move |env: Envelope| {
            let users = Arc::clone(&remove);
            async move {
                users.delete_by_id_async(&key_param(&env)?).await?;
                Ok::<_, WebError>(Value::Null)
            }
        })),
        RouteDescriptor::post("/signups")
            .consumes(["application/json"])
            .action(Action::sync(|env: Envelope| {
                Ok(json!({ "to": env.body.get("email").cloned().unwrap_or(Value::Null) }))
            }))
            .relay("mailer"),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    init_tracing(&config.log_filter);

    let store = MemoryStore::<User>::new().with_key_generator(|n| n);
    let users: Users = Arc::new(CrudDispatcher::new(Arc::new(Offload::new(store))));

    let bus = RelayBus::builder()
        .worker("mailer", |message: Envelope| async move {
            tracing::info!(to = %message.body["to"], "welcome mail queued");
            Ok::<_, WebError>(json!({ "queued": true }))
        })
        .build();

    let (routes, report) = RouteCompiler::new(Arc::new(bus)).build(&descriptors(&users));
    for rejected in &report.rejected {
        tracing::warn!(error = %rejected, "route rejected");
    }

    let token = std::env::var("EXAMPLE_TOKEN").unwrap_or_else(|_| "secret".into());
    let filters = FilterChain::new()
        .with(RequestIdFilter)
        .with(BearerAuth { token });
    serve(config, routes, filters).await?;
    Ok(())
}
