//! Architect dispatch: declarative route compilation, filter chains and CRUD dispatch
//! over axum and PostgreSQL.

pub mod config;
pub mod crud;
pub mod error;
pub mod filter;
pub mod relay;
pub mod response;
pub mod route;
pub mod server;
pub mod sql;
pub mod state;
pub mod telemetry;

pub use config::ServerConfig;
pub use crud::{AsyncPersistence, Criteria, CrudDispatcher, Entity, MemoryStore, Offload, Persistence, PgStore};
pub use error::{ConfigError, ErrorKind, ErrorPayload, PersistError, ServeError, WebError};
pub use filter::{ContextStore, Exchange, Filter, FilterChain, Next, RequestIdFilter};
pub use relay::{RelayBus, RelayWorker};
pub use response::{success_many, success_one, Reply};
pub use route::{Action, CompileReport, Envelope, HandlerKind, RouteCompiler, RouteDescriptor, RouteTable, Routes};
pub use server::serve;
pub use state::AppState;
pub use telemetry::init_tracing;
