//! Entity persistence orchestration.

pub mod dispatcher;
pub mod entity;
pub mod memory;
pub mod persistence;
pub mod postgres;

pub use dispatcher::CrudDispatcher;
pub use entity::{Criteria, Entity};
pub use memory::MemoryStore;
pub use persistence::{AsyncPersistence, Offload, Persistence};
pub use postgres::PgStore;
