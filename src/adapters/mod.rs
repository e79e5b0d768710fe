pub mod memory;
pub mod postgres;
pub mod revalidate;

pub use memory::{InMemoryStore, StoreState};
pub use postgres::PostgresStore;
pub use revalidate::HttpRevalidator;
