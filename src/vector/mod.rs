pub mod store;

pub use store::PgVectorStore;
