pub mod sqlite;

pub use sqlite::SqliteKvStore;
