/// Lobby persistence backends.
pub mod lobby_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
