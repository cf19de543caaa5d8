pub mod memory;
pub mod postgres_profile_directory;
pub mod postgres_transaction_repository;

pub use memory::{InMemoryProfileDirectory, InMemoryTransactionRepository, Profile};
pub use postgres_profile_directory::PostgresProfileDirectory;
pub use postgres_transaction_repository::PostgresTransactionRepository;
