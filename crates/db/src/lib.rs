//! Document store abstraction for the libris gateway.
//!
//! Request handlers talk to a [`DocumentStore`]; production wiring uses
//! [`MongoStore`], tests substitute [`InMemoryStore`].

use std::sync::Arc;

pub mod codec;
pub mod error;
pub mod memory;
pub mod mongo;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use mongo::{ConnectOptions, MongoStore};
pub use mongodb::bson;
pub use store::{
    CollectionSpec, DocumentStore, FindQuery, IndexSpec, InsertManyOutcome, InsertOneOutcome,
    Provision, UpdateOutcome,
};

/// Store handle shared by every module and request.
pub type SharedStore = Arc<dyn DocumentStore>;

/// Create the MongoDB-backed store and probe it once.
///
/// An unreachable server is logged rather than returned: the gateway keeps
/// serving and individual requests fail until the database comes up.
pub async fn connect(
    uri: &str,
    database: &str,
    options: ConnectOptions,
) -> StoreResult<SharedStore> {
    let store = MongoStore::connect(uri, database, options).await?;

    match store.ping().await {
        Ok(()) => tracing::info!(target: "libris-db", db = %database, "mongodb connected"),
        Err(e) => tracing::error!(
            target: "libris-db",
            db = %database,
            error = %e,
            "mongodb unreachable, continuing without a ready connection"
        ),
    }

    Ok(Arc::new(store))
}
