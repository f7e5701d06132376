pub mod ack;
pub mod books;
pub mod collections;
pub mod logs;

use libris_db::SharedStore;
use libris_kernel::{settings::LibrarySettings, ModuleRegistry};

pub const BOOKS: &str = "books";
pub const AUTHORS: &str = "authors";
pub const LOGS: &str = "logs";

/// Register all project-specific modules with the registry
pub fn register_all(registry: &mut ModuleRegistry, store: &SharedStore, library: &LibrarySettings) {
    registry.register(collections::create_module(store.clone(), library));
    registry.register(books::create_module(store.clone(), library));
    registry.register(logs::create_module(store.clone()));
}
