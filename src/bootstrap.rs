//! Process wiring shared by the `libris-app` binary and the `libris` CLI.

use anyhow::Context;
use libris_db::{SharedStore, StoreError};
use libris_kernel::{settings::Settings, InitCtx, ModuleRegistry};

use crate::modules;

/// Registry holding every module, each bound to `store`.
pub fn build_registry(store: &SharedStore, settings: &Settings) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, store, &settings.library);
    registry
}

/// Connect to MongoDB, run the module lifecycle, and serve HTTP until a
/// shutdown signal arrives.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    tracing::info!(
        env = ?settings.environment,
        db = %settings.database.name,
        "libris bootstrap starting"
    );

    let store = libris_db::connect(
        &settings.database.uri,
        &settings.database.name,
        settings.database.connect_options(),
    )
    .await
    .context("failed to create the database client")?;

    let registry = build_registry(&store, &settings);
    let ctx = InitCtx {
        settings: &settings,
        store: &store,
    };

    registry.init_modules(&ctx).await?;
    registry.start_modules(&ctx).await?;
    tracing::info!(modules = registry.len(), "libris bootstrap complete");

    let served =
        libris_http::start_server(&registry, &settings, libris_http::shutdown_signal()).await;

    registry.stop_modules().await?;
    served
}

/// What a provisioning run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub applied: Vec<String>,
    /// Steps whose collection already existed.
    pub skipped: Vec<String>,
}

/// Apply every module's provisioning steps in registration order.
///
/// Existing collections are skipped so the command can be re-run; any other
/// failure stops the run.
pub async fn provision(
    store: &SharedStore,
    registry: &ModuleRegistry,
) -> anyhow::Result<ProvisionReport> {
    let mut report = ProvisionReport::default();

    for (module, step) in registry.collect_provisions() {
        let description = step.describe();
        match store.apply(&step).await {
            Ok(()) => {
                tracing::info!(module, step = %description, "provisioned");
                report.applied.push(description);
            }
            Err(StoreError::NamespaceExists(name)) => {
                tracing::warn!(module, step = %description, namespace = %name, "already exists, skipping");
                report.skipped.push(description);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to provision {description}"));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_db::InMemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn provisioning_is_rerunnable() {
        let memory = Arc::new(InMemoryStore::new());
        let store: SharedStore = memory.clone();
        let registry = build_registry(&store, &Settings::default());

        let first = provision(&store, &registry).await.unwrap();
        assert_eq!(
            first.applied,
            vec![
                "collection books".to_string(),
                "collection logs".to_string(),
                "index books.title_1".to_string(),
            ]
        );
        assert!(first.skipped.is_empty());
        assert_eq!(memory.indexes("books"), vec!["title_1".to_string()]);

        let second = provision(&store, &registry).await.unwrap();
        assert_eq!(
            second.skipped,
            vec!["collection books".to_string(), "collection logs".to_string()]
        );
        assert_eq!(second.applied, vec!["index books.title_1".to_string()]);
    }

    #[test]
    fn registry_holds_every_module() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let registry = build_registry(&store, &Settings::default());
        let names: Vec<_> = registry.modules().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["collections", "books", "logs"]);
    }
}
