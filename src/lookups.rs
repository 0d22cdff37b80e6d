// Lookups - alias table + generation set, built once and shared read-only
//
// Both load asynchronously at startup. Consumers that need them (direction
// inference, price joins) wait on LookupsHandle::ready() instead of reading
// whatever happens to be populated at the time.

use crate::generation::GenerationSet;
use crate::normalize::AliasTable;
use crate::source::Source;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct Lookups {
    aliases: AliasTable,
    generation: GenerationSet,
}

impl Lookups {
    pub fn new(aliases: AliasTable, generation: GenerationSet) -> Self {
        Lookups { aliases, generation }
    }

    /// No aliases, no generation barras
    pub fn empty() -> Self {
        Lookups::default()
    }

    /// Load aliases first, then the generation list normalized through them.
    /// Each half fails open independently.
    pub async fn load(alias_source: &Source, generation_source: &Source) -> Self {
        let aliases = AliasTable::load_or_empty(alias_source).await;
        let generation = GenerationSet::load_or_empty(generation_source, &aliases).await;
        Lookups::new(aliases, generation)
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn generation(&self) -> &GenerationSet {
        &self.generation
    }

    /// Canonical name for a raw label
    pub fn normalize(&self, raw: &str) -> String {
        self.aliases.normalize(raw)
    }

    /// Normalize a raw label and test generation membership
    pub fn is_generation(&self, raw: &str) -> bool {
        self.generation.contains_raw(raw, &self.aliases)
    }
}

// ============================================================================
// READINESS
// ============================================================================

/// Completion side of the lookup load. Dropping it without publishing makes
/// waiters fall back to empty lookups.
pub struct LookupsPublisher {
    tx: watch::Sender<Option<Arc<Lookups>>>,
}

impl LookupsPublisher {
    pub fn publish(self, lookups: Lookups) {
        // send_replace never fails, even with no receivers yet
        self.tx.send_replace(Some(Arc::new(lookups)));
    }
}

/// Waiting side; cheap to clone and hand to every consumer.
#[derive(Clone)]
pub struct LookupsHandle {
    rx: watch::Receiver<Option<Arc<Lookups>>>,
}

impl LookupsHandle {
    /// Wait until the lookups are published
    pub async fn ready(&self) -> Arc<Lookups> {
        let mut rx = self.rx.clone();
        let published = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => {
                warn!("lookup loader went away before publishing, using empty lookups");
                None
            }
        };

        published.unwrap_or_else(|| Arc::new(Lookups::empty()))
    }

    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

/// Create a linked publisher/handle pair
pub fn lookups_channel() -> (LookupsPublisher, LookupsHandle) {
    let (tx, rx) = watch::channel(None);
    (LookupsPublisher { tx }, LookupsHandle { rx })
}

/// Handle that is ready immediately
pub fn ready_lookups(lookups: Lookups) -> LookupsHandle {
    let (publisher, handle) = lookups_channel();
    publisher.publish(lookups);
    handle
}

/// Start loading in the background and return the handle to wait on
pub fn spawn_lookups(alias_source: Source, generation_source: Source) -> LookupsHandle {
    let (publisher, handle) = lookups_channel();

    tokio::spawn(async move {
        let lookups = Lookups::load(&alias_source, &generation_source).await;
        info!(
            aliases = lookups.aliases().len(),
            generation = lookups.generation().len(),
            "lookups ready"
        );
        publisher.publish(lookups);
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ready_waits_for_publish() {
        let (publisher, handle) = lookups_channel();
        assert!(!handle.is_ready());

        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.ready().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        let aliases = AliasTable::from_pairs([("cn", "central norte")]);
        let generation = GenerationSet::from_names(["CN"], &aliases);
        publisher.publish(Lookups::new(aliases, generation));

        let lookups = waiter.await.unwrap();
        assert!(lookups.is_generation("Central Norte 220kV"));
        assert!(handle.is_ready());
    }

    #[tokio::test]
    async fn test_ready_lookups_is_immediate() {
        let handle = ready_lookups(Lookups::empty());
        assert!(handle.is_ready());
        assert!(handle.ready().await.aliases().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_publisher_yields_empty() {
        let (publisher, handle) = lookups_channel();
        drop(publisher);

        let lookups = handle.ready().await;
        assert!(lookups.aliases().is_empty());
        assert!(lookups.generation().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_lookups_loads_generation_through_aliases() {
        let dir = std::env::temp_dir();
        let alias_path = dir.join("gridflow_lookups_alias.csv");
        let gen_path = dir.join("gridflow_lookups_gen.json");
        std::fs::write(&alias_path, "alias,barra\nC. Norte,Central Norte\n").unwrap();
        std::fs::write(&gen_path, r#"["C. Norte 220kV"]"#).unwrap();

        let handle = spawn_lookups(Source::File(alias_path.clone()), Source::File(gen_path.clone()));
        let lookups = handle.ready().await;

        assert!(lookups.generation().contains("central norte"));
        assert!(lookups.is_generation("c. norte"));

        std::fs::remove_file(alias_path).ok();
        std::fs::remove_file(gen_path).ok();
    }

    #[tokio::test]
    async fn test_spawn_lookups_fails_open() {
        let handle = spawn_lookups(
            Source::parse("/missing/alias.csv").unwrap(),
            Source::parse("/missing/generation.json").unwrap(),
        );
        let lookups = handle.ready().await;
        assert!(lookups.generation().is_empty());
    }
}
