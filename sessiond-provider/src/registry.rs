//! Named-provider registry (spec.md §4.5, §9): the host framework may build
//! several facade instances for the same provider name, and they must all
//! observe one backend. A concurrent map keyed by provider name, built
//! lazily at first configuration, gives each name's backend a
//! construct-exactly-once guarantee (spec.md §5: "lazy-publication
//! semantics").

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::ProviderBackend;

static REGISTRY: Lazy<DashMap<String, Arc<ProviderBackend>>> = Lazy::new(DashMap::new);

/// Return the backend registered under `provider_name`, constructing it
/// with `build` if this is the first call for that name. `DashMap::entry`
/// holds the shard lock for the duration of the closure, so concurrent
/// callers for the same name never race to construct two backends.
pub(crate) fn backend_for(
    provider_name: &str,
    build: impl FnOnce() -> Arc<ProviderBackend>,
) -> Arc<ProviderBackend> {
    if let Some(existing) = REGISTRY.get(provider_name) {
        return existing.clone();
    }
    REGISTRY.entry(provider_name.to_string()).or_insert_with(build).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backend_for_constructs_exactly_once_per_name() {
        static CALLS: AtomicU32 = AtomicU32::new(0);

        // Use a name unlikely to collide with other tests in this process,
        // since `REGISTRY` is process-global.
        let name = "registry-unit-test-unique-name";

        let build = || {
            CALLS.fetch_add(1, Ordering::SeqCst);
            ProviderBackend::build(
                Arc::new(sessiond_core::InMemoryDocumentStore::new(Arc::new(sessiond_core::SystemClock))),
                Arc::new(sessiond_core::SystemClock),
                &sessiond_common::StoreConfig::new("conn", "db"),
            )
        };

        let first = backend_for(name, build);
        let second = backend_for(name, build);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
