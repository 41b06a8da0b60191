use crate::error::{Result, ShortenerError};
use crate::settings::ShortenerSettings;
use crate::shortener::{Created, Shortener};
use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use stubby_core::{Destination, ShortCode, StorageError, UrlMapping, UrlStore};
use stubby_generator::Generator;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

type Inflight = DashMap<Destination, Arc<Mutex<()>>>;

/// A concrete implementation of the [`Shortener`] trait.
///
/// This service wraps a [`UrlStore`] and a [`Generator`] and runs the
/// registration protocol:
/// - validate and normalize the destination
/// - return the existing code if the destination is already registered
/// - otherwise generate candidates, probe the store, and write the first
///   free one, giving up after `max_attempts`
///
/// Without `serialize_creates`, two concurrent creates for one destination
/// can both miss the reverse lookup. The loser's write then fails with a
/// conflict and is folded into the winner's code, except on backends whose
/// writes are not atomic (see [`stubby_core::ConsistencyLevel::PerKey`]).
pub struct ShortenerService<G> {
    store: Arc<dyn UrlStore>,
    generator: Arc<G>,
    settings: ShortenerSettings,
    inflight: Arc<Inflight>,
}

impl<G> Clone for ShortenerService<G> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            generator: Arc::clone(&self.generator),
            settings: self.settings.clone(),
            inflight: Arc::clone(&self.inflight),
        }
    }
}

/// Holds the per-destination lock and drops the map entry once nobody else
/// is waiting on it.
struct InflightGuard<'a> {
    inflight: &'a Inflight,
    destination: Destination,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.inflight
            .remove_if(&self.destination, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl<G: Generator> ShortenerService<G> {
    /// Creates a service with default settings.
    pub fn new(store: Arc<dyn UrlStore>, generator: G) -> Self {
        Self::with_settings(store, generator, ShortenerSettings::default())
    }

    pub fn with_settings(
        store: Arc<dyn UrlStore>,
        generator: G,
        settings: ShortenerSettings,
    ) -> Self {
        Self {
            store,
            generator: Arc::new(generator),
            settings,
            inflight: Arc::new(DashMap::new()),
        }
    }

    pub fn settings(&self) -> &ShortenerSettings {
        &self.settings
    }

    /// The store this service writes to.
    pub fn store(&self) -> &Arc<dyn UrlStore> {
        &self.store
    }

    /// Applies the configured deadline to a single store call.
    async fn bounded<T, F>(&self, operation: &str, call: F) -> std::result::Result<T, StorageError>
    where
        F: Future<Output = std::result::Result<T, StorageError>>,
    {
        match self.settings.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                StorageError::Timeout(format!("{operation} exceeded {}ms", limit.as_millis()))
            })?,
            None => call.await,
        }
    }

    fn storage_failure(&self, operation: &str, err: StorageError) -> ShortenerError {
        warn!(
            backend = self.store.backend(),
            operation,
            error = %err,
            "storage call failed"
        );
        ShortenerError::Storage(err)
    }

    async fn lock_destination(&self, destination: &Destination) -> InflightGuard<'_> {
        let lock = self
            .inflight
            .entry(destination.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;

        InflightGuard {
            inflight: &self.inflight,
            destination: destination.clone(),
            guard: Some(guard),
        }
    }

    fn inconsistent(&self, code: &ShortCode, destination: &Destination, detail: String) -> ShortenerError {
        warn!(
            backend = self.store.backend(),
            code = %code,
            destination = %destination,
            detail = %detail,
            "store directions disagree"
        );
        ShortenerError::Storage(StorageError::Inconsistent(detail))
    }

    /// Checks that `code`, found through the reverse index, maps back to
    /// `destination`.
    async fn confirm_existing(&self, code: ShortCode, destination: Destination) -> Result<Created> {
        match self
            .bounded("forward lookup", self.store.get_destination(&code))
            .await
        {
            Ok(bound) if bound == destination => {
                debug!(code = %code, destination = %destination, "destination already registered");
                Ok(Created {
                    short_code: code,
                    destination,
                    already_existed: true,
                })
            }
            Ok(bound) => {
                let detail = format!("'{destination}' maps to '{code}', which maps to '{bound}'");
                Err(self.inconsistent(&code, &destination, detail))
            }
            Err(e) if e.is_not_found() => {
                let detail = format!("'{destination}' maps to '{code}', which is not bound");
                Err(self.inconsistent(&code, &destination, detail))
            }
            Err(e) => Err(self.storage_failure("forward lookup", e)),
        }
    }

    async fn register(&self, destination: Destination, owner: Option<String>) -> Result<Created> {
        match self
            .bounded("reverse lookup", self.store.get_short_code(&destination))
            .await
        {
            Ok(code) => return self.confirm_existing(code, destination).await,
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(self.storage_failure("reverse lookup", e)),
        }

        let max_attempts = self.settings.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let candidate = self.generator.generate();

            match self
                .bounded("forward probe", self.store.get_destination(&candidate))
                .await
            {
                Ok(_) => {
                    debug!(code = %candidate, attempt, "candidate already taken");
                    continue;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(self.storage_failure("forward probe", e)),
            }

            let mapping =
                UrlMapping::new(candidate.clone(), destination.clone()).with_owner(owner.clone());
            match self.bounded("put", self.store.put(&mapping)).await {
                Ok(()) => {
                    info!(code = %candidate, destination = %destination, attempt, "created mapping");
                    return Ok(Created {
                        short_code: candidate,
                        destination,
                        already_existed: false,
                    });
                }
                Err(StorageError::Conflict(key)) => {
                    // Either the code was taken after the probe, or a
                    // concurrent create bound the destination first.
                    match self
                        .bounded("reverse lookup", self.store.get_short_code(&destination))
                        .await
                    {
                        Ok(code) => return self.confirm_existing(code, destination).await,
                        Err(e) if e.is_not_found() => {
                            debug!(code = %candidate, key = %key, attempt, "candidate lost to a concurrent write");
                        }
                        Err(e) => return Err(self.storage_failure("reverse lookup", e)),
                    }
                }
                Err(e) => return Err(self.storage_failure("put", e)),
            }
        }

        warn!(destination = %destination, attempts = max_attempts, "no free short code found");
        Err(ShortenerError::CodeSpaceExhausted {
            attempts: max_attempts,
        })
    }
}

#[async_trait]
impl<G: Generator> Shortener for ShortenerService<G> {
    async fn create_mapping_for(
        &self,
        destination: &str,
        owner: Option<String>,
    ) -> Result<Created> {
        let destination = Destination::parse(destination).inspect_err(|e| {
            debug!(error = %e, "rejected destination");
        })?;

        let _serialized = if self.settings.serialize_creates {
            Some(self.lock_destination(&destination).await)
        } else {
            None
        };

        self.register(destination, owner).await
    }

    async fn resolve(&self, code: &str) -> Result<Destination> {
        // A malformed code can never be bound.
        let Ok(code) = ShortCode::new(code) else {
            return Err(ShortenerError::NotFound(code.to_string()));
        };

        match self
            .bounded("forward lookup", self.store.get_destination(&code))
            .await
        {
            Ok(destination) => Ok(destination),
            Err(e) if e.is_not_found() => Err(ShortenerError::NotFound(code.to_string())),
            Err(e) => Err(self.storage_failure("forward lookup", e)),
        }
    }

    async fn remove(&self, code: &str) -> Result<()> {
        self.resolve(code).await?;
        let code = ShortCode::new_unchecked(code);

        match self.bounded("delete", self.store.delete(&code)).await {
            Ok(()) => {
                info!(code = %code, "removed mapping");
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(ShortenerError::NotFound(code.to_string())),
            Err(e) => Err(self.storage_failure("delete", e)),
        }
    }

    async fn backend_health(&self) -> bool {
        match self.settings.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, self.store.health())
                .await
                .unwrap_or(false),
            None => self.store.health().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;
    use stubby_core::{ConsistencyLevel, CoreError, SHORT_CODE_LENGTH};
    use stubby_generator::{RandomGenerator, SeqGenerator};
    use stubby_storage::{InMemoryStore, RedbStore};

    fn memory_service() -> (Arc<InMemoryStore>, ShortenerService<SeqGenerator>) {
        let store = Arc::new(InMemoryStore::new());
        let service = ShortenerService::new(store.clone(), SeqGenerator::new());
        (store, service)
    }

    async fn seed(store: &InMemoryStore, code: &str, destination: &str) {
        store
            .put(&UrlMapping::new(
                ShortCode::new(code).unwrap(),
                Destination::parse(destination).unwrap(),
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bare_domain_is_normalized_and_resolvable() {
        let (_, service) = memory_service();

        let created = service.create_mapping("example.com").await.unwrap();
        assert_eq!(created.destination.as_str(), "http://example.com");
        assert!(!created.already_existed);
        assert_eq!(created.short_code.as_str().len(), SHORT_CODE_LENGTH);
        assert!(ShortCode::new(created.short_code.as_str()).is_ok());

        let resolved = service.resolve(created.short_code.as_str()).await.unwrap();
        assert_eq!(resolved.as_str(), "http://example.com");
    }

    #[tokio::test]
    async fn malformed_scheme_is_rejected_without_writing() {
        let (store, service) = memory_service();

        let err = service.create_mapping("http:/example.com").await.unwrap_err();
        assert!(matches!(err, ShortenerError::Validation(CoreError::InvalidUrl(_))));
        assert!(err.to_string().contains("http:/example.com"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn create_is_idempotent_per_destination() {
        let (store, service) = memory_service();

        let first = service.create_mapping("https://example.com/a").await.unwrap();
        let second = service.create_mapping("https://example.com/a").await.unwrap();

        assert_eq!(first.short_code, second.short_code);
        assert!(!first.already_existed);
        assert!(second.already_existed);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn equivalent_inputs_share_a_code() {
        let (_, service) = memory_service();

        let bare = service.create_mapping("example.com").await.unwrap();
        let explicit = service.create_mapping("http://example.com").await.unwrap();

        assert_eq!(bare.short_code, explicit.short_code);
        assert!(explicit.already_existed);
    }

    #[tokio::test]
    async fn distinct_destinations_get_distinct_codes() {
        let store = Arc::new(InMemoryStore::new());
        let service = ShortenerService::new(store, RandomGenerator::seeded(42));

        let mut codes = HashSet::new();
        for i in 0..50 {
            let created = service
                .create_mapping(&format!("https://example.com/{i}"))
                .await
                .unwrap();
            assert!(codes.insert(created.short_code));
        }
    }

    #[tokio::test]
    async fn taken_candidates_are_skipped() {
        let (store, service) = memory_service();
        seed(&store, "aaaaaaa", "https://one.example").await;
        seed(&store, "aaaaaab", "https://two.example").await;

        let created = service.create_mapping("https://three.example").await.unwrap();
        assert_eq!(created.short_code.as_str(), "aaaaaac");
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (store, service) = memory_service();
        seed(&store, "aaaaaaa", "https://one.example").await;
        seed(&store, "aaaaaab", "https://two.example").await;
        seed(&store, "aaaaaac", "https://three.example").await;

        let err = service.create_mapping("https://four.example").await.unwrap_err();
        assert!(matches!(err, ShortenerError::CodeSpaceExhausted { attempts: 3 }));
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn max_attempts_is_configurable() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "aaaaaaa", "https://one.example").await;
        seed(&store, "aaaaaab", "https://two.example").await;
        seed(&store, "aaaaaac", "https://three.example").await;
        let settings = ShortenerSettings::builder().max_attempts(4).build();
        let service = ShortenerService::with_settings(store, SeqGenerator::new(), settings);

        let created = service.create_mapping("https://four.example").await.unwrap();
        assert_eq!(created.short_code.as_str(), "aaaaaad");
    }

    #[tokio::test]
    async fn owner_is_stored() {
        let (store, service) = memory_service();

        let created = service
            .create_mapping_for("example.com", Some("luke".to_string()))
            .await
            .unwrap();
        assert_eq!(store.owner(&created.short_code).as_deref(), Some("luke"));
    }

    #[tokio::test]
    async fn remove_then_resolve_is_not_found() {
        let (_, service) = memory_service();
        let created = service.create_mapping("example.com").await.unwrap();
        let code = created.short_code.as_str();

        service.remove(code).await.unwrap();

        assert!(matches!(service.resolve(code).await, Err(ShortenerError::NotFound(_))));
        assert!(matches!(service.remove(code).await, Err(ShortenerError::NotFound(_))));

        let again = service.create_mapping("example.com").await.unwrap();
        assert!(!again.already_existed);
    }

    #[tokio::test]
    async fn unknown_and_malformed_codes_are_not_found() {
        let (_, service) = memory_service();

        assert!(matches!(service.resolve("zzzzzzz").await, Err(ShortenerError::NotFound(_))));
        assert!(matches!(service.resolve("bad").await, Err(ShortenerError::NotFound(_))));
        assert!(matches!(service.remove("a/b-c_d").await, Err(ShortenerError::NotFound(_))));
    }

    #[tokio::test]
    async fn health_follows_the_store() {
        let (store, service) = memory_service();
        assert!(service.backend_health().await);

        store.close().await.unwrap();
        assert!(!service.backend_health().await);
    }

    #[tokio::test]
    async fn closed_store_surfaces_as_storage_error() {
        let (store, service) = memory_service();
        store.close().await.unwrap();

        let err = service.create_mapping("example.com").await.unwrap_err();
        assert!(matches!(
            err.storage(),
            Some(StorageError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_creates_agree_on_one_code() {
        for serialize_creates in [false, true] {
            let store = Arc::new(InMemoryStore::new());
            let settings = ShortenerSettings::builder()
                .serialize_creates(serialize_creates)
                .build();
            let service = ShortenerService::with_settings(store.clone(), SeqGenerator::new(), settings);

            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let service = service.clone();
                    tokio::spawn(async move { service.create_mapping("https://race.example").await })
                })
                .collect();

            let mut codes = HashSet::new();
            let mut fresh = 0;
            for handle in handles {
                let created = handle.await.unwrap().unwrap();
                if !created.already_existed {
                    fresh += 1;
                }
                codes.insert(created.short_code);
            }

            assert_eq!(codes.len(), 1);
            assert_eq!(fresh, 1);
            assert_eq!(store.len(), 1);
            assert!(service.inflight.is_empty());
        }
    }

    #[tokio::test]
    async fn round_trip_on_redb() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RedbStore::new(dir.path().join("stubby.redb")));
        store.open().await.unwrap();
        assert_eq!(store.consistency(), ConsistencyLevel::Atomic);
        let service = ShortenerService::new(store, RandomGenerator::seeded(7));

        let created = service.create_mapping("example.com/abc?de=1").await.unwrap();
        let again = service.create_mapping("example.com/abc?de=1").await.unwrap();
        assert_eq!(created.short_code, again.short_code);
        assert!(again.already_existed);

        let resolved = service.resolve(created.short_code.as_str()).await.unwrap();
        assert_eq!(resolved.as_str(), "http://example.com/abc?de=1");

        service.remove(created.short_code.as_str()).await.unwrap();
        assert!(matches!(
            service.resolve(created.short_code.as_str()).await,
            Err(ShortenerError::NotFound(_))
        ));
    }

    /// Wraps an [`InMemoryStore`] and misbehaves on demand.
    struct FaultyStore {
        inner: InMemoryStore,
        delay: Option<Duration>,
        reverse_hit: Option<ShortCode>,
    }

    impl FaultyStore {
        fn slow(delay: Duration) -> Self {
            Self {
                inner: InMemoryStore::new(),
                delay: Some(delay),
                reverse_hit: None,
            }
        }

        fn dangling_reverse(code: &str) -> Self {
            Self {
                inner: InMemoryStore::new(),
                delay: None,
                reverse_hit: Some(ShortCode::new_unchecked(code)),
            }
        }
    }

    #[async_trait]
    impl UrlStore for FaultyStore {
        fn backend(&self) -> &'static str {
            "faulty"
        }

        fn consistency(&self) -> ConsistencyLevel {
            ConsistencyLevel::PerKey
        }

        async fn open(&self) -> stubby_core::store::Result<()> {
            self.inner.open().await
        }

        async fn close(&self) -> stubby_core::store::Result<()> {
            self.inner.close().await
        }

        async fn health(&self) -> bool {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.inner.health().await
        }

        async fn get_destination(&self, code: &ShortCode) -> stubby_core::store::Result<Destination> {
            self.inner.get_destination(code).await
        }

        async fn get_short_code(
            &self,
            destination: &Destination,
        ) -> stubby_core::store::Result<ShortCode> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.reverse_hit {
                Some(code) => Ok(code.clone()),
                None => self.inner.get_short_code(destination).await,
            }
        }

        async fn put(&self, mapping: &UrlMapping) -> stubby_core::store::Result<()> {
            self.inner.put(mapping).await
        }

        async fn delete(&self, code: &ShortCode) -> stubby_core::store::Result<()> {
            self.inner.delete(code).await
        }
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let store = Arc::new(FaultyStore::slow(Duration::from_secs(5)));
        let settings = ShortenerSettings::builder()
            .operation_timeout(Some(Duration::from_millis(20)))
            .build();
        let service = ShortenerService::with_settings(store, SeqGenerator::new(), settings);

        let err = service.create_mapping("example.com").await.unwrap_err();
        assert!(matches!(err.storage(), Some(StorageError::Timeout(_))));
        assert!(!service.backend_health().await);
    }

    #[tokio::test]
    async fn reverse_hit_without_forward_is_inconsistent() {
        let store = Arc::new(FaultyStore::dangling_reverse("ghost12"));
        let service = ShortenerService::new(store, SeqGenerator::new());

        let err = service.create_mapping("example.com").await.unwrap_err();
        assert!(matches!(err.storage(), Some(StorageError::Inconsistent(_))));
    }

    #[tokio::test]
    async fn reverse_hit_pointing_elsewhere_is_inconsistent() {
        let store = Arc::new(FaultyStore::dangling_reverse("aaaaaaa"));
        store
            .inner
            .put(&UrlMapping::new(
                ShortCode::new("aaaaaaa").unwrap(),
                Destination::parse("https://other.example").unwrap(),
            ))
            .await
            .unwrap();
        let service = ShortenerService::new(store, SeqGenerator::new());

        let err = service.create_mapping("example.com").await.unwrap_err();
        assert!(matches!(err.storage(), Some(StorageError::Inconsistent(_))));
    }
}
