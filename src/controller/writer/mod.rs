//! # Rate-Limited Writer
//!
//! Every store mutation goes through [`RateLimitedWriter`]:
//!
//! 1. A token is taken from the shared [`TokenBucket`] (waiting if needed)
//! 2. The payload is shaped for the target path's KV layout
//! 3. The provider call is timed, and failures are classified and counted
//!
//! `batch_write` runs operations in fixed-size chunks under a mutex, pausing
//! between chunks, so batches from different targets never interleave.
//! Failures are never retried here; the work queue requeues the reconcile.

pub mod rate_limit;

pub use rate_limit::TokenBucket;

use crate::config::ControllerConfig;
use crate::controller::paths::StorePath;
use crate::error::StoreError;
use crate::observability::metrics;
use crate::provider::SecretStoreProvider;
use crate::target::SecretData;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// One entry of a batch
#[derive(Debug, Clone)]
pub enum BatchOperation {
    Write { path: StorePath, data: SecretData },
    Delete { path: StorePath },
}

impl BatchOperation {
    #[must_use]
    pub fn path(&self) -> &StorePath {
        match self {
            BatchOperation::Write { path, .. } | BatchOperation::Delete { path } => path,
        }
    }
}

/// Writer tuning
#[derive(Debug, Clone)]
pub struct WriterSettings {
    pub rate_per_sec: f64,
    pub burst: u32,
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub large_payload_bytes: usize,
}

impl WriterSettings {
    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            rate_per_sec: config.store_rate_limit_per_sec,
            burst: config.store_rate_limit_burst,
            batch_size: config.batch_size,
            batch_pause: config.batch_pause(),
            large_payload_bytes: config.large_payload_bytes,
        }
    }
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self::from_config(&ControllerConfig::default())
    }
}

/// Size used for the large-payload threshold: key bytes plus value bytes
#[must_use]
pub fn payload_size(data: &SecretData) -> usize {
    data.iter().map(|(k, v)| k.len() + v.len()).sum()
}

/// Store writer shared by all reconciles
pub struct RateLimitedWriter {
    provider: Arc<dyn SecretStoreProvider>,
    limiter: TokenBucket,
    batch_lock: Mutex<()>,
    settings: WriterSettings,
}

impl std::fmt::Debug for RateLimitedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedWriter")
            .field("limiter", &self.limiter)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RateLimitedWriter {
    pub fn new(provider: Arc<dyn SecretStoreProvider>, settings: WriterSettings) -> Self {
        Self {
            provider,
            limiter: TokenBucket::new(settings.rate_per_sec, settings.burst),
            batch_lock: Mutex::new(()),
            settings,
        }
    }

    /// Write `data` to `path`
    ///
    /// # Errors
    ///
    /// Propagates the provider's [`StoreError`] after counting its class.
    pub async fn write(&self, path: &StorePath, data: &SecretData) -> Result<(), StoreError> {
        self.admit().await;

        let size = payload_size(data);
        if size > self.settings.large_payload_bytes {
            return self.write_large(path, data, size).await;
        }

        let payload = path.shape_for_write(data);
        self.execute(
            "write",
            path.physical(),
            self.provider.write_secret(path.physical(), &payload),
        )
        .await
    }

    /// Payloads above the threshold. Still one request today.
    // TODO: split oversized payloads across numbered sub-paths once readers can reassemble them
    async fn write_large(
        &self,
        path: &StorePath,
        data: &SecretData,
        size: usize,
    ) -> Result<(), StoreError> {
        metrics::increment_large_payload_writes();
        warn!(
            path = %path.physical(),
            size_bytes = size,
            threshold_bytes = self.settings.large_payload_bytes,
            "Writing large payload in a single request"
        );

        let payload = path.shape_for_write(data);
        self.execute(
            "write_large",
            path.physical(),
            self.provider.write_secret(path.physical(), &payload),
        )
        .await
    }

    /// Delete `path`
    ///
    /// # Errors
    ///
    /// Propagates the provider's [`StoreError`] after counting its class.
    pub async fn delete(&self, path: &StorePath) -> Result<(), StoreError> {
        self.admit().await;
        let delete_path = path.shape_for_delete();
        self.execute(
            "delete",
            delete_path,
            self.provider.delete_secret(delete_path),
        )
        .await
    }

    /// Run `operations` in chunks, stopping at the first failure
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`]; later operations are not attempted.
    pub async fn batch_write(&self, operations: &[BatchOperation]) -> Result<(), StoreError> {
        if operations.is_empty() {
            return Ok(());
        }

        let _guard = self.batch_lock.lock().await;
        let chunk_size = self.settings.batch_size.max(1);

        for (index, chunk) in operations.chunks(chunk_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.batch_pause).await;
            }
            debug!(chunk = index, operations = chunk.len(), "Running store batch chunk");

            for operation in chunk {
                match operation {
                    BatchOperation::Write { path, data } => self.write(path, data).await?,
                    BatchOperation::Delete { path } => self.delete(path).await?,
                }
            }
        }

        Ok(())
    }

    async fn admit(&self) {
        let waited = self.limiter.acquire().await;
        metrics::observe_rate_limit_wait(waited.as_secs_f64());
        if !waited.is_zero() {
            debug!(waited_ms = waited.as_millis() as u64, "Store rate limit applied");
        }
    }

    async fn execute<F>(&self, operation: &str, path: &str, call: F) -> Result<(), StoreError>
    where
        F: Future<Output = Result<(), StoreError>>,
    {
        let start = Instant::now();
        let result = call.await;
        metrics::record_store_operation(operation, start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            let class = e.class();
            metrics::increment_store_errors(class.as_str());
            error!(
                path = %path,
                operation = %operation,
                error_type = %class,
                error = %e,
                "Store operation failed"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::paths::{KvVersion, PathResolver};
    use crate::error::StoreErrorClass;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingProvider {
        calls: StdMutex<Vec<(String, String, Option<Value>)>>,
        fail_with: Option<String>,
        delay: Duration,
    }

    impl RecordingProvider {
        fn calls(&self) -> Vec<(String, String, Option<Value>)> {
            self.calls.lock().unwrap().clone()
        }

        async fn record(&self, op: &str, path: &str, payload: Option<Value>) -> Result<(), StoreError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.calls
                .lock()
                .unwrap()
                .push((op.to_string(), path.to_string(), payload));
            match &self.fail_with {
                Some(message) => Err(StoreError::operation("write", path, message.clone())),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl SecretStoreProvider for RecordingProvider {
        async fn write_secret(&self, path: &str, payload: &Value) -> Result<(), StoreError> {
            self.record("write", path, Some(payload.clone())).await
        }

        async fn delete_secret(&self, path: &str) -> Result<(), StoreError> {
            self.record("delete", path, None).await
        }

        async fn health_check(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn readiness_check(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn settings() -> WriterSettings {
        WriterSettings {
            rate_per_sec: 1000.0,
            burst: 1000,
            batch_size: 5,
            batch_pause: Duration::from_millis(100),
            large_payload_bytes: 1024 * 1024,
        }
    }

    fn data(pairs: &[(&str, &str)]) -> SecretData {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn writes(prefix: &str, count: usize) -> Vec<BatchOperation> {
        let resolver = PathResolver::new("", KvVersion::Auto);
        (0..count)
            .map(|i| BatchOperation::Write {
                path: resolver.resolve(&format!("secret/data/{prefix}/{i}"), None),
                data: data(&[("k", "v")]),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_write_shapes_payload_for_path() {
        let provider = Arc::new(RecordingProvider::default());
        let writer = RateLimitedWriter::new(provider.clone(), settings());
        let resolver = PathResolver::new("c1", KvVersion::Auto);

        let path = resolver.resolve("secret/data/app", None);
        writer.write(&path, &data(&[("user", "u")])).await.unwrap();

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "clusters/c1/secret/data/app");
        assert_eq!(calls[0].2, Some(json!({"data": {"user": "u"}})));
    }

    #[tokio::test]
    async fn test_delete_uses_unwrapped_path() {
        let provider = Arc::new(RecordingProvider::default());
        let writer = RateLimitedWriter::new(provider.clone(), settings());
        let path = PathResolver::new("", KvVersion::Auto).resolve("secret/data/app", None);

        writer.delete(&path).await.unwrap();
        assert_eq!(
            provider.calls(),
            vec![("delete".to_string(), "secret/data/app".to_string(), None)]
        );
    }

    #[tokio::test]
    async fn test_error_is_classified_and_propagated() {
        let provider = Arc::new(RecordingProvider {
            fail_with: Some("Code: 403. Errors: * permission denied".to_string()),
            ..Default::default()
        });
        let writer = RateLimitedWriter::new(provider, settings());
        let path = PathResolver::new("", KvVersion::Auto).resolve("secret/data/app", None);

        let err = writer.write(&path, &data(&[("k", "v")])).await.unwrap_err();
        assert_eq!(err.class(), StoreErrorClass::PermissionDenied);
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_large_payload_still_single_write() {
        let provider = Arc::new(RecordingProvider::default());
        let writer = RateLimitedWriter::new(
            provider.clone(),
            WriterSettings {
                large_payload_bytes: 8,
                ..settings()
            },
        );
        let path = PathResolver::new("", KvVersion::Auto).resolve("secret/app", None);

        writer
            .write(&path, &data(&[("key", "a-value-longer-than-threshold")]))
            .await
            .unwrap();
        assert_eq!(provider.calls().len(), 1);
    }

    #[test]
    fn test_payload_size_counts_keys_and_values() {
        assert_eq!(payload_size(&data(&[("ab", "cde"), ("f", "")])), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_pauses_between_chunks() {
        let provider = Arc::new(RecordingProvider::default());
        let writer = RateLimitedWriter::new(provider.clone(), settings());

        let start = tokio::time::Instant::now();
        writer.batch_write(&writes("app", 12)).await.unwrap();

        // Three chunks (5, 5, 2) means two pauses
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "elapsed {elapsed:?}");
        assert_eq!(provider.calls().len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_stops_at_first_failure() {
        let provider = Arc::new(RecordingProvider {
            fail_with: Some("connection refused".to_string()),
            ..Default::default()
        });
        let writer = RateLimitedWriter::new(provider.clone(), settings());

        let err = writer.batch_write(&writes("app", 7)).await.unwrap_err();
        assert_eq!(err.class(), StoreErrorClass::ConnectionFailed);
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_batches_do_not_interleave() {
        let provider = Arc::new(RecordingProvider {
            delay: Duration::from_millis(10),
            ..Default::default()
        });
        let writer = Arc::new(RateLimitedWriter::new(provider.clone(), settings()));

        let a = writes("a", 7);
        let b = writes("b", 7);
        let (ra, rb) = tokio::join!(writer.batch_write(&a), writer.batch_write(&b));
        ra.unwrap();
        rb.unwrap();

        let owners: Vec<bool> = provider
            .calls()
            .iter()
            .map(|(_, path, _)| path.starts_with("secret/data/a/"))
            .collect();
        assert_eq!(owners.len(), 14);
        // All of one batch, then all of the other
        let switches = owners.windows(2).filter(|w| w[0] != w[1]).count();
        assert_eq!(switches, 1);
    }
}
