// Fallback Chain
// Tries providers one after another until one succeeds. Never concurrent:
// a provider starts only after the previous one has failed.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::models::{MediaInput, MediaKind, ProviderScore};
use crate::services::providers::{DetectionProvider, ProviderError};

/// One failed provider call
#[derive(Debug)]
pub struct ProviderAttempt {
    pub provider: String,
    pub error: ProviderError,
}

/// Every provider in the chain failed (or there were none)
#[derive(Debug)]
pub struct ChainFailure {
    pub kind: MediaKind,
    /// Failures in call order
    pub attempts: Vec<ProviderAttempt>,
}

impl ChainFailure {
    /// Reason of the last failure, which is what callers surface
    pub fn last_reason(&self) -> String {
        match self.attempts.last() {
            Some(attempt) => format!("{}: {}", attempt.provider, attempt.error),
            None => "no providers configured".to_string(),
        }
    }
}

impl fmt::Display for ChainFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} providers exhausted after {} attempt(s): {}",
            self.kind.as_str(),
            self.attempts.len(),
            self.last_reason()
        )
    }
}

pub struct FallbackChain {
    kind: MediaKind,
    providers: Vec<Arc<dyn DetectionProvider>>,
}

impl FallbackChain {
    pub fn new(kind: MediaKind, providers: Vec<Arc<dyn DetectionProvider>>) -> Self {
        Self { kind, providers }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Run providers in order; the first success wins.
    pub async fn run(&self, input: MediaInput<'_>) -> Result<ProviderScore, ChainFailure> {
        let mut attempts = Vec::new();

        for (idx, provider) in self.providers.iter().enumerate() {
            let started = Instant::now();
            let limit = provider.timeout();
            let result = match tokio::time::timeout(limit, provider.detect(input)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(limit)),
            };

            match result {
                Ok(score) => {
                    info!(
                        kind = self.kind.as_str(),
                        provider = provider.name(),
                        position = idx + 1,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "[FALLBACK] provider succeeded"
                    );
                    return Ok(score);
                }
                Err(error) => {
                    warn!(
                        kind = self.kind.as_str(),
                        provider = provider.name(),
                        position = idx + 1,
                        category = error.category(),
                        "[FALLBACK] provider failed: {}",
                        error
                    );
                    attempts.push(ProviderAttempt {
                        provider: provider.name().to_string(),
                        error,
                    });
                }
            }
        }

        Err(ChainFailure {
            kind: self.kind,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct StubProvider {
        name: &'static str,
        probability: Option<f64>,
        delay: Option<Duration>,
        calls: AtomicU32,
    }

    impl StubProvider {
        fn ok(name: &'static str, probability: f64) -> Arc<Self> {
            Arc::new(Self { name, probability: Some(probability), delay: None, calls: AtomicU32::new(0) })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self { name, probability: None, delay: None, calls: AtomicU32::new(0) })
        }

        fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self { name, probability: Some(0.9), delay: Some(delay), calls: AtomicU32::new(0) })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn chain(providers: &[&Arc<StubProvider>]) -> FallbackChain {
        let providers = providers
            .iter()
            .map(|p| Arc::clone(*p) as Arc<dyn DetectionProvider>)
            .collect();
        FallbackChain::new(MediaKind::Image, providers)
    }

    #[async_trait]
    impl DetectionProvider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(15)
        }

        async fn detect(&self, _input: MediaInput<'_>) -> Result<ProviderScore, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.probability {
                Some(p) => Ok(ProviderScore {
                    provider: self.name.to_string(),
                    probability: p,
                    confidence: None,
                    reason: None,
                }),
                None => Err(ProviderError::Api { status: 503, message: "unavailable".to_string() }),
            }
        }
    }

    #[tokio::test]
    async fn test_first_success_skips_rest() {
        let a = StubProvider::ok("A", 0.9);
        let b = StubProvider::ok("B", 0.1);
        let chain = chain(&[&a, &b]);

        let score = chain.run(MediaInput::Image(b"img")).await.unwrap();
        assert_eq!(score.provider, "A");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_through_to_second() {
        let a = StubProvider::failing("A");
        let b = StubProvider::ok("B", 0.2);
        let chain = chain(&[&a, &b]);

        let score = chain.run(MediaInput::Image(b"img")).await.unwrap();
        assert_eq!(score.provider, "B");
        assert_eq!(score.probability, 0.2);
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_all_attempts() {
        let (a, b) = (StubProvider::failing("A"), StubProvider::failing("B"));
        let chain = chain(&[&a, &b]);
        let failure = chain.run(MediaInput::Image(b"img")).await.unwrap_err();
        assert_eq!(failure.attempts.len(), 2);
        assert_eq!(failure.attempts[0].provider, "A");
        assert_eq!(failure.last_reason(), "B: HTTP 503: unavailable");
    }

    #[tokio::test]
    async fn test_empty_chain_fails() {
        let chain = FallbackChain::new(MediaKind::Text, Vec::new());
        let failure = chain.run(MediaInput::Text("hello there")).await.unwrap_err();
        assert!(failure.attempts.is_empty());
        assert_eq!(failure.last_reason(), "no providers configured");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_failure() {
        let a = StubProvider::slow("A", Duration::from_secs(60));
        let b = StubProvider::ok("B", 0.3);
        let chain = chain(&[&a, &b]);

        let score = chain.run(MediaInput::Image(b"img")).await.unwrap();
        assert_eq!(score.provider, "B");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[test]
    fn test_provider_names_keep_order() {
        let (a, b) = (StubProvider::ok("A", 0.5), StubProvider::ok("B", 0.5));
        let chain = chain(&[&a, &b]);
        assert_eq!(chain.provider_names(), vec!["A", "B"]);
    }
}
