use super::{degraded_result, Provider, ProviderError};
use limiter::AdaptiveLimiter;
use models::{ClassifyHints, DocumentMetadata};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Attempts per provider beyond the first.
    pub retries_per_provider: u32,
    pub base_delay: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            retries_per_provider: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("classification was cancelled")]
    Cancelled,
    #[error("every configured provider failed; last error: {0}")]
    AllProvidersFailed(String),
}

/// Tries configured providers in order until one produces a valid result.
/// Each call is gated by the shared adaptive limiter, whose window feeds on
/// the observed outcome and latency.
pub struct FallbackChain {
    providers: Vec<Arc<dyn Provider>>,
    limiter: Arc<AdaptiveLimiter>,
    config: ChainConfig,
}

impl FallbackChain {
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        limiter: Arc<AdaptiveLimiter>,
        config: ChainConfig,
    ) -> Self {
        Self {
            providers,
            limiter,
            config,
        }
    }

    pub fn limiter(&self) -> &Arc<AdaptiveLimiter> {
        &self.limiter
    }

    /// The union of categories any configured provider can assign.
    pub fn supported_categories(&self) -> Vec<&'static str> {
        let mut categories: Vec<&'static str> = self
            .providers
            .iter()
            .filter(|p| p.is_configured())
            .flat_map(|p| p.supported_categories().iter().copied())
            .collect();
        categories.sort_unstable();
        categories.dedup();
        categories
    }

    #[tracing::instrument(skip_all, fields(document = %document_name))]
    pub async fn classify(
        &self,
        document_name: &str,
        text: &str,
        hints: &ClassifyHints,
        cancel: &CancellationToken,
    ) -> Result<DocumentMetadata, ClassifyError> {
        // Nothing to classify: synthesize the low-confidence default without
        // spending a provider call.
        if text.trim().is_empty() {
            tracing::debug!("empty text; returning synthetic classification");
            return Ok(degraded_result(document_name, hints));
        }

        let mut last_error = "no provider configured".to_string();

        for provider in &self.providers {
            if !provider.is_configured() {
                tracing::debug!(provider = provider.name(), "skipping unconfigured provider");
                continue;
            }

            for attempt in 0..=self.config.retries_per_provider {
                if attempt > 0 {
                    let delay = self.config.base_delay * 2u32.pow(attempt - 1);
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => return Err(ClassifyError::Cancelled),
                    }
                }

                if self.limiter.wait(cancel).await.is_err() {
                    return Err(ClassifyError::Cancelled);
                }

                let started = Instant::now();
                match provider.classify(text, hints).await {
                    Ok(mut result) => {
                        self.limiter.record_success(started.elapsed());

                        result.document_name = document_name.to_string();
                        result.ai_classified = true;
                        result.processed_at = Some(chrono::Utc::now());

                        if let Err(err) = result.validate() {
                            tracing::warn!(
                                provider = provider.name(),
                                error = %err,
                                "provider produced an invalid classification"
                            );
                            last_error = err.to_string();
                            break; // invalid output won't improve on retry
                        }

                        tracing::debug!(
                            provider = provider.name(),
                            doc_type = %result.document_type,
                            confidence = result.confidence,
                            "classification succeeded"
                        );
                        return Ok(result);
                    }
                    Err(err) => {
                        self.limiter.record_error(started.elapsed());
                        tracing::warn!(
                            provider = provider.name(),
                            attempt = attempt,
                            error = %err,
                            "provider call failed"
                        );
                        last_error = err.to_string();
                        if !err.is_transient() {
                            break;
                        }
                    }
                }
            }
        }

        Err(ClassifyError::AllProvidersFailed(last_error))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::RuleBasedProvider;
    use limiter::AdaptiveConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_limiter() -> Arc<AdaptiveLimiter> {
        Arc::new(AdaptiveLimiter::new(AdaptiveConfig {
            base_rate: 1_000.0,
            min_rate: 1.0,
            max_rate: 1_000.0,
            burst: 1_000,
            ..AdaptiveConfig::default()
        }))
    }

    fn fast_chain(providers: Vec<Arc<dyn Provider>>) -> FallbackChain {
        FallbackChain::new(
            providers,
            test_limiter(),
            ChainConfig {
                retries_per_provider: 2,
                base_delay: Duration::from_millis(1),
            },
        )
    }

    /// Fails a scripted number of times, then permanently errors or defers
    /// to being broken forever.
    struct FlakyProvider {
        calls: AtomicU32,
        configured: bool,
        transient: bool,
    }

    #[async_trait::async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn is_configured(&self) -> bool {
            self.configured
        }
        async fn classify(
            &self,
            _text: &str,
            _hints: &ClassifyHints,
        ) -> Result<DocumentMetadata, ProviderError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.transient {
                Err(ProviderError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                })
            } else {
                Err(ProviderError::Api {
                    status: 401,
                    message: "bad key".to_string(),
                })
            }
        }
    }

    #[tokio::test]
    async fn empty_text_short_circuits_to_the_degraded_default() {
        let chain = fast_chain(vec![Arc::new(RuleBasedProvider)]);
        let result = chain
            .classify("scan.pdf", "   ", &ClassifyHints::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.ai_classified);
        assert!(result.confidence < 0.2);
        assert_eq!(result.document_name, "scan.pdf");
    }

    #[tokio::test]
    async fn fallback_reaches_the_second_provider() {
        let flaky = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            configured: true,
            transient: true,
        });
        let chain = fast_chain(vec![flaky.clone(), Arc::new(RuleBasedProvider)]);

        let result = chain
            .classify(
                "motion.pdf",
                "The defendant moves this Court to suppress evidence.",
                &ClassifyHints::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        // Three attempts against the flaky provider, then the rules provider.
        assert_eq!(flaky.calls.load(Ordering::Relaxed), 3);
        assert!(result.ai_classified);
        assert!(result.processed_at.is_some());
        assert_eq!(result.document_name, "motion.pdf");
    }

    #[tokio::test]
    async fn permanent_errors_skip_the_retry_budget() {
        let broken = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            configured: true,
            transient: false,
        });
        let chain = fast_chain(vec![broken.clone()]);

        let err = chain
            .classify(
                "motion.pdf",
                "some text",
                &ClassifyHints::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(broken.calls.load(Ordering::Relaxed), 1);
        assert!(matches!(err, ClassifyError::AllProvidersFailed(_)));
    }

    #[tokio::test]
    async fn unconfigured_providers_are_skipped_silently() {
        let unconfigured = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            configured: false,
            transient: true,
        });
        let chain = fast_chain(vec![unconfigured.clone(), Arc::new(RuleBasedProvider)]);

        let result = chain
            .classify(
                "order.pdf",
                "IT IS SO ORDERED.",
                &ClassifyHints::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(unconfigured.calls.load(Ordering::Relaxed), 0);
        assert!(result.ai_classified);
    }

    #[tokio::test]
    async fn outcomes_feed_the_adaptive_limiter() {
        let flaky = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            configured: true,
            transient: true,
        });
        let chain = fast_chain(vec![flaky, Arc::new(RuleBasedProvider)]);

        let _ = chain
            .classify(
                "motion.pdf",
                "motion to dismiss",
                &ClassifyHints::default(),
                &CancellationToken::new(),
            )
            .await;

        let snapshot = chain.limiter().snapshot();
        assert_eq!(snapshot.window_errors, 3);
        assert_eq!(snapshot.window_successes, 1);
    }
}
