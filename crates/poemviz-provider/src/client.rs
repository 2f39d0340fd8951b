//! Generation client: one provider plus bounded retries.

use std::sync::Arc;
use std::time::Instant;

use poemviz_models::{Directive, FailureReason, GenerationFailure, ProviderKind};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::metrics::{record_request, record_retry};
use crate::provider::ImageProvider;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};

/// A successful provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub image_ref: String,
    pub provider: ProviderKind,
    pub attempts: u32,
}

/// Performs one logical generation request against a single provider.
///
/// Transient failures are retried with exponential backoff up to
/// `max_attempts`; terminal failures return immediately. Holds no shared
/// scheduler state.
///
/// An optional ceiling bounds in-flight attempts across every clone of the
/// client. A permit covers one attempt and is released before backing off.
#[derive(Clone)]
pub struct GenerationClient {
    provider: Arc<dyn ImageProvider>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    ceiling: Option<Arc<Semaphore>>,
}

impl GenerationClient {
    pub fn new(provider: Arc<dyn ImageProvider>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            policy,
            sleeper: Arc::new(TokioSleeper),
            ceiling: None,
        }
    }

    /// Allow at most `max_in_flight` concurrent attempts against the provider.
    pub fn with_ceiling(mut self, max_in_flight: usize) -> Self {
        self.ceiling = Some(Arc::new(Semaphore::new(max_in_flight.max(1))));
        self
    }

    /// Replace the backoff sleeper.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generate the image for segment `index`.
    pub async fn generate(
        &self,
        index: usize,
        directive: &Directive,
    ) -> Result<GeneratedImage, GenerationFailure> {
        let kind = self.kind();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let permit = match &self.ceiling {
                Some(ceiling) => match Arc::clone(ceiling).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        return Err(GenerationFailure {
                            index,
                            provider: kind,
                            reason: FailureReason::Exhausted,
                            attempt_count: attempt - 1,
                            message: "Provider ceiling closed".to_string(),
                        })
                    }
                },
                None => None,
            };
            let started = Instant::now();

            let outcome = match tokio::time::timeout(
                self.policy.request_timeout,
                self.provider.generate_once(directive),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.policy.request_timeout)),
            };
            drop(permit);

            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            match outcome {
                Ok(image_ref) => {
                    record_request(kind, "success", latency_ms);
                    debug!(index, provider = %kind, attempt, "Image generated");
                    return Ok(GeneratedImage {
                        image_ref,
                        provider: kind,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    record_request(kind, "transient", latency_ms);
                    record_retry(kind);

                    // A server hint replaces the backoff but never exceeds the cap.
                    let delay = e
                        .retry_after()
                        .map(|hint| hint.min(self.policy.max_delay))
                        .unwrap_or_else(|| self.policy.delay_for_attempt(attempt));
                    warn!(
                        index,
                        provider = %kind,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Image request failed, retrying: {}",
                        e
                    );
                    self.sleeper.sleep(delay).await;
                }
                Err(e) => {
                    let outcome = if e.is_retryable() { "transient" } else { "terminal" };
                    record_request(kind, outcome, latency_ms);
                    warn!(
                        index,
                        provider = %kind,
                        attempt,
                        "Image request gave up: {}",
                        e
                    );
                    return Err(GenerationFailure {
                        index,
                        provider: kind,
                        reason: e.failure_reason(),
                        attempt_count: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use poemviz_models::{
        ContinuityContext, FailureReason, Mood, Motion, Scenery, StyleMode, StyleParameters,
    };

    use crate::error::ProviderResult;

    /// Returns scripted outcomes in order; the last one repeats.
    struct ScriptedProvider {
        script: Mutex<VecDeque<fn() -> ProviderResult<String>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<fn() -> ProviderResult<String>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ImageProvider for ScriptedProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        async fn generate_once(&self, _directive: &Directive) -> ProviderResult<String> {
            *self.calls.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                *script.front().unwrap()
            };
            next()
        }
    }

    struct HangingProvider;

    #[async_trait]
    impl ImageProvider for HangingProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Imagen
        }

        async fn generate_once(&self, _directive: &Directive) -> ProviderResult<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    fn directive() -> Directive {
        Directive {
            subject_text: "line".to_string(),
            style: StyleParameters {
                mood: Mood::Neutral,
                scenery: Scenery::Space,
                style_mode: StyleMode::Default,
                composition: "Wide".to_string(),
                motion: Motion::ZoomIn,
                continuity: ContinuityContext::OpeningScene,
            },
            constraints: Default::default(),
        }
    }

    fn rate_limited() -> ProviderResult<String> {
        Err(ProviderError::RateLimited {
            message: "slow down".into(),
            retry_after: None,
        })
    }

    fn server_error() -> ProviderResult<String> {
        Err(ProviderError::Server {
            status: 502,
            message: "bad gateway".into(),
        })
    }

    fn content_policy() -> ProviderResult<String> {
        Err(ProviderError::ContentPolicy("rejected".into()))
    }

    fn success() -> ProviderResult<String> {
        Ok("https://img.example/ok.png".to_string())
    }

    fn client(provider: Arc<dyn ImageProvider>, sleeper: Arc<RecordingSleeper>) -> GenerationClient {
        GenerationClient::new(provider, RetryPolicy::default()).with_sleeper(sleeper)
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let provider = Arc::new(ScriptedProvider::new(vec![rate_limited, server_error, success]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let image = client(provider.clone(), sleeper.clone())
            .generate(0, &directive())
            .await
            .unwrap();

        assert_eq!(image.attempts, 3);
        assert_eq!(provider.calls(), 3);
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn test_exhausted_after_max_attempts() {
        let provider = Arc::new(ScriptedProvider::new(vec![server_error]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let failure = client(provider.clone(), sleeper.clone())
            .generate(4, &directive())
            .await
            .unwrap_err();

        assert_eq!(failure.index, 4);
        assert_eq!(failure.reason, FailureReason::Exhausted);
        assert_eq!(failure.attempt_count, 3);
        assert_eq!(provider.calls(), 3);
        // No sleep after the final attempt
        assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_terminal_failure_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![content_policy, success]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let failure = client(provider.clone(), sleeper.clone())
            .generate(1, &directive())
            .await
            .unwrap_err();

        assert_eq!(failure.reason, FailureReason::ContentPolicy);
        assert_eq!(failure.attempt_count, 1);
        assert_eq!(provider.calls(), 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hung_attempt_times_out_as_transient() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = RetryPolicy::default()
            .with_max_attempts(2)
            .with_request_timeout(Duration::from_millis(20));
        let client = GenerationClient::new(Arc::new(HangingProvider), policy)
            .with_sleeper(sleeper.clone());

        let failure = client.generate(0, &directive()).await.unwrap_err();

        assert_eq!(failure.reason, FailureReason::Exhausted);
        assert_eq!(failure.attempt_count, 2);
        assert_eq!(failure.provider, ProviderKind::Imagen);
        assert_eq!(sleeper.delays.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_after_overrides_backoff() {
        fn limited_with_hint() -> ProviderResult<String> {
            Err(ProviderError::RateLimited {
                message: "wait".into(),
                retry_after: Some(Duration::from_secs(11)),
            })
        }

        fn limited_for_a_day() -> ProviderResult<String> {
            Err(ProviderError::RateLimited {
                message: "wait".into(),
                retry_after: Some(Duration::from_secs(86_400)),
            })
        }

        let provider = Arc::new(ScriptedProvider::new(vec![
            limited_with_hint,
            limited_for_a_day,
            success,
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());

        client(provider, sleeper.clone())
            .generate(0, &directive())
            .await
            .unwrap();

        // The second hint is capped at max_delay.
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_secs(11), Duration::from_secs(30)]
        );
    }

    #[tokio::test]
    async fn test_ceiling_released_while_backing_off() {
        /// Parks until released, so the test can observe the ceiling mid-backoff.
        #[derive(Default)]
        struct GateSleeper {
            entered: tokio::sync::Notify,
            release: tokio::sync::Notify,
        }

        #[async_trait]
        impl Sleeper for GateSleeper {
            async fn sleep(&self, _duration: Duration) {
                self.entered.notify_one();
                self.release.notified().await;
            }
        }

        let sleeper = Arc::new(GateSleeper::default());
        let limited = GenerationClient::new(
            Arc::new(ScriptedProvider::new(vec![rate_limited, success])),
            RetryPolicy::default(),
        )
        .with_sleeper(sleeper.clone())
        .with_ceiling(1);
        let other = limited.clone();

        let backing_off = tokio::spawn(async move { limited.generate(0, &directive()).await });
        sleeper.entered.notified().await;

        // The only permit is free while the first call sleeps.
        let image = tokio::time::timeout(Duration::from_secs(1), other.generate(1, &directive()))
            .await
            .expect("ceiling held during backoff")
            .unwrap();
        assert_eq!(image.attempts, 1);

        sleeper.release.notify_one();
        assert_eq!(backing_off.await.unwrap().unwrap().attempts, 2);
    }
}
