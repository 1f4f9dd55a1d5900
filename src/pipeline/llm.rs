//! Generation client: one chunk prompt in, generated content out.
//!
//! Wraps a [`GenerationService`] with the retry policy. The loop is driven by
//! matching on [`ServiceError`]; nothing here panics or propagates a service
//! failure past [`GenerationClient::generate`].
//!
//! ## Retry Strategy
//!
//! * Transport / server / malformed-response failures wait
//!   `retry_backoff_ms * 2^(attempt-1)`: 1 s → 2 s with the defaults.
//! * A rate-limit response waits the fixed `rate_limit_cooldown_secs` instead.
//!   It still counts as one of the `max_attempts` calls.
//! * No wait follows the final attempt.

use crate::config::PipelineConfig;
use crate::error::{GenerationError, ServiceError};
use crate::pipeline::service::{GenerationResponse, GenerationService};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, warn};

/// Successful generation for one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub content: String,
    /// Calls made, including the successful one.
    pub attempts: u32,
    pub prompt_tokens: usize,
    pub output_tokens: usize,
}

/// Retrying client over a shared [`GenerationService`].
pub struct GenerationClient {
    service: Arc<dyn GenerationService>,
    max_attempts: u32,
    backoff_base: Duration,
    rate_limit_cooldown: Duration,
    call_timeout: Duration,
}

impl GenerationClient {
    pub fn new(service: Arc<dyn GenerationService>, config: &PipelineConfig) -> Self {
        Self {
            service,
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base(),
            rate_limit_cooldown: config.rate_limit_cooldown(),
            call_timeout: config.api_timeout(),
        }
    }

    /// Override the per-call timeout with sub-second precision.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Generate content for `prompt`, retrying per the policy above.
    pub async fn generate(&self, prompt: &str) -> Result<Generation, GenerationError> {
        let service = self.service.name();
        let mut last_err: Option<ServiceError> = None;

        for attempt in 1..=self.max_attempts {
            info!(service, attempt, max = self.max_attempts, "Generation attempt");

            let outcome = match timeout(self.call_timeout, self.service.generate(prompt)).await {
                Ok(result) => result.and_then(validate),
                Err(_) => Err(ServiceError::Transport(format!(
                    "call timed out after {}ms",
                    self.call_timeout.as_millis()
                ))),
            };

            match outcome {
                Ok((content, prompt_tokens, output_tokens)) => {
                    info!(
                        service,
                        attempt,
                        chars = content.len(),
                        "Generation succeeded"
                    );
                    return Ok(Generation {
                        content,
                        attempts: attempt,
                        prompt_tokens,
                        output_tokens,
                    });
                }
                Err(e) => {
                    let wait = match &e {
                        ServiceError::RateLimited { retry_after_secs } => {
                            warn!(
                                service,
                                attempt,
                                retry_after_secs = ?retry_after_secs,
                                "Rate limited; cooling down for {}s",
                                self.rate_limit_cooldown.as_secs()
                            );
                            self.rate_limit_cooldown
                        }
                        ServiceError::Transport(_) | ServiceError::Malformed(_) => {
                            let backoff = self.backoff_for(attempt);
                            warn!(
                                service,
                                attempt,
                                "Attempt failed: {e}; backing off {}ms",
                                backoff.as_millis()
                            );
                            backoff
                        }
                    };
                    last_err = Some(e);
                    if attempt < self.max_attempts {
                        sleep(wait).await;
                    }
                }
            }
        }

        let err = exhausted(last_err, self.max_attempts);
        error!(service, attempts = self.max_attempts, "Generation gave up: {err}");
        Err(err)
    }

    /// `base * 2^(attempt-1)`, saturating.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(factor)
    }
}

/// A usable response has at least one candidate and that candidate has text.
fn validate(response: GenerationResponse) -> Result<(String, usize, usize), ServiceError> {
    let GenerationResponse {
        candidates,
        prompt_tokens,
        output_tokens,
    } = response;

    let first = candidates
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::Malformed("response has no candidates".into()))?;
    let text = first
        .text
        .ok_or_else(|| ServiceError::Malformed("candidate has no text content".into()))?;

    debug!(prompt_tokens, output_tokens, "Validated response");
    Ok((text, prompt_tokens, output_tokens))
}

fn exhausted(last_err: Option<ServiceError>, attempts: u32) -> GenerationError {
    match last_err {
        Some(ServiceError::RateLimited { .. }) => GenerationError::RateLimited { attempts },
        Some(ServiceError::Malformed(detail)) => GenerationError::Malformed { attempts, detail },
        Some(ServiceError::Transport(detail)) => GenerationError::Exhausted { attempts, detail },
        None => GenerationError::Exhausted {
            attempts,
            detail: "no attempt was made".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::service::Candidate;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    /// Replays a script of outcomes; once the script is empty, repeats the last one.
    struct ScriptedService {
        script: Mutex<VecDeque<Result<GenerationResponse, ServiceError>>>,
        last: Mutex<Option<Result<GenerationResponse, ServiceError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedService {
        fn new(script: Vec<Result<GenerationResponse, ServiceError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationService for ScriptedService {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _prompt: &str) -> Result<GenerationResponse, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            match next {
                Some(outcome) => {
                    *last = Some(outcome.clone());
                    outcome
                }
                None => last
                    .clone()
                    .unwrap_or_else(|| Err(ServiceError::Transport("empty script".into()))),
            }
        }
    }

    struct SlowService;

    #[async_trait]
    impl GenerationService for SlowService {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _prompt: &str) -> Result<GenerationResponse, ServiceError> {
            sleep(Duration::from_secs(5)).await;
            Ok(GenerationResponse::text("too late"))
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig::builder()
            .retry_backoff_ms(0)
            .rate_limit_cooldown_secs(0)
            .build()
            .unwrap()
    }

    fn transport() -> Result<GenerationResponse, ServiceError> {
        Err(ServiceError::Transport("503 Service Unavailable".into()))
    }

    #[tokio::test]
    async fn succeeds_after_k_failures_with_k_plus_one_calls() {
        for k in 0..3usize {
            let mut script: Vec<_> = (0..k).map(|_| transport()).collect();
            script.push(Ok(GenerationResponse::text("<p>ok</p>")));
            let svc = ScriptedService::new(script);
            let client = GenerationClient::new(svc.clone(), &fast_config());

            let generation = client.generate("prompt").await.unwrap();
            assert_eq!(generation.content, "<p>ok</p>");
            assert_eq!(generation.attempts as usize, k + 1);
            assert_eq!(svc.calls(), k + 1, "k = {k}");
        }
    }

    #[tokio::test]
    async fn always_failing_makes_exactly_max_attempts_calls() {
        let svc = ScriptedService::new(vec![transport()]);
        let client = GenerationClient::new(svc.clone(), &fast_config());

        let err = client.generate("prompt").await.unwrap_err();
        assert_eq!(svc.calls(), 3);
        assert!(matches!(err, GenerationError::Exhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn rate_limit_does_not_add_attempts() {
        let svc = ScriptedService::new(vec![Err(ServiceError::RateLimited {
            retry_after_secs: Some(1),
        })]);
        let client = GenerationClient::new(svc.clone(), &fast_config());

        let err = client.generate("prompt").await.unwrap_err();
        assert_eq!(svc.calls(), 3);
        assert_eq!(err, GenerationError::RateLimited { attempts: 3 });
    }

    #[tokio::test]
    async fn rate_limit_then_success() {
        let svc = ScriptedService::new(vec![
            Err(ServiceError::RateLimited {
                retry_after_secs: None,
            }),
            Ok(GenerationResponse::text("fine")),
        ]);
        let client = GenerationClient::new(svc.clone(), &fast_config());
        assert_eq!(client.generate("p").await.unwrap().content, "fine");
        assert_eq!(svc.calls(), 2);
    }

    #[tokio::test]
    async fn rate_limit_waits_the_cooldown_not_the_backoff() {
        let svc = ScriptedService::new(vec![
            Err(ServiceError::RateLimited {
                retry_after_secs: None,
            }),
            Ok(GenerationResponse::text("fine")),
        ]);
        let config = PipelineConfig::builder()
            .retry_backoff_ms(60_000)
            .rate_limit_cooldown_secs(1)
            .build()
            .unwrap();
        let client = GenerationClient::new(svc.clone(), &config);

        let start = Instant::now();
        assert_eq!(client.generate("p").await.unwrap().content, "fine");
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_secs(10), "waited {elapsed:?}");
    }

    #[tokio::test]
    async fn transport_failure_waits_the_backoff_not_the_cooldown() {
        let svc = ScriptedService::new(vec![transport(), Ok(GenerationResponse::text("fine"))]);
        let config = PipelineConfig::builder()
            .retry_backoff_ms(50)
            .rate_limit_cooldown_secs(60)
            .build()
            .unwrap();
        let client = GenerationClient::new(svc.clone(), &config);

        let start = Instant::now();
        assert_eq!(client.generate("p").await.unwrap().content, "fine");
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_secs(10), "waited {elapsed:?}");
    }

    #[tokio::test]
    async fn missing_candidates_are_retried_as_malformed() {
        let svc = ScriptedService::new(vec![
            Ok(GenerationResponse::default()),
            Ok(GenerationResponse {
                candidates: vec![Candidate { text: None }],
                ..Default::default()
            }),
            Ok(GenerationResponse::text("third time")),
        ]);
        let client = GenerationClient::new(svc.clone(), &fast_config());
        assert_eq!(client.generate("p").await.unwrap().content, "third time");
        assert_eq!(svc.calls(), 3);
    }

    #[tokio::test]
    async fn persistent_malformed_reports_malformed() {
        let svc = ScriptedService::new(vec![Ok(GenerationResponse::default())]);
        let client = GenerationClient::new(svc.clone(), &fast_config());
        let err = client.generate("p").await.unwrap_err();
        assert!(matches!(err, GenerationError::Malformed { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn empty_text_is_a_successful_response() {
        let svc = ScriptedService::new(vec![Ok(GenerationResponse::text(""))]);
        let client = GenerationClient::new(svc.clone(), &fast_config());
        assert_eq!(client.generate("p").await.unwrap().content, "");
        assert_eq!(svc.calls(), 1);
    }

    #[tokio::test]
    async fn call_timeout_counts_as_transport_failure() {
        let client = GenerationClient::new(Arc::new(SlowService), &fast_config())
            .with_call_timeout(Duration::from_millis(20));
        let err = client.generate("p").await.unwrap_err();
        match err {
            GenerationError::Exhausted { attempts, detail } => {
                assert_eq!(attempts, 3);
                assert!(detail.contains("timed out"), "got: {detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn backoff_grows_exponentially() {
        let config = PipelineConfig::builder()
            .retry_backoff_ms(20)
            .rate_limit_cooldown_secs(0)
            .build()
            .unwrap();
        let svc = ScriptedService::new(vec![transport()]);
        let client = GenerationClient::new(svc, &config);

        assert_eq!(client.backoff_for(1), Duration::from_millis(20));
        assert_eq!(client.backoff_for(2), Duration::from_millis(40));
        assert_eq!(client.backoff_for(3), Duration::from_millis(80));

        let start = Instant::now();
        let _ = client.generate("p").await;
        // 20ms + 40ms between the three attempts.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(60), "elapsed {elapsed:?}");
    }
}
