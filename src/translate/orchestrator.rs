// Failover and retry over the backend priority list
//
// One call walks `api_priority` strictly in order:
// - blocked output moves on to the next backend after a short pause
// - rate limits retry the same backend with exponential backoff
// - other failures retry the same backend until the failure budget is spent

use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, BackendHandle, BackendRegistry, GenerationRequest, SamplingParams};
use crate::config::RetryConfig;
use crate::error::{HonyakuError, Result};

/// Phrases providers emit instead of a translation when their own audit refuses the content.
pub const CENSORSHIP_PHRASES: [&str; 2] = ["我无法给到相关内容", "这个问题我暂时无法回答"];

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Generic failures tolerated per call, counting the final one
    pub max_attempts: u32,
    pub block_backoff: Duration,
    pub transient_backoff: Duration,
    /// Rate-limit wait at index `i` is `2^i` times this
    pub rate_limit_base: Duration,
    pub max_rate_limit_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        let backoff = Duration::from_secs(config.backoff_secs);
        Self {
            max_attempts: config.max_attempts.max(1),
            block_backoff: backoff,
            transient_backoff: backoff,
            rate_limit_base: backoff,
            max_rate_limit_retries: config.max_rate_limit_retries,
        }
    }

    fn rate_limit_backoff(&self, index: usize) -> Duration {
        let factor = u32::try_from(index)
            .ok()
            .and_then(|i| 1u32.checked_shl(i))
            .unwrap_or(u32::MAX);
        self.rate_limit_base.saturating_mul(factor)
    }
}

/// Result of a single backend attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(String),
    ContentBlocked,
    RecoverableError(BackendError),
    FatalError(BackendError),
}

impl AttemptOutcome {
    fn from_error(error: BackendError) -> Self {
        match error {
            BackendError::ContentRejected(_) => Self::ContentBlocked,
            e if e.is_certificate_failure() => Self::FatalError(e),
            e => Self::RecoverableError(e),
        }
    }
}

/// Terminal value of a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Translated(String),
    /// Every reachable backend refused the content
    Withheld,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
    pub params: SamplingParams,
}

pub struct Orchestrator<'a> {
    registry: &'a BackendRegistry,
    policy: RetryPolicy,
}

impl<'a> Orchestrator<'a> {
    pub fn new(registry: &'a BackendRegistry, policy: RetryPolicy) -> Self {
        Self { registry, policy }
    }

    pub async fn generate(&self, priority: &[String], prompt: &ChatPrompt) -> Result<Generation> {
        let mut index = 0;
        let mut failures = 0u32;
        let mut rate_limit_retries = 0u32;
        let mut blocked_any = false;

        while index < priority.len() {
            let id = &priority[index];
            let is_last = index + 1 == priority.len();

            let Some(handle) = self.registry.get(id) else {
                warn!("│ Backend '{}' is not configured, skipping", id);
                index += 1;
                continue;
            };

            match self.attempt(handle, prompt).await {
                AttemptOutcome::Success(text) => {
                    info!("│ Backend: {} ({})", handle.id, handle.model);
                    return Ok(Generation::Translated(text));
                }
                AttemptOutcome::ContentBlocked => {
                    blocked_any = true;
                    if is_last {
                        warn!("│ Output blocked by '{}', no backend left", id);
                        return Ok(Generation::Withheld);
                    }
                    warn!("│ Output blocked by '{}', switching to next backend", id);
                    tokio::time::sleep(self.policy.block_backoff).await;
                    index += 1;
                }
                AttemptOutcome::RecoverableError(error @ BackendError::RateLimited(_)) => {
                    if rate_limit_retries >= self.policy.max_rate_limit_retries {
                        return Err(HonyakuError::RateLimitExhausted {
                            retries: rate_limit_retries,
                            last: error,
                        });
                    }
                    rate_limit_retries += 1;
                    let wait = self.policy.rate_limit_backoff(index);
                    warn!("│ Rate limited by '{}', retrying in {:?}", id, wait);
                    tokio::time::sleep(wait).await;
                }
                AttemptOutcome::RecoverableError(error) => {
                    failures += 1;
                    if failures >= self.policy.max_attempts {
                        return Err(HonyakuError::RetriesExhausted {
                            attempts: failures,
                            last: error,
                        });
                    }
                    warn!(
                        "│ Attempt {} on '{}' failed: {}",
                        failures, id, error
                    );
                    tokio::time::sleep(self.policy.transient_backoff).await;
                }
                AttemptOutcome::FatalError(error) => {
                    return Err(HonyakuError::CertificateCheck(error.to_string()));
                }
            }
        }

        if blocked_any {
            Ok(Generation::Withheld)
        } else {
            Err(HonyakuError::NoBackendAvailable(format!(
                "none of {:?} is configured",
                priority
            )))
        }
    }

    /// Run one backend to completion. The stream is always drained so the
    /// connection is released even once the output is known to be blocked.
    async fn attempt(&self, handle: &BackendHandle, prompt: &ChatPrompt) -> AttemptOutcome {
        let request = GenerationRequest {
            model: handle.model.clone(),
            system_prompt: prompt.system.clone(),
            user_text: prompt.user.clone(),
            params: prompt.params,
        };

        let mut stream = match handle.client.stream_generate(&request).await {
            Ok(stream) => stream,
            Err(e) => return AttemptOutcome::from_error(e),
        };

        let mut text = String::new();
        let mut blocked = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    debug!("Fragment from {}: {}", handle.id, fragment);
                    text.push_str(&fragment);
                    if !blocked && is_censored(&text) {
                        blocked = true;
                    }
                }
                Err(_) if blocked => return AttemptOutcome::ContentBlocked,
                Err(e) => return AttemptOutcome::from_error(e),
            }
        }

        if blocked {
            AttemptOutcome::ContentBlocked
        } else if text.trim().is_empty() {
            AttemptOutcome::RecoverableError(BackendError::EmptyResponse)
        } else {
            AttemptOutcome::Success(text)
        }
    }
}

fn is_censored(text: &str) -> bool {
    CENSORSHIP_PHRASES.iter().any(|phrase| text.contains(phrase))
}
