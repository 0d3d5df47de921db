//! Retry wrapper for provider calls
//!
//! Provider errors are classified as transient or fatal. Transient errors
//! are retried on a fixed arithmetic schedule; fatal errors surface on the
//! first attempt.

use crate::adapter::{ProviderResult, ResourceAdapter};
use crate::error::ProviderError;
use crate::resource::{Description, ResourceJob};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Error codes that are always worth another attempt
pub const DEFAULT_TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "LimitExceededException",
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "ConflictException",
];

/// Message fragments known to indicate a transient condition.
///
/// Matched as substrings of the rendered error. This list is a compatibility
/// surface: entries are matched verbatim against provider messages.
pub const DEFAULT_TRANSIENT_SIGNATURES: &[&str] = &[
    "ThrottlingException",
    "LimitExceededException",
    "ProvisionedThroughputExceededException",
    "TooManyRequestsException",
    "ConflictException",
    "An error occurred (InvalidParameterValueException) when calling the CreateEventSourceMapping operation",
    "An error occurred (InvalidParameterValueException) when calling the UpdateEventSourceMapping operation",
    "An error occurred (InvalidParameterValueException) when calling the CreateCluster operation",
    "An error occurred (SubnetGroupInUseFault) when calling the DeleteSubnetGroup operation",
    "The role defined for the function cannot be assumed by Lambda",
    "An error occurred (ResourceConflictException) when calling the AddPermission operation: The statement id",
    "NoSuchUpload",
    "Throttling",
    "Please add Lambda as a Trusted Entity",
    "UpdateFunctionConfiguration",
    "PutScalingPolicy",
    "RegisterScalableTarget",
    "TopicArn can not be None",
    "DeleteRole",
    "Max attempts exceeded",
    "UpdateGatewayResponse",
    "Cannot delete, found existing JobQueue relationship",
    "Cannot delete, resource is being modified",
];

/// Classification table for provider errors
#[derive(Debug, Clone, PartialEq)]
pub struct TransientSignatures {
    pub codes: Vec<String>,
    pub messages: Vec<String>,
}

impl Default for TransientSignatures {
    fn default() -> Self {
        Self {
            codes: DEFAULT_TRANSIENT_CODES.iter().map(|s| s.to_string()).collect(),
            messages: DEFAULT_TRANSIENT_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl TransientSignatures {
    pub fn new(codes: Vec<String>, messages: Vec<String>) -> Self {
        Self { codes, messages }
    }

    /// Add a message signature on top of the current table.
    pub fn with_message(mut self, signature: impl Into<String>) -> Self {
        self.messages.push(signature.into());
        self
    }

    /// Structured code first, then message substrings.
    ///
    /// Only service errors are ever transient; validation and exhaustion
    /// errors are final.
    pub fn is_transient(&self, error: &ProviderError) -> bool {
        if !matches!(error, ProviderError::Service { .. }) {
            return false;
        }
        if error
            .code()
            .is_some_and(|code| self.codes.iter().any(|c| c == code))
        {
            return true;
        }
        let text = error.to_string();
        self.messages.iter().any(|sig| text.contains(sig.as_str()))
    }
}

/// Fixed backoff schedule plus the classification table it retries on
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// First delay, in units
    pub start: u32,
    /// Added to the delay after every retry, in units
    pub step: u32,
    /// Number of retries after the first attempt
    pub count: u32,
    pub unit: Duration,
    pub signatures: Arc<TransientSignatures>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            start: 1,
            step: 3,
            count: 3,
            unit: Duration::from_secs(1),
            signatures: Arc::new(TransientSignatures::default()),
        }
    }
}

impl RetryPolicy {
    pub fn new(start: u32, step: u32, count: u32, unit: Duration) -> Self {
        Self {
            start,
            step,
            count,
            unit,
            ..Self::default()
        }
    }

    pub fn with_signatures(mut self, signatures: TransientSignatures) -> Self {
        self.signatures = Arc::new(signatures);
        self
    }

    /// Policy that never waits or retries
    pub fn none() -> Self {
        Self::new(0, 0, 0, Duration::ZERO)
    }

    /// Delays between attempts: `start, start + step, ...`, `count` entries
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.count)
            .map(|i| {
                let units = self.start.saturating_add(self.step.saturating_mul(i));
                self.unit.saturating_mul(units)
            })
            .collect()
    }

    /// Maximum number of attempts the schedule allows
    pub fn max_attempts(&self) -> u32 {
        self.count + 1
    }

    /// Run `call` until it succeeds, fails fatally or the schedule runs out.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let delays = self.delays();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.signatures.is_transient(&err) {
                return Err(err);
            }

            let Some(delay) = delays.get(attempt as usize - 1).copied() else {
                tracing::warn!(
                    "Maximum retries reached for {} after {} attempts",
                    operation,
                    attempt
                );
                return Err(ProviderError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            };

            tracing::warn!(
                "Retrying {} in {:?} (attempt {}/{})",
                operation,
                delay,
                attempt + 1,
                self.max_attempts()
            );
            tracing::debug!("{} failed with transient error: {}", operation, err);
            tokio::time::sleep(delay).await;
        }
    }
}

/// Adapter decorator running every call through a [`RetryPolicy`]
pub struct RetryingAdapter<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A: ResourceAdapter> RetryingAdapter<A> {
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: ResourceAdapter> ResourceAdapter for RetryingAdapter<A> {
    async fn create(&self, job: &ResourceJob) -> ProviderResult<Description> {
        let op = format!("create {}", job.key());
        self.policy.run(&op, || self.inner.create(job)).await
    }

    async fn remove(&self, job: &ResourceJob) -> ProviderResult<()> {
        let op = format!("remove {}", job.key());
        self.policy.run(&op, || self.inner.remove(job)).await
    }

    fn supports_update(&self) -> bool {
        self.inner.supports_update()
    }

    async fn update(&self, job: &ResourceJob) -> ProviderResult<Description> {
        let op = format!("update {}", job.key());
        self.policy.run(&op, || self.inner.update(job)).await
    }

    async fn identify(&self, job: &ResourceJob) -> ProviderResult<Option<String>> {
        let op = format!("identify {}", job.key());
        self.policy.run(&op, || self.inner.identify(job)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn throttled() -> ProviderError {
        ProviderError::service("CreateFunction", "ThrottlingException", "Rate exceeded")
    }

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delays(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(4),
                Duration::from_secs(7)
            ]
        );
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn test_classification() {
        let table = TransientSignatures::default();
        assert!(table.is_transient(&throttled()));
        assert!(table.is_transient(&ProviderError::untyped(
            "DeleteRole",
            "Cannot delete, resource is being modified"
        )));
        assert!(table.is_transient(&ProviderError::service(
            "CreateEventSourceMapping",
            "InvalidParameterValueException",
            "Cannot access stream"
        )));
        assert!(!table.is_transient(&ProviderError::service(
            "CreateQueue",
            "InvalidParameterValue",
            "bad attribute"
        )));
        assert!(!table.is_transient(&ProviderError::MissingParameters {
            name: "Throttling".into(),
            missing: vec![]
        }));
    }

    #[test]
    fn test_injected_signatures() {
        let table = TransientSignatures::new(vec![], vec![]).with_message("try again later");
        assert!(!table.is_transient(&throttled()));
        assert!(table.is_transient(&ProviderError::untyped("PutItem", "please try again later")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retries_four_times() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: ProviderResult<()> = policy
            .run("create lambda:fn:eu-west-1", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(throttled()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(12), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(13), "elapsed {:?}", elapsed);
        match result {
            Err(ProviderError::RetriesExhausted {
                attempts, source, ..
            }) => {
                assert_eq!(attempts, 4);
                assert_eq!(*source, throttled());
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let fatal = ProviderError::service("CreateRole", "MalformedPolicyDocument", "bad json");

        let result: ProviderResult<()> = policy
            .run("create iam_role:r:eu-west-1", || {
                calls.fetch_add(1, Ordering::SeqCst);
                let err = fatal.clone();
                async move { Err(err) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err(), fatal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let policy = RetryPolicy::new(1, 3, 3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = policy
            .run("create sqs_queue:q:eu-west-1", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(throttled())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
