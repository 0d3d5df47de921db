//! Resource adapter contract
//!
//! Every provider implements [`ResourceAdapter`] once per resource kind.
//! Adapters must be idempotent: creating something that already exists
//! returns its description, removing something that is gone succeeds.
//! [`ensure_created`] and [`ensure_removed`] encode that contract so
//! providers only supply the raw describe/create/delete calls.

use crate::error::ProviderError;
use crate::resource::{Description, ResourceJob};
use async_trait::async_trait;
use std::future::Future;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Per-kind provider handler
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    /// Create the resource, or describe it if it already exists
    async fn create(&self, job: &ResourceJob) -> ProviderResult<Description>;

    /// Remove the resource. Removing a missing resource succeeds.
    async fn remove(&self, job: &ResourceJob) -> ProviderResult<()>;

    /// Whether [`ResourceAdapter::update`] is implemented
    fn supports_update(&self) -> bool {
        false
    }

    async fn update(&self, job: &ResourceJob) -> ProviderResult<Description> {
        Err(ProviderError::Unsupported {
            operation: "update".to_string(),
            kind: job.kind,
        })
    }

    /// Provider-assigned identifier (ARN, id) of an existing resource
    async fn identify(&self, _job: &ResourceJob) -> ProviderResult<Option<String>> {
        Ok(None)
    }
}

/// Describe first; create only when nothing is there.
///
/// An "already exists" error from `create` (another writer won the race)
/// is answered with a second describe.
pub async fn ensure_created<D, DFut, C, CFut>(
    job: &ResourceJob,
    describe: D,
    create: C,
) -> ProviderResult<Description>
where
    D: Fn() -> DFut,
    DFut: Future<Output = ProviderResult<Option<Description>>>,
    C: FnOnce() -> CFut,
    CFut: Future<Output = ProviderResult<Description>>,
{
    if let Some(existing) = describe().await? {
        tracing::warn!("{} {} already exists", job.kind, job.name);
        return Ok(existing.existing());
    }

    match create().await {
        Ok(description) => {
            tracing::info!("Created {} {} in {}", job.kind, job.name, job.region);
            Ok(description)
        }
        Err(err) if err.is_already_exists() => {
            tracing::warn!(
                "{} {} was created concurrently, describing it",
                job.kind,
                job.name
            );
            match describe().await? {
                Some(existing) => Ok(existing.existing()),
                None => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

/// Remove, treating "not found" as success.
pub async fn ensure_removed<R, RFut>(job: &ResourceJob, remove: R) -> ProviderResult<()>
where
    R: FnOnce() -> RFut,
    RFut: Future<Output = ProviderResult<()>>,
{
    match remove().await {
        Ok(()) => {
            tracing::info!("Removed {} {} from {}", job.kind, job.name, job.region);
            Ok(())
        }
        Err(err) if err.is_not_found() => {
            tracing::warn!("{} {} is not found, nothing to remove", job.kind, job.name);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;
    use serde_json::{Map, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn job() -> ResourceJob {
        ResourceJob {
            name: "orders".into(),
            kind: ResourceKind::SqsQueue,
            meta: Map::new(),
            region: "eu-west-1".into(),
        }
    }

    #[tokio::test]
    async fn test_second_create_returns_existing() {
        let job = job();
        let store: Mutex<Option<Description>> = Mutex::new(None);
        let creates = AtomicU32::new(0);

        let describe = || async { Ok(store.lock().unwrap().clone()) };
        let create = || async {
            creates.fetch_add(1, Ordering::SeqCst);
            let d = Description::new(&job, json!({"QueueUrl": "local://orders"}));
            *store.lock().unwrap() = Some(d.clone());
            Ok(d)
        };

        let first = ensure_created(&job, describe, create).await.unwrap();
        assert!(!first.existed);

        let create_again = || async {
            creates.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::untyped("CreateQueue", "should not be called"))
        };
        let second = ensure_created(&job, describe, create_again).await.unwrap();
        assert!(second.existed);
        assert_eq!(second.description, first.description);
        assert_eq!(creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_already_exists_race_is_treated_as_found() {
        let job = job();
        let describes = AtomicU32::new(0);
        let describe = || async {
            let n = describes.fetch_add(1, Ordering::SeqCst);
            Ok((n > 0).then(|| Description::new(&job, json!({}))))
        };
        let create = || async { Err(ProviderError::already_exists("CreateQueue", "orders")) };

        let d = ensure_created(&job, describe, create).await.unwrap();
        assert!(d.existed);
        assert_eq!(describes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_create_errors_propagate() {
        let job = job();
        let describe = || async { Ok(None) };
        let create =
            || async { Err(ProviderError::service("CreateQueue", "AccessDenied", "nope")) };
        let err = ensure_created(&job, describe, create).await.unwrap_err();
        assert_eq!(err.code(), Some("AccessDenied"));
    }

    #[tokio::test]
    async fn test_remove_missing_is_noop() {
        let job = job();
        ensure_removed(&job, || async {
            Err(ProviderError::not_found("DeleteQueue", "orders"))
        })
        .await
        .unwrap();

        let err = ensure_removed(&job, || async {
            Err(ProviderError::service("DeleteQueue", "AccessDenied", "nope"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), Some("AccessDenied"));
    }

    struct Minimal;

    #[async_trait]
    impl ResourceAdapter for Minimal {
        async fn create(&self, job: &ResourceJob) -> ProviderResult<Description> {
            Ok(Description::new(job, json!({})))
        }

        async fn remove(&self, _job: &ResourceJob) -> ProviderResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_update_and_identify() {
        let adapter = Minimal;
        assert!(!adapter.supports_update());
        assert!(matches!(
            adapter.update(&job()).await,
            Err(ProviderError::Unsupported { .. })
        ));
        assert_eq!(adapter.identify(&job()).await.unwrap(), None);
    }
}
