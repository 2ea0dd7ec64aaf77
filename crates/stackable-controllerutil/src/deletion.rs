//! Waits until the deletion of an object has been observed.
//!
//! The [`DeletionWaiter`] polls an [`ObjectStore`] until the object is gone.
//! Callers bound the wait by passing a cancellation future, which can be a
//! deadline ([`tokio::time::sleep`]), a shutdown signal or any other future
//! resolving to `()`.
use std::{future::Future, pin::pin, time::Duration};

use kube::{
    Client, Discovery,
    api::{Api, DynamicObject},
};
use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::{
    metadata::ObjectRef,
    scope::{self, NoScopeMappingError, ResourceScope},
};

/// The interval in which the store is polled, unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Snafu)]
pub enum WaitError<E>
where
    E: std::error::Error + 'static,
{
    #[snafu(display("timed out waiting for {object} to be deleted"))]
    Timeout { object: ObjectRef },

    #[snafu(display("failed to look up {object} while waiting for its deletion"))]
    Store { object: ObjectRef, source: E },
}

/// A source of objects which can be queried for their existence.
pub trait ObjectStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the referenced object, or [`None`] if it doesn't exist.
    fn get_opt(
        &self,
        object: &ObjectRef,
    ) -> impl Future<Output = Result<Option<DynamicObject>, Self::Error>> + Send;
}

#[derive(Debug, Snafu)]
pub enum KubeStoreError {
    #[snafu(display("failed to discover the resources served by the API server"))]
    Discover { source: kube::Error },

    #[snafu(display("failed to resolve the resource of {object}"))]
    ResolveResource {
        object: ObjectRef,
        source: NoScopeMappingError,
    },

    #[snafu(display("{object} is of a namespaced kind but has no namespace"))]
    MissingNamespace { object: ObjectRef },

    #[snafu(display("failed to get {object}"))]
    Get {
        object: ObjectRef,
        source: kube::Error,
    },
}

/// An [`ObjectStore`] backed by the Kubernetes API server.
///
/// The resource (most notably its plural name) and scope of a kind are taken
/// from API discovery. A kind which is not served by the API server is
/// reported as [`KubeStoreError::ResolveResource`], never as deleted.
pub struct KubeStore {
    client: Client,
    discovery: Discovery,
}

impl KubeStore {
    /// Creates a store from an already run `discovery`.
    pub fn new(client: Client, discovery: Discovery) -> Self {
        Self { client, discovery }
    }

    /// Runs a full API discovery and creates a store from its results.
    pub async fn discover(client: Client) -> Result<Self, KubeStoreError> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .context(DiscoverSnafu)?;

        Ok(Self::new(client, discovery))
    }

    /// The discovered resources, which can also be used as
    /// [`ScopeResolver`](crate::scope::ScopeResolver).
    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    fn api_for(&self, object: &ObjectRef) -> Result<Api<DynamicObject>, KubeStoreError> {
        let (resource, capabilities) = scope::resolve_resource(&self.discovery, object.kind())
            .context(ResolveResourceSnafu {
                object: object.clone(),
            })?;

        match (ResourceScope::from(capabilities.scope), object.namespace()) {
            (ResourceScope::Cluster, _) => Ok(Api::all_with(self.client.clone(), &resource)),
            (ResourceScope::Namespaced, Some(namespace)) => Ok(Api::namespaced_with(
                self.client.clone(),
                namespace,
                &resource,
            )),
            (ResourceScope::Namespaced, None) => MissingNamespaceSnafu {
                object: object.clone(),
            }
            .fail(),
        }
    }
}

impl ObjectStore for KubeStore {
    type Error = KubeStoreError;

    async fn get_opt(&self, object: &ObjectRef) -> Result<Option<DynamicObject>, Self::Error> {
        self.api_for(object)?
            .get_opt(object.name())
            .await
            .context(GetSnafu {
                object: object.clone(),
            })
    }
}

/// Available options to configure a [`DeletionWaiter`].
///
/// Additionally, this struct can be used as operator CLI arguments. This functionality is only
/// available if the feature `clap` is enabled.
#[cfg_attr(feature = "clap", derive(clap::Args))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeletionWaitOptions {
    /// The interval in which objects are polled while waiting for their deletion.
    #[cfg_attr(feature = "clap", arg(
        long = "deletion-poll-interval",
        env = "DELETION_POLL_INTERVAL",
        default_value = "10ms",
        value_parser = humantime::parse_duration,
    ))]
    pub poll_interval: Duration,
}

impl Default for DeletionWaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Polls an [`ObjectStore`] in a fixed interval until an object is gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeletionWaiter {
    poll_interval: Duration,
}

impl Default for DeletionWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl From<DeletionWaitOptions> for DeletionWaiter {
    fn from(options: DeletionWaitOptions) -> Self {
        Self::new(options.poll_interval)
    }
}

impl DeletionWaiter {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Waits until `store` reports that `object` doesn't exist anymore.
    ///
    /// The store is queried immediately, so an object which is already gone
    /// returns without waiting. While the object still exists, the store is
    /// polled again after the configured interval.
    ///
    /// Once `cancel` resolves, [`WaitError::Timeout`] is returned. It is
    /// checked before every poll and raced against both the store request and
    /// the sleep in between polls. An already resolved `cancel` therefore
    /// returns before the store is queried at all. Any error reported by the
    /// store ends the wait with [`WaitError::Store`].
    #[instrument(skip_all, fields(%object, poll_interval = ?self.poll_interval))]
    pub async fn wait_for_deletion<S, C>(
        &self,
        store: &S,
        object: &ObjectRef,
        cancel: C,
    ) -> Result<(), WaitError<S::Error>>
    where
        S: ObjectStore,
        C: Future<Output = ()>,
    {
        let mut cancel = pin!(cancel);

        loop {
            let found = tokio::select! {
                biased;
                () = &mut cancel => return Err(WaitError::Timeout { object: object.clone() }),
                result = store.get_opt(object) => result.map_err(|source| WaitError::Store {
                    object: object.clone(),
                    source,
                })?,
            };

            if found.is_none() {
                tracing::debug!("Object is gone");
                return Ok(());
            }

            tracing::debug!("Object still exists, polling again");

            tokio::select! {
                biased;
                () = &mut cancel => return Err(WaitError::Timeout { object: object.clone() }),
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

/// Waits for the deletion of `object` using a [`DeletionWaiter`] with the
/// default poll interval. See [`DeletionWaiter::wait_for_deletion`].
pub async fn wait_for_deletion<S, C>(
    store: &S,
    object: &ObjectRef,
    cancel: C,
) -> Result<(), WaitError<S::Error>>
where
    S: ObjectStore,
    C: Future<Output = ()>,
{
    DeletionWaiter::default()
        .wait_for_deletion(store, object, cancel)
        .await
}

#[cfg(test)]
mod tests {
    use std::{
        future,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use kube::{api::ApiResource, core::GroupVersionKind};
    use tokio::{sync::oneshot, time::Instant};

    use super::*;

    #[derive(Debug, Snafu)]
    #[snafu(display("store is unavailable"))]
    struct UnavailableError;

    /// Reports the object as present for the first `present_for` polls.
    struct FakeStore {
        present_for: usize,
        unavailable: bool,
        unresponsive: bool,
        polls: AtomicUsize,
    }

    impl FakeStore {
        fn present_for(present_for: usize) -> Self {
            Self {
                present_for,
                unavailable: false,
                unresponsive: false,
                polls: AtomicUsize::new(0),
            }
        }

        fn unavailable() -> Self {
            Self {
                unavailable: true,
                ..Self::present_for(usize::MAX)
            }
        }

        /// Never answers any request.
        fn unresponsive() -> Self {
            Self {
                unresponsive: true,
                ..Self::present_for(usize::MAX)
            }
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    impl ObjectStore for FakeStore {
        type Error = UnavailableError;

        async fn get_opt(
            &self,
            object: &ObjectRef,
        ) -> Result<Option<DynamicObject>, Self::Error> {
            let poll = self.polls.fetch_add(1, Ordering::SeqCst);
            if self.unresponsive {
                future::pending::<()>().await;
            }
            if self.unavailable {
                return UnavailableSnafu.fail();
            }

            Ok((poll < self.present_for).then(|| {
                DynamicObject::new(object.name(), &ApiResource::from_gvk(object.kind()))
            }))
        }
    }

    fn pod() -> ObjectRef {
        ObjectRef::new(GroupVersionKind::gvk("", "v1", "Pod"), "testName").within("testNamespace")
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_first_poll() {
        let store = FakeStore::present_for(0);

        let err = wait_for_deletion(&store, &pod(), future::ready(()))
            .await
            .expect_err("wait must be cancelled");

        assert!(matches!(err, WaitError::Timeout { ref object } if object == &pod()));
        assert_eq!(store.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn already_deleted() {
        let store = FakeStore::present_for(0);
        let start = Instant::now();

        wait_for_deletion(&store, &pod(), future::pending())
            .await
            .expect("object must already be gone");

        assert_eq!(store.polls(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_after_some_polls() {
        let store = FakeStore::present_for(3);
        let waiter = DeletionWaiter::new(Duration::from_millis(100));
        let start = Instant::now();

        waiter
            .wait_for_deletion(&store, &pod(), future::pending())
            .await
            .expect("object must be deleted eventually");

        assert_eq!(store.polls(), 4);
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_exceeded() {
        let store = FakeStore::present_for(usize::MAX);
        let waiter = DeletionWaiter::new(Duration::from_secs(1));

        let err = waiter
            .wait_for_deletion(
                &store,
                &pod(),
                tokio::time::sleep(Duration::from_millis(2500)),
            )
            .await
            .expect_err("object must never be deleted");

        assert!(matches!(err, WaitError::Timeout { .. }));
        // Polls at 0s, 1s and 2s, the deadline interrupts the third sleep
        assert_eq!(store.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_cancel() {
        let store = FakeStore::present_for(usize::MAX);
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(55)).await;
            cancel_tx.send(()).ok();
        });

        let err = wait_for_deletion(&store, &pod(), async {
            cancel_rx.await.ok();
        })
        .await
        .expect_err("wait must be cancelled");

        assert!(matches!(err, WaitError::Timeout { .. }));
        assert!(store.polls() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_during_store_request() {
        let store = FakeStore::unresponsive();
        let start = Instant::now();

        let err = wait_for_deletion(&store, &pod(), tokio::time::sleep(Duration::from_secs(1)))
            .await
            .expect_err("hanging request must be cancelled");

        assert!(matches!(err, WaitError::Timeout { ref object } if object == &pod()));
        assert_eq!(store.polls(), 1);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn store_error_aborts_wait() {
        let store = FakeStore::unavailable();

        let err = wait_for_deletion(&store, &pod(), future::pending())
            .await
            .expect_err("store errors must not be retried");

        assert!(matches!(err, WaitError::Store { .. }));
        assert_eq!(store.polls(), 1);
    }

    #[test]
    fn error_display() {
        let err: WaitError<UnavailableError> = WaitError::Timeout { object: pod() };
        assert_eq!(
            err.to_string(),
            "timed out waiting for Pod.v1/testNamespace/testName to be deleted"
        );
    }

    #[test]
    fn waiter_from_options() {
        let waiter = DeletionWaiter::from(DeletionWaitOptions {
            poll_interval: Duration::from_millis(250),
        });
        assert_eq!(waiter.poll_interval(), Duration::from_millis(250));
        assert_eq!(
            DeletionWaiter::from(DeletionWaitOptions::default()),
            DeletionWaiter::default()
        );
    }

    #[cfg(feature = "clap")]
    mod cli {
        use clap::Parser;

        use super::*;

        #[derive(Debug, Parser)]
        struct Cli {
            #[command(flatten)]
            deletion: DeletionWaitOptions,
        }

        #[test]
        fn default_poll_interval() {
            let cli = Cli::try_parse_from(["operator"]).expect("no arguments are required");
            assert_eq!(cli.deletion, DeletionWaitOptions::default());
        }

        #[test]
        fn custom_poll_interval() {
            let cli = Cli::try_parse_from(["operator", "--deletion-poll-interval", "2s"])
                .expect("poll interval must parse");
            assert_eq!(cli.deletion.poll_interval, Duration::from_secs(2));
        }

        #[test]
        fn invalid_poll_interval() {
            Cli::try_parse_from(["operator", "--deletion-poll-interval", "soon"])
                .expect_err("poll interval must be a duration");
        }
    }
}
