//! Helpers for Kubernetes controllers which deal with object ownership,
//! finalizers and deletion.
//!
//! - [`owner_reference::supports_owner_reference`] checks whether an owner
//!   reference between two objects is allowed by the scoping rules of their
//!   kinds.
//! - [`finalizer::contains_finalizer`] checks for the presence of a finalizer.
//! - [`deletion::wait_for_deletion`] waits until an object is gone, for
//!   example by polling the API server through a [`deletion::KubeStore`].
//!
//! All helpers read object metadata through the [`metadata::MetadataAccessor`]
//! trait, which is implemented for [`kube::core::DynamicObject`],
//! [`kube::core::PartialObjectMeta`] and common [`k8s_openapi`] resources.
//!
//! ## Crate Features
//!
//! - `clap` (default) enables deriving CLI arguments for
//!   [`deletion::DeletionWaitOptions`].

pub mod deletion;
pub mod finalizer;
pub mod metadata;
pub mod owner_reference;
pub mod scope;

// External re-exports
pub use k8s_openapi;
pub use kube;

pub use deletion::{DeletionWaiter, KubeStore, wait_for_deletion};
pub use finalizer::contains_finalizer;
pub use metadata::{MetadataAccessor, ObjectRef};
pub use owner_reference::supports_owner_reference;
pub use scope::{ResourceScope, ScopeResolver, StaticScopeResolver};
