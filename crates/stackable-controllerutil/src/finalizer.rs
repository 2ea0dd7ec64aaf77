//! Helpers to inspect and modify the finalizers of an object.
use kube::Resource;

use crate::metadata::MetadataAccessor;

/// Checks whether `finalizer` is in the list of finalizers of `object`.
///
/// Objects without object metadata or without any finalizers never contain
/// a finalizer.
pub fn contains_finalizer<T>(object: &T, finalizer: &str) -> bool
where
    T: MetadataAccessor + ?Sized,
{
    object.finalizers().iter().any(|f| f == finalizer)
}

/// Adds `finalizer` to `object`, unless it is already present.
///
/// Returns `true` if the list of finalizers was changed. The object is only
/// modified locally, persisting the change is up to the caller.
pub fn add_finalizer<T>(object: &mut T, finalizer: &str) -> bool
where
    T: Resource,
{
    let finalizers = object.meta_mut().finalizers.get_or_insert_with(Vec::new);
    if finalizers.iter().any(|f| f == finalizer) {
        return false;
    }

    finalizers.push(finalizer.to_owned());
    true
}

/// Removes every occurrence of `finalizer` from `object`.
///
/// Returns `true` if the list of finalizers was changed.
pub fn remove_finalizer<T>(object: &mut T, finalizer: &str) -> bool
where
    T: Resource,
{
    let Some(finalizers) = object.meta_mut().finalizers.as_mut() else {
        return false;
    };

    let len = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    finalizers.len() != len
}
