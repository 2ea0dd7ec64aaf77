//! Decides whether one object may be set as the owner of another.
//!
//! Kubernetes only honours owner references which respect the scoping rules of
//! the garbage collector: cluster-scoped owners may own anything, while
//! namespaced owners may only own namespaced dependents in the same namespace.
use snafu::{ResultExt, Snafu};

use crate::{
    metadata::{self, MetadataAccessor},
    scope::{NoScopeMappingError, ResourceScope, ScopeResolver},
};

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("failed to read metadata of owner"))]
    OwnerMetadata { source: metadata::Error },

    #[snafu(display("failed to resolve scope of owner"))]
    ResolveOwnerScope { source: NoScopeMappingError },

    #[snafu(display("failed to read metadata of dependent"))]
    DependentMetadata { source: metadata::Error },

    #[snafu(display("failed to resolve scope of dependent"))]
    ResolveDependentScope { source: NoScopeMappingError },
}

struct Scoped<'a> {
    scope: ResourceScope,
    namespace: Option<&'a str>,
}

/// Returns whether `owner` is allowed to be referenced as owner of
/// `dependent`.
///
/// An [`Err`] is returned if the metadata of either object is malformed or if
/// the scope of either kind can not be resolved. The owner is always inspected
/// first. `Ok(false)` is only returned if the ownership is not permitted.
///
/// ```
/// use kube::{api::{ApiResource, DynamicObject}, core::GroupVersionKind};
/// use stackable_controllerutil::{
///     owner_reference::supports_owner_reference,
///     scope::{ResourceScope, StaticScopeResolver},
/// };
///
/// let kind = GroupVersionKind::gvk("example.com", "v1", "NamespaceScoped");
/// let resolver = StaticScopeResolver::new().with(kind.clone(), ResourceScope::Namespaced);
///
/// let resource = ApiResource::from_gvk(&kind);
/// let owner = DynamicObject::new("owner", &resource).within("ns1");
/// let dependent = DynamicObject::new("dependent", &resource).within("ns2");
///
/// assert_eq!(supports_owner_reference(&resolver, &owner, &dependent), Ok(false));
/// ```
pub fn supports_owner_reference<R, O, D>(
    resolver: &R,
    owner: &O,
    dependent: &D,
) -> Result<bool, Error>
where
    R: ScopeResolver + ?Sized,
    O: MetadataAccessor + ?Sized,
    D: MetadataAccessor + ?Sized,
{
    let owner = resolve(resolver, owner).context(OwnerMetadataSnafu)?;
    let owner = owner.context(ResolveOwnerScopeSnafu)?;

    let dependent = resolve(resolver, dependent).context(DependentMetadataSnafu)?;
    let dependent = dependent.context(ResolveDependentScopeSnafu)?;

    Ok(match (owner.scope, dependent.scope) {
        (ResourceScope::Cluster, _) => true,
        // Cluster-scoped objects can never be owned by namespaced ones
        (ResourceScope::Namespaced, ResourceScope::Cluster) => false,
        (ResourceScope::Namespaced, ResourceScope::Namespaced) => {
            owner.namespace == dependent.namespace
        }
    })
}

/// Reads the kind and namespace of `object` and resolves the scope of its kind.
///
/// Metadata errors are returned in the outer, resolver misses in the inner
/// [`Result`], so that callers can attach the matching context to each.
fn resolve<'a, R, T>(
    resolver: &R,
    object: &'a T,
) -> Result<Result<Scoped<'a>, NoScopeMappingError>, metadata::Error>
where
    R: ScopeResolver + ?Sized,
    T: MetadataAccessor + ?Sized,
{
    let kind = object.group_version_kind()?;
    let namespace = object.namespace()?;

    Ok(resolver
        .scope_of(&kind)
        .map(|scope| Scoped { scope, namespace }))
}
