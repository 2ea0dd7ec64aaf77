//! Resolves whether a resource kind is cluster-scoped or namespace-scoped.
use std::collections::HashMap;

use kube::{
    Discovery,
    api::ApiResource,
    core::GroupVersionKind,
    discovery::{ApiCapabilities, Scope},
};
use snafu::{OptionExt, Snafu};

/// The scope in which objects of a resource kind are addressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceScope {
    /// Objects are addressed globally and never carry a namespace.
    Cluster,

    /// Objects live in, and are addressed within, a namespace.
    Namespaced,
}

impl From<Scope> for ResourceScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Cluster => Self::Cluster,
            Scope::Namespaced => Self::Namespaced,
        }
    }
}

#[derive(Debug, PartialEq, Snafu)]
#[snafu(display(
    "no scope mapping for {}/{}, Kind={}",
    kind.group,
    kind.version,
    kind.kind
))]
pub struct NoScopeMappingError {
    kind: GroupVersionKind,
}

impl NoScopeMappingError {
    /// The kind which could not be resolved.
    pub fn kind(&self) -> &GroupVersionKind {
        &self.kind
    }
}

/// Maps resource kinds to their [`ResourceScope`].
pub trait ScopeResolver {
    fn scope_of(&self, kind: &GroupVersionKind) -> Result<ResourceScope, NoScopeMappingError>;
}

impl<T> ScopeResolver for &T
where
    T: ScopeResolver + ?Sized,
{
    fn scope_of(&self, kind: &GroupVersionKind) -> Result<ResourceScope, NoScopeMappingError> {
        (**self).scope_of(kind)
    }
}

/// Uses the API capabilities of the kinds discovered on the API server.
impl ScopeResolver for Discovery {
    fn scope_of(&self, kind: &GroupVersionKind) -> Result<ResourceScope, NoScopeMappingError> {
        let (_, capabilities) = resolve_resource(self, kind)?;
        Ok(capabilities.scope.into())
    }
}

/// Looks up the served resource of `kind`, including its plural name.
pub(crate) fn resolve_resource(
    discovery: &Discovery,
    kind: &GroupVersionKind,
) -> Result<(ApiResource, ApiCapabilities), NoScopeMappingError> {
    discovery
        .resolve_gvk(kind)
        .context(NoScopeMappingSnafu { kind: kind.clone() })
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct KindKey {
    group: String,
    version: String,
    kind: String,
}

impl From<&GroupVersionKind> for KindKey {
    fn from(gvk: &GroupVersionKind) -> Self {
        Self {
            group: gvk.group.clone(),
            version: gvk.version.clone(),
            kind: gvk.kind.clone(),
        }
    }
}

impl From<GroupVersionKind> for KindKey {
    fn from(gvk: GroupVersionKind) -> Self {
        Self {
            group: gvk.group,
            version: gvk.version,
            kind: gvk.kind,
        }
    }
}

/// A fixed, in-memory mapping of kinds to scopes.
///
/// This is useful for kinds which are known upfront and in tests, where no
/// API server is available for discovery.
///
/// ```
/// use kube::core::GroupVersionKind;
/// use stackable_controllerutil::scope::{ResourceScope, ScopeResolver, StaticScopeResolver};
///
/// let namespaced = GroupVersionKind::gvk("example.com", "v1", "NamespaceScoped");
/// let resolver = StaticScopeResolver::new().with(namespaced.clone(), ResourceScope::Namespaced);
///
/// assert_eq!(resolver.scope_of(&namespaced), Ok(ResourceScope::Namespaced));
/// ```
#[derive(Clone, Debug, Default)]
pub struct StaticScopeResolver {
    scopes: HashMap<KindKey, ResourceScope>,
}

impl StaticScopeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the scope of `kind`.
    pub fn add(&mut self, kind: GroupVersionKind, scope: ResourceScope) -> &mut Self {
        self.scopes.insert(kind.into(), scope);
        self
    }

    /// Same as [`StaticScopeResolver::add`], but consumes and returns `self`.
    pub fn with(mut self, kind: GroupVersionKind, scope: ResourceScope) -> Self {
        self.add(kind, scope);
        self
    }
}

impl ScopeResolver for StaticScopeResolver {
    fn scope_of(&self, kind: &GroupVersionKind) -> Result<ResourceScope, NoScopeMappingError> {
        self.scopes
            .get(&KindKey::from(kind))
            .copied()
            .context(NoScopeMappingSnafu { kind: kind.clone() })
    }
}
