//! Read-only access to the type and object metadata of Kubernetes objects.
//!
//! Objects handed to the helpers in this crate come in different shapes: fully
//! typed [`k8s_openapi`] resources, [`DynamicObject`]s, [`PartialObjectMeta`]
//! or even bare [`TypeMeta`] without any object metadata. The
//! [`MetadataAccessor`] trait provides a uniform view onto all of them.
use std::fmt;

use k8s_openapi::{
    Metadata, Resource,
    api::{
        apps::v1::{DaemonSet, Deployment, StatefulSet},
        batch::v1::Job,
        core::v1::{
            ConfigMap, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Secret,
            Service, ServiceAccount,
        },
        policy::v1::PodDisruptionBudget,
        rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::core::{DynamicObject, GroupVersionKind, PartialObjectMeta, TypeMeta};
use snafu::{OptionExt, Snafu, ensure};

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("object has no type metadata"))]
    MissingTypeMeta,

    #[snafu(display("object has no object metadata"))]
    MissingObjectMeta,

    #[snafu(display("object has no name"))]
    MissingName,

    #[snafu(display("kind of apiVersion {api_version:?} must not be empty"))]
    EmptyKind { api_version: String },

    #[snafu(display("apiVersion must not be empty"))]
    EmptyApiVersion,

    #[snafu(display("group of apiVersion {api_version:?} must not be empty"))]
    EmptyGroup { api_version: String },

    #[snafu(display("version of apiVersion {api_version:?} must not be empty"))]
    EmptyVersion { api_version: String },

    #[snafu(display("apiVersion {api_version:?} must have the format (<GROUP>/)<VERSION>"))]
    InvalidApiVersion { api_version: String },
}

/// Uniform read access to the metadata of a Kubernetes object.
///
/// Implementors only need to expose the raw [`TypeMeta`] and [`ObjectMeta`].
/// Everything else (parsing the [`GroupVersionKind`], normalizing the
/// namespace, reading finalizers) is provided on top of these two.
pub trait MetadataAccessor {
    /// Returns the `apiVersion` and `kind` of the object, if known.
    fn type_meta(&self) -> Option<TypeMeta>;

    /// Returns the standard object metadata, if the object carries any.
    fn object_meta(&self) -> Option<&ObjectMeta>;

    /// Parses the type metadata into a [`GroupVersionKind`].
    ///
    /// The `apiVersion` must follow the `(<GROUP>/)<VERSION>` format. A missing
    /// group denotes the core API group, which is represented by an empty
    /// string.
    fn group_version_kind(&self) -> Result<GroupVersionKind, Error> {
        let type_meta = self.type_meta().context(MissingTypeMetaSnafu)?;
        parse_group_version_kind(&type_meta)
    }

    /// Returns the namespace of the object. An empty namespace is treated the
    /// same as an unset one and results in [`None`].
    fn namespace(&self) -> Result<Option<&str>, Error> {
        let object_meta = self.object_meta().context(MissingObjectMetaSnafu)?;

        Ok(object_meta
            .namespace
            .as_deref()
            .filter(|namespace| !namespace.is_empty()))
    }

    /// Returns the finalizers of the object. Objects without object metadata or
    /// without finalizers return an empty slice.
    fn finalizers(&self) -> &[String] {
        self.object_meta()
            .and_then(|object_meta| object_meta.finalizers.as_deref())
            .unwrap_or_default()
    }

    /// Builds an [`ObjectRef`] which identifies this object.
    fn object_ref(&self) -> Result<ObjectRef, Error> {
        let kind = self.group_version_kind()?;
        let namespace = self.namespace()?;
        let name = self
            .object_meta()
            .and_then(|object_meta| object_meta.name.as_deref())
            .filter(|name| !name.is_empty())
            .context(MissingNameSnafu)?;

        let object_ref = ObjectRef::new(kind, name);
        Ok(match namespace {
            Some(namespace) => object_ref.within(namespace),
            None => object_ref,
        })
    }
}

fn parse_group_version_kind(type_meta: &TypeMeta) -> Result<GroupVersionKind, Error> {
    let TypeMeta { api_version, kind } = type_meta;

    ensure!(!kind.is_empty(), EmptyKindSnafu { api_version });
    ensure!(!api_version.is_empty(), EmptyApiVersionSnafu);

    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => {
            ensure!(!group.is_empty(), EmptyGroupSnafu { api_version });
            ensure!(!version.is_empty(), EmptyVersionSnafu { api_version });
            ensure!(!version.contains('/'), InvalidApiVersionSnafu { api_version });

            (group, version)
        }
        None => ("", api_version.as_str()),
    };

    Ok(GroupVersionKind::gvk(group, version, kind))
}

impl MetadataAccessor for DynamicObject {
    fn type_meta(&self) -> Option<TypeMeta> {
        self.types.clone()
    }

    fn object_meta(&self) -> Option<&ObjectMeta> {
        Some(&self.metadata)
    }
}

impl<K> MetadataAccessor for PartialObjectMeta<K> {
    fn type_meta(&self) -> Option<TypeMeta> {
        self.types.clone()
    }

    fn object_meta(&self) -> Option<&ObjectMeta> {
        Some(&self.metadata)
    }
}

/// An object which only carries type information, but no object metadata.
impl MetadataAccessor for TypeMeta {
    fn type_meta(&self) -> Option<TypeMeta> {
        Some(self.clone())
    }

    fn object_meta(&self) -> Option<&ObjectMeta> {
        None
    }
}

macro_rules! impl_metadata_accessor {
    ($($ty:ty),* $(,)?) => {
        $(
            impl MetadataAccessor for $ty {
                fn type_meta(&self) -> Option<TypeMeta> {
                    Some(TypeMeta {
                        api_version: <$ty as Resource>::API_VERSION.to_owned(),
                        kind: <$ty as Resource>::KIND.to_owned(),
                    })
                }

                fn object_meta(&self) -> Option<&ObjectMeta> {
                    Some(self.metadata())
                }
            }
        )*
    };
}

impl_metadata_accessor!(
    ClusterRole,
    ClusterRoleBinding,
    ConfigMap,
    DaemonSet,
    Deployment,
    Job,
    Namespace,
    Node,
    PersistentVolume,
    PersistentVolumeClaim,
    Pod,
    PodDisruptionBudget,
    Role,
    RoleBinding,
    Secret,
    Service,
    ServiceAccount,
    StatefulSet,
);

/// Identifies a single object by its kind, namespace and name.
///
/// A namespace of [`None`] addresses a cluster-scoped object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    kind: GroupVersionKind,
    namespace: Option<String>,
    name: String,
}

impl ObjectRef {
    /// Creates a reference to a cluster-scoped object. Use [`ObjectRef::within`]
    /// to place it into a namespace.
    pub fn new(kind: GroupVersionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }

    /// Places the referenced object into `namespace`. An empty namespace
    /// keeps the reference cluster-scoped.
    pub fn within(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.namespace = (!namespace.is_empty()).then_some(namespace);
        self
    }

    pub fn kind(&self) -> &GroupVersionKind {
        &self.kind
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let GroupVersionKind {
            group,
            version,
            kind,
        } = &self.kind;

        write!(f, "{kind}.{version}")?;
        if !group.is_empty() {
            write!(f, ".{group}")?;
        }

        match &self.namespace {
            Some(namespace) => write!(f, "/{namespace}/{name}", name = self.name),
            None => write!(f, "/{name}", name = self.name),
        }
    }
}
