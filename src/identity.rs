// Resource identity: the partition key for history chains.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one logical mutable object whose history is tracked.
///
/// The tuple (cluster, resource type, name, namespace) is never reused
/// across unrelated resources; predecessor lookups and chain ordering are
/// always scoped to one identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    /// Cluster the resource lives in.
    pub cluster: String,
    /// Resource type, e.g. `deployment` or `helmrelease`.
    pub resource_type: String,
    /// Resource name.
    pub name: String,
    /// Namespace; empty for cluster-scoped resources.
    pub namespace: String,
}

impl ResourceIdentity {
    /// Identity for a namespaced resource.
    pub fn namespaced(
        cluster: impl Into<String>,
        resource_type: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            resource_type: resource_type.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Identity for a cluster-scoped resource (empty namespace).
    pub fn cluster_scoped(
        cluster: impl Into<String>,
        resource_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::namespaced(cluster, resource_type, name, "")
    }

    /// True if the resource is cluster-scoped.
    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}/{}", self.cluster, self.resource_type, self.name)
        } else {
            write!(
                f,
                "{}/{}/{}/{}",
                self.cluster, self.resource_type, self.namespace, self.name
            )
        }
    }
}
