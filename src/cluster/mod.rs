// Ephemeral k3s cluster: registry service, bindings, server start, teardown.

mod provision;
mod session;
mod teardown;

pub use provision::Provisioner;
pub use session::{
    ClusterConfig, ClusterSession, Mount, PendingCluster, PortMapping, ServiceBinding,
    ServiceHandle,
};
pub use teardown::{TeardownSummary, teardown};

/// Label carried by every container and network a run creates.
pub const RUN_LABEL: &str = "shipcheck.run";

/// Kubernetes API port inside the server container.
pub const API_PORT: u16 = 6443;
