//! Common types for the DevPod Kubernetes provider: options, errors, logging

pub mod duration;
pub mod error;
pub mod log_buffer;
pub mod options;
pub mod telemetry;
pub mod throttle;

pub use error::Error;
pub use log_buffer::LogBuffer;
pub use options::{ClusterConnection, ComparableOptions, CompletedPodPolicy, Options};
pub use throttle::Throttle;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label marking every object this provider creates
pub const CREATED_LABEL: &str = "devpod.sh/created";

/// Label carrying the workspace resource name (architecture-detection pods)
pub const WORKSPACE_LABEL: &str = "devpod.sh/workspace";

/// Label carrying the workspace UID
pub const WORKSPACE_UID_LABEL: &str = "devpod.sh/workspace-uid";

/// PVC annotation holding the persisted workspace info
pub const INFO_ANNOTATION: &str = "devpod.sh/info";

/// Pod annotation holding the last-applied configuration snapshot
pub const LAST_APPLIED_ANNOTATION: &str = "devpod.sh/last-applied-configuration";
