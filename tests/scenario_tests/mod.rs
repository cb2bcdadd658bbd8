//! Workspace stories told against [`fake_cluster::FakeCluster`]
//!
//! - `lifecycle`: run, find, stop, start and delete of one workspace,
//!   including option changes and pull secrets
//! - `architecture`: detection pods and the affinity of the next run
//! - `render`: offline previews of what a run would apply

mod architecture;
mod fake_cluster;
mod helpers;
mod lifecycle;
