//! # Adapter Layer
//!
//! Concrete implementations of the domain ports used by the demo binary
//! and by tests: a JSON-loadable subscriber registry, a dry-run southbound
//! driver, and in-memory inventory/cluster/host services.

pub mod dryrun;
pub mod memory;
pub mod sadis;

pub use dryrun::DryRunProgrammer;
pub use memory::{NoHosts, SingleNodeCluster, StaticInventory};
pub use sadis::LocalSubscriberRegistry;
