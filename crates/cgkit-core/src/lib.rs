//! cgkit Core Library
//!
//! Cgroup controller abstraction and lifecycle management for test
//! programs: negotiates controller availability across cgroup v1/v2
//! (mounting private hierarchies when needed), creates and destroys
//! nested groups safely, and serializes the discovered layout so a later
//! process can finish cleanup.

pub mod config;
pub mod context;
pub mod error;
pub mod groups;
mod io;
mod knobs;
pub mod scanner;
pub mod types;
mod utils;

pub use config::{deserialize, serialize};
pub use context::CgroupContext;
pub use error::{CgroupError, Result};
pub use groups::GroupId;
pub use scanner::{system_mounts, MountEntry};
pub use types::{CgroupVersion, Controller, HierarchyDescriptor, RequireOptions};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
