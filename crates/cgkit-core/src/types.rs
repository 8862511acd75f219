//! Data types for cgroup hierarchy discovery and negotiation

use std::fmt;
use std::path::PathBuf;

use crate::error::{CgroupError, Result};

/// The two incompatible on-disk cgroup layouts.
///
/// Fixed once per hierarchy for the life of the process; knob name
/// resolution and procs-file naming dispatch on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CgroupVersion {
    /// Legacy per-controller mounts
    V1,
    /// Unified hierarchy
    V2,
}

impl CgroupVersion {
    /// The process-membership file for this version.
    pub fn procs_file(self) -> &'static str {
        match self {
            CgroupVersion::V1 => "tasks",
            CgroupVersion::V2 => "cgroup.procs",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("v1") {
            Ok(CgroupVersion::V1)
        } else if s.eq_ignore_ascii_case("v2") {
            Ok(CgroupVersion::V2)
        } else {
            Err(CgroupError::Parse(format!("invalid version tag '{}'", s)))
        }
    }
}

impl fmt::Display for CgroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CgroupVersion::V1 => write!(f, "V1"),
            CgroupVersion::V2 => write!(f, "V2"),
        }
    }
}

/// A kernel resource controller this library knows how to manage.
///
/// Closed set; the knob tables in [`crate::knobs`] are keyed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Controller {
    Memory,
    Cpu,
    Cpuset,
}

impl Controller {
    pub const ALL: [Controller; 3] = [Controller::Memory, Controller::Cpu, Controller::Cpuset];

    /// Userland name of the controller (e.g. "memory", not "memcg").
    pub fn name(self) -> &'static str {
        match self {
            Controller::Memory => "memory",
            Controller::Cpu => "cpu",
            Controller::Cpuset => "cpuset",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Controller::ALL
            .into_iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| CgroupError::UnknownController(name.to_string()))
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where (and how) one controller's hierarchy is reachable.
///
/// At most one live descriptor exists per controller per process. `owned`
/// records whether this process mounted the hierarchy itself and must
/// therefore unmount it during cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyDescriptor {
    pub controller: Controller,
    pub version: CgroupVersion,
    pub mount_path: PathBuf,
    pub owned: bool,
}

/// Input configuration for one `require` call.
///
/// Transient; constructed by the caller and consumed by a single
/// negotiation.
#[derive(Debug, Clone, Default)]
pub struct RequireOptions {
    /// Restrict negotiation to one hierarchy version. `Some(V1)` skips V2
    /// discovery entirely, for tests that exercise legacy semantics.
    pub only_version: Option<CgroupVersion>,

    /// Process to move into the test group as soon as negotiation
    /// succeeds.
    pub seed_pid: Option<u32>,
}

impl RequireOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_only_version(mut self, version: CgroupVersion) -> Self {
        self.only_version = Some(version);
        self
    }

    pub fn with_seed_pid(mut self, pid: u32) -> Self {
        self.seed_pid = Some(pid);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        assert_eq!(CgroupVersion::parse("V1").unwrap(), CgroupVersion::V1);
        assert_eq!(CgroupVersion::parse("v2").unwrap(), CgroupVersion::V2);
        assert!(CgroupVersion::parse("V3").is_err());
        assert!(CgroupVersion::parse("").is_err());
    }

    #[test]
    fn test_version_display_roundtrip() {
        for v in [CgroupVersion::V1, CgroupVersion::V2] {
            assert_eq!(CgroupVersion::parse(&v.to_string()).unwrap(), v);
        }
    }

    #[test]
    fn test_procs_file() {
        assert_eq!(CgroupVersion::V1.procs_file(), "tasks");
        assert_eq!(CgroupVersion::V2.procs_file(), "cgroup.procs");
    }

    #[test]
    fn test_controller_names() {
        assert_eq!(Controller::from_name("memory").unwrap(), Controller::Memory);
        assert_eq!(Controller::from_name("cpuset").unwrap(), Controller::Cpuset);

        let err = Controller::from_name("blkio").unwrap_err();
        assert!(matches!(err, CgroupError::UnknownController(_)));
    }

    #[test]
    fn test_require_options_builder() {
        let opts = RequireOptions::new()
            .with_only_version(CgroupVersion::V1)
            .with_seed_pid(42);

        assert_eq!(opts.only_version, Some(CgroupVersion::V1));
        assert_eq!(opts.seed_pid, Some(42));

        let opts = RequireOptions::default();
        assert!(opts.only_version.is_none());
        assert!(opts.seed_pid.is_none());
    }
}
