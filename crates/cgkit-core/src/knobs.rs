//! Logical-to-physical knob name tables
//!
//! Controller attribute files are addressed by a logical name which is the
//! V2 name unless the knob only exists on V1. Each entry records the
//! concrete filename for both versions; a missing side means the knob does
//! not exist there and must surface as `KnobUnsupported` instead of an
//! attempted write.

use std::borrow::Cow;

use crate::error::{CgroupError, Result};
use crate::types::{CgroupVersion, Controller};

/// One controller attribute file.
#[derive(Debug)]
pub(crate) struct KnobDef {
    /// Canonical (lookup) name.
    pub name: &'static str,
    /// Concrete filename under V2, if the knob exists there.
    pub v2_name: Option<&'static str>,
    /// Concrete filename under V1, if the knob exists there.
    pub v1_name: Option<&'static str>,
    /// Owning controller, or `None` for the `cgroup.*` core files.
    pub controller: Option<Controller>,
}

/* The `cgroup.procs` file exists on V1 as well, but it was read-only until
 * kernel v3.0, so the V1 side uses `tasks`.
 */
static KNOBS: &[KnobDef] = &[
    KnobDef {
        name: "cgroup.procs",
        v2_name: Some("cgroup.procs"),
        v1_name: Some("tasks"),
        controller: None,
    },
    KnobDef {
        name: "cgroup.controllers",
        v2_name: Some("cgroup.controllers"),
        v1_name: None,
        controller: None,
    },
    KnobDef {
        name: "cgroup.subtree_control",
        v2_name: Some("cgroup.subtree_control"),
        v1_name: None,
        controller: None,
    },
    KnobDef {
        name: "cgroup.clone_children",
        v2_name: None,
        v1_name: Some("cgroup.clone_children"),
        controller: None,
    },
    KnobDef {
        name: "memory.current",
        v2_name: Some("memory.current"),
        v1_name: Some("memory.usage_in_bytes"),
        controller: Some(Controller::Memory),
    },
    KnobDef {
        name: "memory.min",
        v2_name: Some("memory.min"),
        v1_name: None,
        controller: Some(Controller::Memory),
    },
    KnobDef {
        name: "memory.max",
        v2_name: Some("memory.max"),
        v1_name: Some("memory.limit_in_bytes"),
        controller: Some(Controller::Memory),
    },
    KnobDef {
        name: "memory.stat",
        v2_name: Some("memory.stat"),
        v1_name: Some("memory.stat"),
        controller: Some(Controller::Memory),
    },
    KnobDef {
        name: "memory.swappiness",
        v2_name: Some("memory.swappiness"),
        v1_name: Some("memory.swappiness"),
        controller: Some(Controller::Memory),
    },
    KnobDef {
        name: "memory.swap.current",
        v2_name: Some("memory.swap.current"),
        v1_name: Some("memory.memsw.usage_in_bytes"),
        controller: Some(Controller::Memory),
    },
    KnobDef {
        name: "memory.swap.max",
        v2_name: Some("memory.swap.max"),
        v1_name: Some("memory.memsw.limit_in_bytes"),
        controller: Some(Controller::Memory),
    },
    KnobDef {
        name: "memory.kmem.usage_in_bytes",
        v2_name: None,
        v1_name: Some("memory.kmem.usage_in_bytes"),
        controller: Some(Controller::Memory),
    },
    KnobDef {
        name: "memory.kmem.limit_in_bytes",
        v2_name: None,
        v1_name: Some("memory.kmem.limit_in_bytes"),
        controller: Some(Controller::Memory),
    },
    /* The V1 quota and period files were combined into the V2 `cpu.max`
     * file. Writing a single value to `cpu.max` sets the quota; the period
     * must be read or written through `cpu.cfs_period_us` on V1.
     */
    KnobDef {
        name: "cpu.max",
        v2_name: Some("cpu.max"),
        v1_name: Some("cpu.cfs_quota_us"),
        controller: Some(Controller::Cpu),
    },
    KnobDef {
        name: "cpu.cfs_period_us",
        v2_name: None,
        v1_name: Some("cpu.cfs_period_us"),
        controller: Some(Controller::Cpu),
    },
    KnobDef {
        name: "cpuset.cpus",
        v2_name: Some("cpuset.cpus"),
        v1_name: Some("cpuset.cpus"),
        controller: Some(Controller::Cpuset),
    },
    KnobDef {
        name: "cpuset.mems",
        v2_name: Some("cpuset.mems"),
        v1_name: Some("cpuset.mems"),
        controller: Some(Controller::Cpuset),
    },
    KnobDef {
        name: "cpuset.memory_migrate",
        v2_name: None,
        v1_name: Some("cpuset.memory_migrate"),
        controller: Some(Controller::Cpuset),
    },
];

impl KnobDef {
    /// The on-disk filename for the given hierarchy version.
    ///
    /// `noprefix` covers cpuset hierarchies mounted in compatibility mode,
    /// where the files lose their `cpuset.` prefix.
    pub fn physical(&self, version: CgroupVersion, noprefix: bool) -> Option<Cow<'static, str>> {
        let name = match version {
            CgroupVersion::V2 => self.v2_name?,
            CgroupVersion::V1 => self.v1_name?,
        };

        if version == CgroupVersion::V1
            && noprefix
            && self.controller == Some(Controller::Cpuset)
        {
            if let Some(stripped) = name.strip_prefix("cpuset.") {
                return Some(Cow::Owned(stripped.to_string()));
            }
        }

        Some(Cow::Borrowed(name))
    }
}

/// Look up a logical knob name, validating its controller prefix.
pub(crate) fn find(logical: &str) -> Result<&'static KnobDef> {
    let (prefix, _) = logical
        .split_once('.')
        .filter(|(p, _)| !p.is_empty())
        .ok_or_else(|| CgroupError::UnknownKnob(logical.to_string()))?;

    if prefix != "cgroup" {
        Controller::from_name(prefix)?;
    }

    KNOBS
        .iter()
        .find(|def| def.name == logical)
        .ok_or_else(|| CgroupError::UnknownKnob(logical.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_known_knobs() {
        assert_eq!(find("memory.max").unwrap().name, "memory.max");
        assert_eq!(
            find("cgroup.procs").unwrap().v1_name,
            Some("tasks")
        );
        assert_eq!(find("cpu.max").unwrap().controller, Some(Controller::Cpu));
    }

    #[test]
    fn test_find_unknown_controller() {
        let err = find("blkio.weight").unwrap_err();
        assert!(matches!(err, CgroupError::UnknownController(_)));
    }

    #[test]
    fn test_find_unknown_knob() {
        let err = find("memory.nonsense").unwrap_err();
        assert!(matches!(err, CgroupError::UnknownKnob(_)));

        let err = find("noseparator").unwrap_err();
        assert!(matches!(err, CgroupError::UnknownKnob(_)));
    }

    #[test]
    fn test_physical_mapping() {
        let def = find("memory.max").unwrap();
        assert_eq!(
            def.physical(CgroupVersion::V2, false).unwrap(),
            "memory.max"
        );
        assert_eq!(
            def.physical(CgroupVersion::V1, false).unwrap(),
            "memory.limit_in_bytes"
        );
    }

    #[test]
    fn test_version_only_knobs() {
        let min = find("memory.min").unwrap();
        assert!(min.physical(CgroupVersion::V1, false).is_none());
        assert!(min.physical(CgroupVersion::V2, false).is_some());

        let clone = find("cgroup.clone_children").unwrap();
        assert!(clone.physical(CgroupVersion::V2, false).is_none());
        assert!(clone.physical(CgroupVersion::V1, false).is_some());

        let kmem = find("memory.kmem.limit_in_bytes").unwrap();
        assert!(kmem.physical(CgroupVersion::V2, false).is_none());
    }

    #[test]
    fn test_noprefix_cpuset_alias() {
        let cpus = find("cpuset.cpus").unwrap();
        assert_eq!(cpus.physical(CgroupVersion::V1, true).unwrap(), "cpus");
        assert_eq!(
            cpus.physical(CgroupVersion::V1, false).unwrap(),
            "cpuset.cpus"
        );
        // noprefix only applies to cpuset files
        let mem = find("memory.max").unwrap();
        assert_eq!(
            mem.physical(CgroupVersion::V1, true).unwrap(),
            "memory.limit_in_bytes"
        );
    }
}
