//! Version-independent knob reads and writes
//!
//! Knobs are addressed by logical name; the concrete filename is resolved
//! through the table in [`crate::knobs`] against the version the owning
//! hierarchy resolved to.

use std::path::PathBuf;

use tracing::debug;

use crate::context::CgroupContext;
use crate::error::{CgroupError, Result};
use crate::groups::GroupId;
use crate::knobs;
use crate::types::CgroupVersion;
use crate::utils;

impl CgroupContext {
    /// Resolve a logical knob name against a group's hierarchy.
    pub(crate) fn knob_path(&self, id: GroupId, logical: &str) -> Result<PathBuf> {
        let def = knobs::find(logical)?;
        let node = self.live_node(id)?;
        let root = &self.roots[node.root];

        if let Some(controller) = def.controller {
            if !root.controllers.contains(&controller) {
                return Err(CgroupError::ControllerNotAttached {
                    controller: controller.name().to_string(),
                    group: node.name.clone(),
                });
            }
        }

        let physical =
            def.physical(root.version, root.noprefix)
                .ok_or_else(|| CgroupError::KnobUnsupported {
                    knob: logical.to_string(),
                    version: root.version,
                })?;

        Ok(self.abs_path(id).join(physical.as_ref()))
    }

    /// Whether the knob exists for this group on the active version. Used
    /// by tests to branch behavior (e.g. skip without swap accounting).
    pub fn has_knob(&self, id: GroupId, logical: &str) -> Result<bool> {
        match self.knob_path(id, logical) {
            Ok(path) => Ok(path.exists()),
            Err(CgroupError::KnobUnsupported { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write a knob value. The value is passed through verbatim; failures
    /// carry the resolved path and the underlying error, and are never
    /// retried.
    pub fn write_knob(&self, id: GroupId, logical: &str, value: &str) -> Result<()> {
        let path = self.knob_path(id, logical)?;
        debug!(knob = %path.display(), value, "write");
        utils::write_cgroup_file(&path, value)
    }

    /// Write a numeric knob as decimal ASCII, the form every kernel knob
    /// expects.
    pub fn write_knob_u64(&self, id: GroupId, logical: &str, value: u64) -> Result<()> {
        self.write_knob(id, logical, &value.to_string())
    }

    /// Read a knob, trimmed of the trailing newline.
    pub fn read_knob(&self, id: GroupId, logical: &str) -> Result<String> {
        let path = self.knob_path(id, logical)?;
        Ok(utils::read_cgroup_file(&path)?.trim().to_string())
    }

    /// Read a byte-count knob losslessly as a 64-bit unsigned value.
    pub fn read_knob_u64(&self, id: GroupId, logical: &str) -> Result<u64> {
        let value = self.read_knob(id, logical)?;
        value.parse::<u64>().map_err(|_| {
            CgroupError::Parse(format!("'{}': expected a number, got '{}'", logical, value))
        })
    }

    /// Whether the knob's current contents contain `needle`.
    pub fn knob_contains(&self, id: GroupId, logical: &str, needle: &str) -> Result<bool> {
        Ok(self.read_knob(id, logical)?.contains(needle))
    }

    /// Move a process into the group by appending its PID to the
    /// version's membership file.
    pub fn move_process(&self, id: GroupId, pid: u32) -> Result<()> {
        let path = self.knob_path(id, "cgroup.procs")?;
        debug!(pid, group = %path.display(), "moving process");
        utils::append_cgroup_file(&path, &format!("{}\n", pid))
    }

    /// The group's CPU bandwidth limit as a (quota, period) pair in
    /// microseconds; `None` quota means unlimited.
    ///
    /// On V2 both live in `cpu.max` ("max 100000" or "50000 100000"); on
    /// V1 the quota is `cpu.cfs_quota_us` (-1 for unlimited) and the
    /// period its own file.
    pub fn cpu_quota_period(&self, id: GroupId) -> Result<(Option<u64>, u64)> {
        let version = self.roots[self.live_node(id)?.root].version;
        match version {
            CgroupVersion::V2 => {
                let raw = self.read_knob(id, "cpu.max")?;
                let mut parts = raw.split_whitespace();
                let quota = match parts.next() {
                    Some("max") => None,
                    Some(tok) => Some(tok.parse::<u64>().map_err(|_| {
                        CgroupError::Parse(format!("'cpu.max': invalid quota '{}'", tok))
                    })?),
                    None => return Err(CgroupError::Parse("'cpu.max' is empty".to_string())),
                };
                let period = parts
                    .next()
                    .ok_or_else(|| CgroupError::Parse("'cpu.max': missing period".to_string()))?
                    .parse::<u64>()
                    .map_err(|_| CgroupError::Parse("'cpu.max': invalid period".to_string()))?;
                Ok((quota, period))
            }
            CgroupVersion::V1 => {
                let quota = self.read_knob(id, "cpu.max")?.parse::<i64>().map_err(|_| {
                    CgroupError::Parse("'cpu.cfs_quota_us': not a number".to_string())
                })?;
                let period = self.read_knob_u64(id, "cpu.cfs_period_us")?;
                Ok((if quota < 0 { None } else { Some(quota as u64) }, period))
            }
        }
    }
}
