//! Mount table scanning and hierarchy classification
//!
//! Inspects the mount table to decide which cgroup versions are active and
//! where each controller's hierarchy root lives. Purely observational; the
//! same classification runs against the live system (via procfs) or an
//! injected mount table for simulated system states.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CgroupError, Result};
use crate::types::{CgroupVersion, Controller};
use crate::utils;

/// One row of the mount table, reduced to what hierarchy classification
/// needs.
#[derive(Debug, Clone)]
pub struct MountEntry {
    /// Filesystem type ("cgroup" or "cgroup2"); other types are ignored.
    pub fs_type: String,
    /// Absolute mount point.
    pub mount_point: PathBuf,
    /// Superblock options. For V1 these carry the attached controller
    /// names (and possibly "noprefix").
    pub options: Vec<String>,
}

impl MountEntry {
    /// A V2 unified-hierarchy mount at `mount_point`.
    pub fn cgroup2(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            fs_type: "cgroup2".to_string(),
            mount_point: mount_point.into(),
            options: Vec::new(),
        }
    }

    /// A V1 mount at `mount_point` carrying the given option list.
    pub fn cgroup1(mount_point: impl Into<PathBuf>, options: &[&str]) -> Self {
        Self {
            fs_type: "cgroup".to_string(),
            mount_point: mount_point.into(),
            options: options.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Read the cgroup rows of this process's mount table.
pub fn system_mounts() -> Result<Vec<MountEntry>> {
    let me = procfs::process::Process::myself()
        .map_err(|e| CgroupError::MountTable(e.to_string()))?;
    let mounts = me
        .mountinfo()
        .map_err(|e| CgroupError::MountTable(e.to_string()))?;

    Ok(mounts
        .0
        .into_iter()
        .filter(|m| m.fs_type.starts_with("cgroup"))
        .map(|m| MountEntry {
            fs_type: m.fs_type,
            mount_point: m.mount_point,
            options: m.super_options.keys().cloned().collect(),
        })
        .collect())
}

/// One unique hierarchy root found during a scan.
#[derive(Debug, Clone)]
pub(crate) struct ScannedRoot {
    pub version: CgroupVersion,
    pub mount_path: PathBuf,
    /// Controllers attached to this hierarchy.
    pub controllers: Vec<Controller>,
    /// V2 only: controllers currently enabled for children of the root.
    pub enabled: Vec<Controller>,
    /// V1 cpuset compatibility mode (files lose their "cpuset." prefix).
    pub noprefix: bool,
}

pub(crate) fn same_set(a: &[Controller], b: &[Controller]) -> bool {
    a.len() == b.len() && a.iter().all(|c| b.contains(c))
}

pub(crate) fn intersects(a: &[Controller], b: &[Controller]) -> bool {
    a.iter().any(|c| b.contains(c))
}

fn parse_controller_list(content: &str) -> Vec<Controller> {
    content
        .split_whitespace()
        .filter_map(|tok| Controller::from_name(tok.trim_start_matches('+')).ok())
        .collect()
}

fn scan_v2_root(mount_point: &Path) -> Result<ScannedRoot> {
    let controllers =
        parse_controller_list(&utils::read_cgroup_file(&mount_point.join("cgroup.controllers"))?);

    let enabled = match utils::read_cgroup_file(&mount_point.join("cgroup.subtree_control")) {
        Ok(content) => parse_controller_list(&content),
        Err(ref e) if utils::is_not_found(e) => Vec::new(),
        Err(e) => return Err(e),
    };

    Ok(ScannedRoot {
        version: CgroupVersion::V2,
        mount_path: mount_point.to_path_buf(),
        controllers,
        enabled,
        noprefix: false,
    })
}

/* Classify mount rows into unique hierarchy roots.
 *
 * V2 is simple: there is exactly one unified hierarchy, so every cgroup2
 * row refers to the same tree and only the first mount point is kept.
 *
 * For V1 the controller set is partitioned across mounts; one partition
 * can be mounted in several places, but a controller never appears in two
 * partitions. A repeat mount of a known partition is discarded; a mount
 * whose controller set overlaps a known partition without matching it
 * means the mount table is changing under us.
 */
pub(crate) fn classify(entries: &[MountEntry]) -> Result<Vec<ScannedRoot>> {
    let mut roots: Vec<ScannedRoot> = Vec::new();

    for entry in entries {
        match entry.fs_type.as_str() {
            "cgroup2" => {
                if roots.iter().any(|r| r.version == CgroupVersion::V2) {
                    continue;
                }
                roots.push(scan_v2_root(&entry.mount_point)?);
            }
            "cgroup" => {
                let controllers: Vec<Controller> = entry
                    .options
                    .iter()
                    .filter_map(|opt| Controller::from_name(opt).ok())
                    .collect();
                if controllers.is_empty() {
                    continue;
                }

                let noprefix = entry.options.iter().any(|opt| opt == "noprefix");

                let mut known = false;
                for root in roots.iter().filter(|r| r.version == CgroupVersion::V1) {
                    if same_set(&controllers, &root.controllers) {
                        known = true;
                        break;
                    }
                    if intersects(&controllers, &root.controllers) {
                        return Err(CgroupError::InconsistentScan(format!(
                            "controller partitions overlap between '{}' and '{}'",
                            root.mount_path.display(),
                            entry.mount_point.display()
                        )));
                    }
                }
                if known {
                    continue;
                }

                debug!(
                    mount = %entry.mount_point.display(),
                    controllers = controllers.len(),
                    "found V1 hierarchy"
                );
                roots.push(ScannedRoot {
                    version: CgroupVersion::V1,
                    mount_path: entry.mount_point.clone(),
                    controllers,
                    enabled: Vec::new(),
                    noprefix,
                });
            }
            _ => {}
        }
    }

    Ok(roots)
}
