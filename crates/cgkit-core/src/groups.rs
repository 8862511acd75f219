//! Group lifecycle management
//!
//! Groups live in an arena indexed by stable [`GroupId`]s; parent/child
//! relationships are index references, so a failed removal can never leave
//! dangling links. The on-disk directory tree and the in-memory child sets
//! stay consistent: a group is unlinked only after its directory is gone.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::context::CgroupContext;
use crate::error::{CgroupError, Result};
use crate::utils;

/// Stable handle to a group owned by a [`CgroupContext`].
///
/// Borrowed by callers; invalidated by the corresponding removal, never
/// freed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub(crate) usize);

#[derive(Debug)]
pub(crate) struct GroupNode {
    pub name: String,
    /// Path relative to the hierarchy mount root; empty for the root node.
    pub rel_path: PathBuf,
    /// Index of the owning hierarchy in the context's root list.
    pub root: usize,
    pub parent: Option<GroupId>,
    pub children: Vec<GroupId>,
    pub is_drain: bool,
    pub alive: bool,
}

#[derive(Debug, Default)]
pub(crate) struct GroupArena {
    nodes: Vec<GroupNode>,
}

impl GroupArena {
    pub fn alloc_root(&mut self, root: usize) -> GroupId {
        self.nodes.push(GroupNode {
            name: String::new(),
            rel_path: PathBuf::new(),
            root,
            parent: None,
            children: Vec::new(),
            is_drain: false,
            alive: true,
        });
        GroupId(self.nodes.len() - 1)
    }

    pub fn alloc_child(&mut self, parent: GroupId, name: &str, is_drain: bool) -> GroupId {
        let rel_path = self.nodes[parent.0].rel_path.join(name);
        let root = self.nodes[parent.0].root;
        self.nodes.push(GroupNode {
            name: name.to_string(),
            rel_path,
            root,
            parent: Some(parent),
            children: Vec::new(),
            is_drain,
            alive: true,
        });
        let id = GroupId(self.nodes.len() - 1);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn node(&self, id: GroupId) -> &GroupNode {
        &self.nodes[id.0]
    }

    pub fn is_alive(&self, id: GroupId) -> bool {
        self.nodes[id.0].alive
    }

    /// Detach a node after its directory is gone.
    pub fn unlink(&mut self, id: GroupId) {
        if let Some(parent) = self.nodes[id.0].parent {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
        self.nodes[id.0].alive = false;
    }

    /// The subtree under `id`, children before parents, `id` last.
    pub fn postorder(&self, id: GroupId) -> Vec<GroupId> {
        let mut out = Vec::new();
        for &child in &self.nodes[id.0].children {
            out.extend(self.postorder(child));
        }
        out.push(id);
        out
    }
}

/// Move every PID listed in `src`'s membership file into `dst`'s.
///
/// PIDs that exit between listing and writing are skipped; that race is
/// expected during teardown. A missing membership file means the group
/// vanished concurrently and there is nothing left to migrate.
pub(crate) fn drain_paths(src: &Path, dst: &Path, procs_file: &str) -> Result<()> {
    let content = match utils::read_cgroup_file(&src.join(procs_file)) {
        Ok(c) => c,
        Err(ref e) if utils::is_not_found(e) => return Ok(()),
        Err(e) => return Err(e),
    };

    let dst_procs = dst.join(procs_file);
    for pid in utils::parse_pids(&content) {
        match utils::append_cgroup_file(&dst_procs, &format!("{}\n", pid)) {
            Ok(()) => {}
            Err(ref e) if utils::raw_errno(e) == Some(libc::ESRCH) => {
                debug!(pid, "process exited during drain");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// Map a directory-removal failure onto the lifecycle error taxonomy.
pub(crate) fn remove_group_dir(path: &Path) -> Result<()> {
    fs::remove_dir(path).map_err(|e| match e.raw_os_error() {
        Some(libc::EBUSY) | Some(libc::ENOTEMPTY) => {
            CgroupError::GroupBusy(path.display().to_string())
        }
        _ => CgroupError::io(path, e),
    })
}

impl CgroupContext {
    pub(crate) fn live_node(&self, id: GroupId) -> Result<&GroupNode> {
        let node = self.arena.node(id);
        if !node.alive {
            return Err(CgroupError::StaleGroup(node.name.clone()));
        }
        Ok(node)
    }

    /// Absolute path of a group's directory.
    pub(crate) fn abs_path(&self, id: GroupId) -> PathBuf {
        let node = self.arena.node(id);
        let mount = &self.roots[node.root].mount_path;
        if node.rel_path.as_os_str().is_empty() {
            mount.clone()
        } else {
            mount.join(&node.rel_path)
        }
    }

    /// Name of the group (empty for a hierarchy root).
    pub fn group_name(&self, id: GroupId) -> &str {
        &self.arena.node(id).name
    }

    /// Create a named group under `parent`.
    ///
    /// On V2 the required controllers are enabled for the parent's children
    /// as part of creation. The new group is registered as a child of
    /// `parent`.
    pub fn create_group(&mut self, parent: GroupId, name: &str) -> Result<GroupId> {
        if name.is_empty() || name.contains('/') {
            return Err(CgroupError::Parse(format!("invalid group name '{}'", name)));
        }

        let node = self.live_node(parent)?;
        if node.is_drain {
            return Err(CgroupError::Protected(format!(
                "the drain group cannot have children ('{}' requested)",
                name
            )));
        }

        let parent_path = self.abs_path(parent);
        let path = parent_path.join(name);
        if let Err(e) = fs::create_dir(&path) {
            return Err(match e.raw_os_error() {
                Some(libc::EEXIST) => CgroupError::GroupExists(path.display().to_string()),
                Some(libc::ENOENT) => CgroupError::ParentGone(parent_path.display().to_string()),
                _ => CgroupError::io(&path, e),
            });
        }

        let id = self.arena.alloc_child(parent, name, false);
        self.enable_subtree_controllers(parent)?;

        debug!(group = %path.display(), "created group");
        Ok(id)
    }

    /// Remove a group, recursively removing its registered children first
    /// (children before parents; removing a non-empty directory fails on
    /// every supported kernel).
    ///
    /// Occupant processes are **not** migrated; callers drain first. On
    /// failure the group (and any unremoved descendants) stay registered,
    /// and the handle remains valid for a retry.
    pub fn remove_group(&mut self, id: GroupId) -> Result<()> {
        let node = self.live_node(id)?;
        if node.is_drain {
            return Err(CgroupError::Protected(
                "the drain group is never removed mid-test".to_string(),
            ));
        }
        if node.parent.is_none() {
            return Err(CgroupError::Protected(
                "hierarchy roots are unmounted, not removed".to_string(),
            ));
        }

        let children = node.children.clone();
        for child in children {
            self.remove_group(child)?;
        }
        self.remove_single(id)
    }

    /// Remove one registered directory, bypassing the protection checks.
    pub(crate) fn remove_single(&mut self, id: GroupId) -> Result<()> {
        let path = self.abs_path(id);
        remove_group_dir(&path)?;
        self.arena.unlink(id);
        debug!(group = %path.display(), "removed group");
        Ok(())
    }

    /// Evacuate every member process of `group` into the controller's
    /// drain group.
    pub fn drain_group(&mut self, id: GroupId) -> Result<()> {
        let node = self.live_node(id)?;
        let root_idx = node.root;
        let drain = self.roots[root_idx].drain.ok_or_else(|| {
            CgroupError::InconsistentScan(
                "no drain group; controller was never negotiated".to_string(),
            )
        })?;
        if drain == id {
            // The drain group is the terminal destination.
            return Ok(());
        }

        let procs = self.roots[root_idx].version.procs_file();
        drain_paths(&self.abs_path(id), &self.abs_path(drain), procs)
    }
}
