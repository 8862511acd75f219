//! Process-wide cgroup state: discovery, negotiation and teardown
//!
//! All discovered hierarchy state lives in an explicit [`CgroupContext`]
//! constructed by the caller, passed to every operation and torn down by a
//! final [`CgroupContext::cleanup`]. The context executes synchronously in
//! whichever process owns it; correctness across processes rests on the
//! filesystem, not in-process locks.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use nix::errno::Errno;
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use tracing::{debug, info, warn};

use crate::config;
use crate::error::{CgroupError, Result};
use crate::groups::{self, GroupArena, GroupId};
use crate::scanner::{self, MountEntry, ScannedRoot};
use crate::types::{CgroupVersion, Controller, HierarchyDescriptor, RequireOptions};
use crate::utils;

/// Where privately-mounted hierarchies go.
pub(crate) const MOUNT_PREFIX: &str = "/tmp/cgroup_";
pub(crate) const UNIFIED_MOUNT_NAME: &str = "unified";
/// Our directory under each hierarchy root; holds the drain and test groups.
pub(crate) const BASE_DIR: &str = "cgkit";
pub(crate) const DRAIN_DIR: &str = "drain";

/// One unique hierarchy root and the groups we keep in it.
#[derive(Debug)]
pub(crate) struct RootState {
    pub version: CgroupVersion,
    pub mount_path: PathBuf,
    /// Controllers attached to this hierarchy.
    pub controllers: Vec<Controller>,
    /// V2 only: controllers enabled for children of the root, as of the
    /// last scan.
    pub enabled: Vec<Controller>,
    pub noprefix: bool,
    /// We mounted this hierarchy and must unmount it at cleanup.
    pub owned: bool,
    /// We created the mount point directory itself.
    pub created_mount_dir: bool,
    pub created_base: bool,
    pub mnt: Option<GroupId>,
    pub base: Option<GroupId>,
    pub drain: Option<GroupId>,
    pub test: Option<GroupId>,
}

impl RootState {
    fn from_scan(sr: ScannedRoot) -> Self {
        Self {
            version: sr.version,
            mount_path: sr.mount_path,
            controllers: sr.controllers,
            enabled: sr.enabled,
            noprefix: sr.noprefix,
            owned: false,
            created_mount_dir: false,
            created_base: false,
            mnt: None,
            base: None,
            drain: None,
            test: None,
        }
    }
}

/// Per-controller result of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanOutcome {
    /// Usable as-is; index of the hierarchy root.
    Found(usize),
    /// Present on the unified hierarchy but not yet enabled for children;
    /// negotiation may still succeed through the enable list.
    FoundDisabled(usize),
    NotFound,
}

/// Discovered cgroup layout plus the groups created through it.
pub struct CgroupContext {
    pub(crate) roots: Vec<RootState>,
    pub(crate) arena: GroupArena,
    pub(crate) required: Vec<Controller>,
    /// Injected mount table for simulated system states; disables private
    /// mounting.
    mount_table: Option<Vec<MountEntry>>,
    /// Reconstructed from a serialized config; cleanup walks the disk
    /// instead of the arena.
    loaded: bool,
    test_dir_name: String,
}

impl Default for CgroupContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CgroupContext {
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            arena: GroupArena::default(),
            required: Vec::new(),
            mount_table: None,
            loaded: false,
            test_dir_name: format!("test-{}", process::id()),
        }
    }

    /// A context that scans the given mount table instead of the live
    /// system. Negotiation against such a context never mounts anything;
    /// a controller the table cannot satisfy is simply unsupported.
    pub fn with_mount_table(entries: Vec<MountEntry>) -> Self {
        Self {
            mount_table: Some(entries),
            ..Self::new()
        }
    }

    /// Rebuild a context from a serialized config produced by another
    /// process, trusting the recorded state verbatim (no mount probing).
    pub fn from_config(text: &str) -> Result<Self> {
        let mut ctx = Self::new();
        ctx.loaded = true;

        for desc in config::deserialize(text)? {
            if ctx.required.contains(&desc.controller) {
                return Err(CgroupError::Parse(format!(
                    "duplicate controller '{}' in config",
                    desc.controller
                )));
            }
            ctx.required.push(desc.controller);

            if let Some(root) = ctx
                .roots
                .iter_mut()
                .find(|r| r.mount_path == desc.mount_path)
            {
                if root.version != desc.version {
                    return Err(CgroupError::Parse(format!(
                        "conflicting versions recorded for mount '{}'",
                        desc.mount_path.display()
                    )));
                }
                root.owned |= desc.owned;
                root.controllers.push(desc.controller);
            } else {
                ctx.roots.push(RootState {
                    version: desc.version,
                    mount_path: desc.mount_path,
                    controllers: vec![desc.controller],
                    enabled: Vec::new(),
                    noprefix: false,
                    owned: desc.owned,
                    created_mount_dir: desc.owned,
                    created_base: desc.owned,
                    mnt: None,
                    base: None,
                    drain: None,
                    test: None,
                });
            }
        }

        Ok(ctx)
    }

    /// Inspect the mount table and merge what it shows into this context.
    ///
    /// Observational and idempotent; repeated scans only refresh the V2
    /// enable list and surface hierarchies mounted since the last call.
    pub fn scan(&mut self) -> Result<()> {
        let entries = match &self.mount_table {
            Some(table) => table.clone(),
            None => scanner::system_mounts()?,
        };
        for sr in scanner::classify(&entries)? {
            self.merge_root(sr)?;
        }
        Ok(())
    }

    fn merge_root(&mut self, sr: ScannedRoot) -> Result<()> {
        match sr.version {
            CgroupVersion::V2 => {
                if let Some(root) = self
                    .roots
                    .iter_mut()
                    .find(|r| r.version == CgroupVersion::V2)
                {
                    if !scanner::same_set(&root.controllers, &sr.controllers) {
                        return Err(CgroupError::InconsistentScan(
                            "available V2 controllers are changing between scans".to_string(),
                        ));
                    }
                    root.enabled = sr.enabled;
                    return Ok(());
                }
            }
            CgroupVersion::V1 => {
                for root in self.roots.iter().filter(|r| r.version == CgroupVersion::V1) {
                    if scanner::same_set(&root.controllers, &sr.controllers) {
                        return Ok(());
                    }
                    if scanner::intersects(&root.controllers, &sr.controllers) {
                        return Err(CgroupError::InconsistentScan(format!(
                            "controller partitions overlap between '{}' and '{}'",
                            root.mount_path.display(),
                            sr.mount_path.display()
                        )));
                    }
                }
            }
        }
        self.roots.push(RootState::from_scan(sr));
        Ok(())
    }

    pub(crate) fn scan_outcome(&self, controller: Controller) -> ScanOutcome {
        for (i, root) in self.roots.iter().enumerate() {
            if !root.controllers.contains(&controller) {
                continue;
            }
            return match root.version {
                CgroupVersion::V1 => ScanOutcome::Found(i),
                CgroupVersion::V2 => {
                    if root.enabled.contains(&controller) {
                        ScanOutcome::Found(i)
                    } else {
                        ScanOutcome::FoundDisabled(i)
                    }
                }
            };
        }
        ScanOutcome::NotFound
    }

    pub(crate) fn find_controller_root(&self, controller: Controller) -> Option<usize> {
        self.roots
            .iter()
            .position(|r| r.controllers.contains(&controller))
    }

    fn v2_mounted(&self) -> bool {
        self.roots.iter().any(|r| r.version == CgroupVersion::V2)
    }

    fn can_mount(&self) -> bool {
        self.mount_table.is_none()
    }

    fn missing_of(&self, controllers: &[Controller]) -> Vec<Controller> {
        controllers
            .iter()
            .copied()
            .filter(|c| self.scan_outcome(*c) == ScanOutcome::NotFound)
            .collect()
    }

    /// Guarantee the controller has a live, writable hierarchy, mounting a
    /// private one if the system default does not expose it. On success the
    /// controller's test and drain groups exist and [`Self::test_group`]
    /// returns a handle the caller can create groups under.
    pub fn require(&mut self, controller: Controller, options: &RequireOptions) -> Result<()> {
        self.require_together(&[controller], options)
    }

    /// [`Self::require`] for several controllers needed together. When the
    /// controllers are only available by private mounting on V1 they are
    /// mounted jointly, so all of them resolve to the same mount point.
    pub fn require_together(
        &mut self,
        controllers: &[Controller],
        options: &RequireOptions,
    ) -> Result<()> {
        for &ctrl in controllers {
            if self.required.contains(&ctrl) {
                warn!(controller = %ctrl, "duplicate require");
            }
        }

        self.scan()?;

        if !self.missing_of(controllers).is_empty()
            && options.only_version != Some(CgroupVersion::V1)
            && !self.v2_mounted()
            && self.can_mount()
        {
            self.mount_unified()?;
        }

        let missing = self.missing_of(controllers);
        if !missing.is_empty() && options.only_version != Some(CgroupVersion::V2) && self.can_mount()
        {
            self.mount_v1(&missing)?;
        }

        for &ctrl in controllers {
            let root_idx = match self.scan_outcome(ctrl) {
                ScanOutcome::NotFound => {
                    return Err(CgroupError::ControllerUnsupported(ctrl.name().to_string()))
                }
                ScanOutcome::Found(i) | ScanOutcome::FoundDisabled(i) => i,
            };

            if let Some(version) = options.only_version {
                if self.roots[root_idx].version != version {
                    // e.g. V1 semantics required but the controller lives
                    // on the unified hierarchy; a skip, not a failure.
                    return Err(CgroupError::ControllerUnsupported(ctrl.name().to_string()));
                }
            }

            self.attach_controller(root_idx, ctrl)?;

            if !self.required.contains(&ctrl) {
                self.required.push(ctrl);
            }

            if let Some(pid) = options.seed_pid {
                let test = self.roots[root_idx].test.ok_or_else(|| {
                    CgroupError::InconsistentScan("test group missing after attach".to_string())
                })?;
                self.move_process(test, pid)?;
            }
        }

        Ok(())
    }

    /// Make the controller usable under `roots[root_idx]` and ensure the
    /// base, drain and test groups exist there.
    fn attach_controller(&mut self, root_idx: usize, ctrl: Controller) -> Result<()> {
        let version = self.roots[root_idx].version;
        let owned = self.roots[root_idx].owned;

        if version == CgroupVersion::V2 {
            let path = self.roots[root_idx].mount_path.join("cgroup.subtree_control");
            match utils::write_cgroup_file(&path, &format!("+{}", ctrl.name())) {
                Ok(()) => {}
                Err(e) if owned => return Err(e),
                Err(e) => {
                    // Pre-existing root; the controller may already be
                    // delegated or the enable list may be managed elsewhere.
                    warn!(controller = %ctrl, error = %e, "could not enable controller on root");
                }
            }
        }

        if self.roots[root_idx].mnt.is_none() {
            let id = self.arena.alloc_root(root_idx);
            self.roots[root_idx].mnt = Some(id);
        }
        let mnt = self.roots[root_idx].mnt.unwrap();

        if self.roots[root_idx].base.is_none() {
            let (id, created) = self.ensure_dir_node(mnt, BASE_DIR, false)?;
            self.roots[root_idx].base = Some(id);
            self.roots[root_idx].created_base = created;
        }
        let base = self.roots[root_idx].base.unwrap();

        match version {
            CgroupVersion::V2 => {
                self.write_knob(base, "cgroup.subtree_control", &format!("+{}", ctrl.name()))?;
            }
            CgroupVersion::V1 => {
                // Distribute settings to child groups as they are created.
                self.write_knob(base, "cgroup.clone_children", "1")?;
                if ctrl == Controller::Cpuset {
                    self.copy_cpuset(mnt, base)?;
                }
            }
        }

        if self.roots[root_idx].drain.is_none() {
            let (id, _) = self.ensure_dir_node(base, DRAIN_DIR, true)?;
            self.roots[root_idx].drain = Some(id);
        }
        if self.roots[root_idx].test.is_none() {
            let name = self.test_dir_name.clone();
            let (id, _) = self.ensure_dir_node(base, &name, false)?;
            self.roots[root_idx].test = Some(id);
        }

        Ok(())
    }

    /// A cpuset group starts empty; copy the root's available cpus and
    /// mems into the base group so tests do not have to.
    fn copy_cpuset(&self, mnt: GroupId, base: GroupId) -> Result<()> {
        for knob in ["cpuset.cpus", "cpuset.mems"] {
            let value = self.read_knob(mnt, knob)?;
            self.write_knob(base, knob, &value)?;
        }
        Ok(())
    }

    /// Mkdir-or-reuse a directory and register it in the arena. Returns
    /// the node and whether we created the directory.
    pub(crate) fn ensure_dir_node(
        &mut self,
        parent: GroupId,
        name: &str,
        is_drain: bool,
    ) -> Result<(GroupId, bool)> {
        let path = self.abs_path(parent).join(name);
        let created = match fs::create_dir(&path) {
            Ok(()) => true,
            Err(e) if e.raw_os_error() == Some(libc::EEXIST) => false,
            Err(e) if e.raw_os_error() == Some(libc::EACCES) => {
                return Err(CgroupError::PermissionDenied(format!(
                    "lack permission to make '{}'; premake it or run as root",
                    path.display()
                )));
            }
            Err(e) => return Err(CgroupError::io(&path, e)),
        };
        Ok((self.arena.alloc_child(parent, name, is_drain), created))
    }

    /// Enable the required controllers for children of `parent` (V2 only;
    /// V1 inherits through clone_children).
    pub(crate) fn enable_subtree_controllers(&self, parent: GroupId) -> Result<()> {
        let root = &self.roots[self.arena.node(parent).root];
        if root.version != CgroupVersion::V2 {
            return Ok(());
        }
        for ctrl in self
            .required
            .iter()
            .filter(|c| root.controllers.contains(c))
        {
            self.write_knob(parent, "cgroup.subtree_control", &format!("+{}", ctrl.name()))?;
        }
        Ok(())
    }

    fn mount_unified(&mut self) -> Result<()> {
        let path = PathBuf::from(format!("{}{}", MOUNT_PREFIX, UNIFIED_MOUNT_NAME));
        let made_dir = make_mount_dir(&path)?;

        if !mount_with_retry("cgroup2", &path, "cgroup2", None)? {
            if made_dir {
                if let Err(e) = fs::remove_dir(&path) {
                    debug!(path = %path.display(), error = %e, "could not remove mount dir");
                }
            }
            return Ok(());
        }

        info!(path = %path.display(), "mounted V2 hierarchy");
        self.scan()?;
        self.mark_owned(&path, made_dir);
        Ok(())
    }

    fn mount_v1(&mut self, controllers: &[Controller]) -> Result<()> {
        let names: Vec<&str> = controllers.iter().map(|c| c.name()).collect();
        let data = names.join(",");
        let path = PathBuf::from(format!("{}{}", MOUNT_PREFIX, data));
        let made_dir = make_mount_dir(&path)?;

        if !mount_with_retry(&data, &path, "cgroup", Some(&data))? {
            if made_dir {
                if let Err(e) = fs::remove_dir(&path) {
                    debug!(path = %path.display(), error = %e, "could not remove mount dir");
                }
            }
            return Ok(());
        }

        info!(path = %path.display(), controllers = %data, "mounted V1 hierarchy");
        self.scan()?;
        self.mark_owned(&path, made_dir);

        if controllers.contains(&Controller::Memory) {
            let knob = path.join("memory.use_hierarchy");
            match utils::write_cgroup_file(&knob, "1") {
                Ok(()) => {}
                Err(ref e) if utils::is_not_found(e) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    fn mark_owned(&mut self, path: &Path, made_dir: bool) {
        if let Some(root) = self.roots.iter_mut().find(|r| r.mount_path == path) {
            root.owned = true;
            root.created_mount_dir = made_dir;
        } else {
            warn!(path = %path.display(), "mounted hierarchy did not appear in rescan");
        }
    }

    /// Handle to the controller's test group, where the test's own process
    /// lives for the duration of the run.
    pub fn test_group(&self, controller: Controller) -> Result<GroupId> {
        let root_idx = self.negotiated_root(controller)?;
        self.roots[root_idx].test.ok_or_else(no_groups)
    }

    /// Handle to the controller's drain group.
    pub fn drain_handle(&self, controller: Controller) -> Result<GroupId> {
        let root_idx = self.negotiated_root(controller)?;
        self.roots[root_idx].drain.ok_or_else(no_groups)
    }

    /// The hierarchy version the controller resolved to.
    pub fn version_of(&self, controller: Controller) -> Result<CgroupVersion> {
        Ok(self.roots[self.negotiated_root(controller)?].version)
    }

    fn negotiated_root(&self, controller: Controller) -> Result<usize> {
        if !self.required.contains(&controller) {
            return Err(no_groups());
        }
        self.find_controller_root(controller).ok_or_else(no_groups)
    }

    /// One descriptor per required controller.
    pub fn descriptors(&self) -> Vec<HierarchyDescriptor> {
        self.required
            .iter()
            .filter_map(|&c| self.describe(c))
            .collect()
    }

    /// One descriptor per controller with a known hierarchy, required or
    /// not.
    pub fn detected_descriptors(&self) -> Vec<HierarchyDescriptor> {
        Controller::ALL
            .into_iter()
            .filter_map(|c| self.describe(c))
            .collect()
    }

    fn describe(&self, controller: Controller) -> Option<HierarchyDescriptor> {
        let root_idx = self.find_controller_root(controller)?;
        let root = &self.roots[root_idx];
        Some(HierarchyDescriptor {
            controller,
            version: root.version,
            mount_path: root.mount_path.clone(),
            owned: root.owned,
        })
    }

    /// Render the required controllers' state for a later, unrelated
    /// process.
    pub fn to_config(&self) -> String {
        config::serialize(&self.descriptors())
    }

    /// Tear down everything this context created, bottom-up: drain and
    /// remove the test groups, then the drain and base groups we created,
    /// disable controllers we enabled, and unmount hierarchies we mounted.
    /// In-memory state is cleared regardless.
    pub fn cleanup(&mut self) -> Result<()> {
        let result = if self.loaded {
            self.cleanup_discovered()
        } else {
            self.cleanup_live()
        };
        self.roots.clear();
        self.arena = GroupArena::default();
        self.required.clear();
        result
    }

    fn cleanup_live(&mut self) -> Result<()> {
        for i in 0..self.roots.len() {
            if let Some(test) = self.roots[i].test.take() {
                for id in self.arena.postorder(test) {
                    self.drain_group_via(id, i)?;
                    self.remove_single(id)?;
                }
            }
        }

        for i in 0..self.roots.len() {
            if !self.roots[i].created_base {
                continue;
            }
            let owned = self.roots[i].owned;
            let procs = self.roots[i].version.procs_file();

            if let Some(drain) = self.roots[i].drain.take() {
                let drain_path = self.abs_path(drain);
                groups::drain_paths(&drain_path, &self.roots[i].mount_path, procs)?;
                if remove_or_tolerate(&drain_path, owned)? {
                    self.arena.unlink(drain);
                }
            }
            if let Some(base) = self.roots[i].base.take() {
                let base_path = self.abs_path(base);
                if remove_or_tolerate(&base_path, owned)? {
                    self.arena.unlink(base);
                }
            }
        }

        self.disable_owned_controllers()?;
        self.unmount_owned()
    }

    /// Drain with an explicit root index, for nodes whose root field is
    /// already known (cleanup loops).
    fn drain_group_via(&self, id: GroupId, root_idx: usize) -> Result<()> {
        let drain = match self.roots[root_idx].drain {
            Some(d) if d != id => d,
            _ => return Ok(()),
        };
        let procs = self.roots[root_idx].version.procs_file();
        groups::drain_paths(&self.abs_path(id), &self.abs_path(drain), procs)
    }

    /// Cleanup for a context rebuilt from a serialized config: no arena,
    /// so walk the on-disk base directory and remove every test-created
    /// group found there.
    fn cleanup_discovered(&mut self) -> Result<()> {
        for i in 0..self.roots.len() {
            let mount_path = self.roots[i].mount_path.clone();
            let owned = self.roots[i].owned;
            let procs = self.roots[i].version.procs_file();
            let base = mount_path.join(BASE_DIR);

            if base.is_dir() {
                let drain = base.join(DRAIN_DIR);
                let drain_target = if drain.is_dir() {
                    drain.clone()
                } else {
                    mount_path.clone()
                };

                let entries = fs::read_dir(&base).map_err(|e| CgroupError::io(&base, e))?;
                for entry in entries {
                    let entry = entry.map_err(|e| CgroupError::io(&base, e))?;
                    let path = entry.path();
                    if path.is_dir() && entry.file_name() != DRAIN_DIR {
                        remove_tree(&path, &drain_target, procs)?;
                    }
                }

                if drain.is_dir() {
                    groups::drain_paths(&drain, &mount_path, procs)?;
                    remove_or_tolerate(&drain, owned)?;
                }
                remove_or_tolerate(&base, owned)?;
            }
        }

        self.disable_owned_controllers()?;
        self.unmount_owned()
    }

    fn disable_owned_controllers(&self) -> Result<()> {
        for root in &self.roots {
            if !(root.owned && root.version == CgroupVersion::V2) {
                continue;
            }
            let path = root.mount_path.join("cgroup.subtree_control");
            for ctrl in root
                .controllers
                .iter()
                .filter(|c| self.required.contains(c))
            {
                utils::write_cgroup_file(&path, &format!("-{}", ctrl.name()))?;
            }
        }
        Ok(())
    }

    fn unmount_owned(&self) -> Result<()> {
        for root in &self.roots {
            if !root.owned {
                continue;
            }
            if let Err(e) = umount2(&root.mount_path, MntFlags::MNT_DETACH) {
                warn!(path = %root.mount_path.display(), error = %e,
                      "could not unmount private hierarchy");
                continue;
            }
            info!(path = %root.mount_path.display(), "unmounted private hierarchy");
            if root.created_mount_dir {
                fs::remove_dir(&root.mount_path)
                    .map_err(|e| CgroupError::io(&root.mount_path, e))?;
            }
        }
        Ok(())
    }
}

fn no_groups() -> CgroupError {
    CgroupError::InconsistentScan(
        "no groups for this controller; maybe you forgot to call require?".to_string(),
    )
}

fn make_mount_dir(path: &Path) -> Result<bool> {
    match fs::create_dir(path) {
        Ok(()) => Ok(true),
        Err(e) if e.raw_os_error() == Some(libc::EEXIST) => Ok(false),
        Err(e) if e.raw_os_error() == Some(libc::EACCES) => {
            Err(CgroupError::PermissionDenied(format!(
                "lack permission to make '{}'; premake it or run as root",
                path.display()
            )))
        }
        Err(e) => Err(CgroupError::io(path, e)),
    }
}

/// Attempt a mount. `Ok(true)` on success, `Ok(false)` when the hierarchy
/// simply cannot be mounted here (kernel support, controller in use), and
/// an error for permission problems or an unresolvable mount conflict.
///
/// A busy mount point means a stale private hierarchy from a previous,
/// crashed run: detach it and retry exactly once.
fn mount_with_retry(source: &str, target: &Path, fstype: &str, data: Option<&str>) -> Result<bool> {
    match do_mount(source, target, fstype, data) {
        Ok(()) => Ok(true),
        Err(Errno::EPERM) | Err(Errno::EACCES) => Err(CgroupError::PermissionDenied(format!(
            "mounting {} on '{}'",
            fstype,
            target.display()
        ))),
        Err(Errno::EBUSY) => {
            warn!(path = %target.display(), "stale mount detected, detaching and retrying");
            if umount2(target, MntFlags::MNT_DETACH).is_err() {
                return Err(CgroupError::MountConflict(target.display().to_string()));
            }
            match do_mount(source, target, fstype, data) {
                Ok(()) => Ok(true),
                Err(_) => Err(CgroupError::MountConflict(target.display().to_string())),
            }
        }
        Err(e) => {
            info!(path = %target.display(), errno = %e, "could not mount {}", fstype);
            Ok(false)
        }
    }
}

fn do_mount(
    source: &str,
    target: &Path,
    fstype: &str,
    data: Option<&str>,
) -> std::result::Result<(), Errno> {
    mount(Some(source), target, Some(fstype), MsFlags::empty(), data)
}

/// Recursively drain and remove a group directory tree, children first.
fn remove_tree(path: &Path, drain_target: &Path, procs_file: &str) -> Result<()> {
    let entries = fs::read_dir(path).map_err(|e| CgroupError::io(path, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CgroupError::io(path, e))?;
        let child = entry.path();
        if child.is_dir() {
            remove_tree(&child, drain_target, procs_file)?;
        }
    }
    groups::drain_paths(path, drain_target, procs_file)?;
    groups::remove_group_dir(path)
}

/// Remove a directory we share with other potential users. On a hierarchy
/// we own everything under it is ours and failure is fatal; on a system
/// hierarchy a busy directory just means a parallel test is still using
/// it.
fn remove_or_tolerate(path: &Path, owned: bool) -> Result<bool> {
    match groups::remove_group_dir(path) {
        Ok(()) => Ok(true),
        Err(CgroupError::GroupBusy(p)) if !owned => {
            warn!(path = %p, "leaving busy group behind");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_v2(controllers: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cgroup.controllers"), controllers).unwrap();
        fs::write(dir.path().join("cgroup.subtree_control"), "memory\n").unwrap();
        dir
    }

    #[test]
    fn test_scan_is_idempotent() {
        let dir = fake_v2("cpu memory\n");
        let mut ctx = CgroupContext::with_mount_table(vec![MountEntry::cgroup2(dir.path())]);

        ctx.scan().unwrap();
        ctx.scan().unwrap();
        assert_eq!(ctx.roots.len(), 1);
    }

    #[test]
    fn test_scan_outcome_classification() {
        let dir = fake_v2("cpu memory\n");
        let mut ctx = CgroupContext::with_mount_table(vec![MountEntry::cgroup2(dir.path())]);
        ctx.scan().unwrap();

        // memory is in subtree_control, cpu is not, cpuset is absent
        assert!(matches!(
            ctx.scan_outcome(Controller::Memory),
            ScanOutcome::Found(_)
        ));
        assert!(matches!(
            ctx.scan_outcome(Controller::Cpu),
            ScanOutcome::FoundDisabled(_)
        ));
        assert_eq!(ctx.scan_outcome(Controller::Cpuset), ScanOutcome::NotFound);
    }

    #[test]
    fn test_scan_merge_rejects_changing_v2_controllers() {
        let dir = fake_v2("memory\n");
        let mut ctx = CgroupContext::with_mount_table(vec![MountEntry::cgroup2(dir.path())]);
        ctx.scan().unwrap();

        fs::write(dir.path().join("cgroup.controllers"), "cpu memory\n").unwrap();
        let err = ctx.scan().unwrap_err();
        assert!(matches!(err, CgroupError::InconsistentScan(_)));
    }

    #[test]
    fn test_descriptors_empty_before_require() {
        let dir = fake_v2("memory\n");
        let mut ctx = CgroupContext::with_mount_table(vec![MountEntry::cgroup2(dir.path())]);
        ctx.scan().unwrap();

        assert!(ctx.descriptors().is_empty());
        // but the controller is visible to a plain scan
        assert_eq!(ctx.detected_descriptors().len(), 1);
    }
}
