//! File access helpers for cgroup attribute files

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use crate::error::{CgroupError, Result};

/// Read an attribute file to a string.
pub(crate) fn read_cgroup_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| CgroupError::io(path, e))
}

/// Write an attribute file. Cgroup knobs consume the whole write in one
/// syscall; values are plain decimal ASCII or the documented string form.
pub(crate) fn write_cgroup_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| CgroupError::io(path, e))
}

/// Append to an attribute file. Process-membership files take one PID per
/// write; appending keeps every write a distinct syscall.
pub(crate) fn append_cgroup_file(path: &Path, content: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| CgroupError::io(path, e))?;
    f.write_all(content.as_bytes())
        .map_err(|e| CgroupError::io(path, e))
}

/// Parse the contents of a procs/tasks file into PIDs.
pub(crate) fn parse_pids(content: &str) -> Vec<u32> {
    content
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

/// The raw errno carried by a `CgroupError`, if it wraps an I/O error.
pub(crate) fn raw_errno(err: &CgroupError) -> Option<i32> {
    match err {
        CgroupError::Io { source, .. } => source.raw_os_error(),
        _ => None,
    }
}

/// Whether an error wraps ENOENT.
pub(crate) fn is_not_found(err: &CgroupError) -> bool {
    matches!(err, CgroupError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let knob = dir.path().join("memory.max");

        write_cgroup_file(&knob, "16777215").unwrap();
        assert_eq!(read_cgroup_file(&knob).unwrap(), "16777215");
    }

    #[test]
    fn test_append_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let procs = dir.path().join("cgroup.procs");

        append_cgroup_file(&procs, "100\n").unwrap();
        append_cgroup_file(&procs, "200\n").unwrap();

        let pids = parse_pids(&read_cgroup_file(&procs).unwrap());
        assert_eq!(pids, vec![100, 200]);
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_cgroup_file(&dir.path().join("absent")).unwrap_err();
        assert!(is_not_found(&err));
        assert!(raw_errno(&err).is_some());
    }

    #[test]
    fn test_parse_pids_skips_garbage() {
        assert_eq!(parse_pids("1\n2\n\nnot-a-pid\n 3 \n"), vec![1, 2, 3]);
        assert!(parse_pids("").is_empty());
    }
}
