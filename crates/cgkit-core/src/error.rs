//! Error types for cgroup negotiation and lifecycle operations

use std::io;
use std::path::Path;
use thiserror::Error;

use crate::types::CgroupVersion;

/// Cgroup operation errors
#[derive(Debug, Error)]
pub enum CgroupError {
    /// Neither hierarchy version exposes the controller. Callers should
    /// treat this as a configuration skip, not a test failure.
    #[error("'{0}' controller required, but not available on this system")]
    ControllerUnsupported(String),

    #[error("Unknown controller: {0}")]
    UnknownController(String),

    #[error("Unknown knob: {0}")]
    UnknownKnob(String),

    #[error("'{controller}' controller is not attached to group {group}")]
    ControllerNotAttached { controller: String, group: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Group already exists: {0}")]
    GroupExists(String),

    #[error("Parent group is gone: {0}")]
    ParentGone(String),

    #[error("Group is busy: {0}")]
    GroupBusy(String),

    #[error("Operation not permitted on protected group: {0}")]
    Protected(String),

    #[error("Group handle is no longer valid: {0}")]
    StaleGroup(String),

    #[error("Knob '{knob}' has no {version} equivalent")]
    KnobUnsupported {
        knob: String,
        version: CgroupVersion,
    },

    #[error("Conflicting mount at {0}; stale hierarchy from a previous run?")]
    MountConflict(String),

    #[error("Inconsistent cgroup state: {0}")]
    InconsistentScan(String),

    #[error("Failed to read mount table: {0}")]
    MountTable(String),

    #[error("Failed to parse cgroup config: {0}")]
    Parse(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl CgroupError {
    /// Whether this error is a configuration-skip condition rather than a
    /// genuine failure.
    pub fn is_skip(&self) -> bool {
        matches!(self, CgroupError::ControllerUnsupported(_))
    }

    /// Wrap an I/O error with the path it happened on, promoting access
    /// errors to the dedicated variant.
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            return CgroupError::PermissionDenied(path.display().to_string());
        }
        CgroupError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CgroupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CgroupError::ControllerUnsupported("memory".to_string());
        assert!(err.to_string().contains("memory"));
        assert!(err.to_string().contains("not available"));

        let err = CgroupError::KnobUnsupported {
            knob: "memory.min".to_string(),
            version: CgroupVersion::V1,
        };
        assert_eq!(err.to_string(), "Knob 'memory.min' has no V1 equivalent");
    }

    #[test]
    fn test_skip_predicate() {
        assert!(CgroupError::ControllerUnsupported("cpu".into()).is_skip());
        assert!(!CgroupError::GroupBusy("/x".into()).is_skip());
        assert!(!CgroupError::PermissionDenied("/x".into()).is_skip());
    }

    #[test]
    fn test_io_promotes_access_errors() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let err = CgroupError::io(Path::new("/sys/fs/cgroup"), denied);
        assert!(matches!(err, CgroupError::PermissionDenied(_)));

        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = CgroupError::io(Path::new("/sys/fs/cgroup"), missing);
        assert!(matches!(err, CgroupError::Io { .. }));
        assert!(err.to_string().contains("/sys/fs/cgroup"));
    }
}
