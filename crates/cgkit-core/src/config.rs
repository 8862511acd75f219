//! Flat-text config handoff between process invocations
//!
//! One line per hierarchy descriptor:
//!
//! ```text
//! memory V1 owned /tmp/cgroup_memory
//! cpu V2 system /sys/fs/cgroup
//! ```
//!
//! A later, unrelated process (typically the standalone cleanup utility)
//! parses this back and operates on the recorded layout verbatim; it must
//! not re-probe mounts, which may no longer be attributable once the
//! process that created them has exited.

use std::path::PathBuf;

use crate::error::{CgroupError, Result};
use crate::types::{CgroupVersion, Controller, HierarchyDescriptor};

const OWNED_TAG: &str = "owned";
const SYSTEM_TAG: &str = "system";

/// Render descriptors, one per line.
pub fn serialize(descriptors: &[HierarchyDescriptor]) -> String {
    let mut out = String::new();
    for desc in descriptors {
        out.push_str(&format!(
            "{} {} {} {}\n",
            desc.controller,
            desc.version,
            if desc.owned { OWNED_TAG } else { SYSTEM_TAG },
            desc.mount_path.display()
        ));
    }
    out
}

/// Parse a config produced by [`serialize`]. Blank lines and `#` comments
/// are ignored.
pub fn deserialize(text: &str) -> Result<Vec<HierarchyDescriptor>> {
    let mut descriptors = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.splitn(4, ' ');
        let (controller, version, owned, path) = match (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) {
            (Some(c), Some(v), Some(o), Some(p)) if !p.is_empty() => (c, v, o, p),
            _ => {
                return Err(CgroupError::Parse(format!(
                    "line {}: expected 'controller version owned-flag mount-path', got '{}'",
                    idx + 1,
                    line
                )))
            }
        };

        let owned = match owned {
            OWNED_TAG => true,
            SYSTEM_TAG => false,
            other => {
                return Err(CgroupError::Parse(format!(
                    "line {}: invalid ownership tag '{}'",
                    idx + 1,
                    other
                )))
            }
        };

        descriptors.push(HierarchyDescriptor {
            controller: Controller::from_name(controller)?,
            version: CgroupVersion::parse(version)?,
            mount_path: PathBuf::from(path),
            owned,
        });
    }

    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<HierarchyDescriptor> {
        vec![
            HierarchyDescriptor {
                controller: Controller::Memory,
                version: CgroupVersion::V1,
                mount_path: PathBuf::from("/tmp/cgroup_memory"),
                owned: true,
            },
            HierarchyDescriptor {
                controller: Controller::Cpu,
                version: CgroupVersion::V2,
                mount_path: PathBuf::from("/sys/fs/cgroup"),
                owned: false,
            },
        ]
    }

    #[test]
    fn test_roundtrip() {
        let descriptors = sample();
        let text = serialize(&descriptors);
        assert_eq!(deserialize(&text).unwrap(), descriptors);
    }

    #[test]
    fn test_serialize_format() {
        let text = serialize(&sample());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "memory V1 owned /tmp/cgroup_memory");
        assert_eq!(lines[1], "cpu V2 system /sys/fs/cgroup");
    }

    #[test]
    fn test_deserialize_skips_comments_and_blanks() {
        let text = "# detected hierarchies\n\nmemory V2 system /sys/fs/cgroup\n";
        let descriptors = deserialize(text).unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].controller, Controller::Memory);
    }

    #[test]
    fn test_deserialize_path_with_spaces() {
        let text = "memory V1 owned /tmp/odd mount path\n";
        let descriptors = deserialize(text).unwrap();
        assert_eq!(
            descriptors[0].mount_path,
            PathBuf::from("/tmp/odd mount path")
        );
    }

    #[test]
    fn test_deserialize_rejects_malformed_lines() {
        assert!(deserialize("memory V1 owned\n").is_err());
        assert!(deserialize("memory V3 owned /x\n").is_err());
        assert!(deserialize("blkio V1 owned /x\n").is_err());
        assert!(deserialize("memory V1 maybe /x\n").is_err());
    }
}
