use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CADENCE_DIR: &str = ".cadence";
pub const ROSTERS_DIR: &str = ".cadence/rosters";

pub const CONFIG_FILE: &str = ".cadence/config.yaml";
pub const STORE_FILE: &str = ".cadence/lifecycles.redb";
pub const OUTBOX_FILE: &str = ".cadence/outbox.jsonl";
pub const NOTICES_FILE: &str = ".cadence/notices.jsonl";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn cadence_dir(root: &Path) -> PathBuf {
    root.join(CADENCE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn store_path(root: &Path) -> PathBuf {
    root.join(STORE_FILE)
}

pub fn outbox_path(root: &Path) -> PathBuf {
    root.join(OUTBOX_FILE)
}

pub fn notices_path(root: &Path) -> PathBuf {
    root.join(NOTICES_FILE)
}

pub fn rosters_dir(root: &Path) -> PathBuf {
    root.join(ROSTERS_DIR)
}

/// Roster file listing additional known contacts for one organization.
pub fn roster_path(root: &Path, org_id: &str) -> PathBuf {
    rosters_dir(root).join(format!("{org_id}.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_path_is_per_org() {
        let root = Path::new("/tmp/project");
        assert_eq!(
            roster_path(root, "acme.test"),
            PathBuf::from("/tmp/project/.cadence/rosters/acme.test.yaml")
        );
    }
}
