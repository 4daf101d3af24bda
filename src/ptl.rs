//! Pending/Tmp List (PTL): tracks subdocs whose apply is in-flight or has failed terminally
//! without an ACK.

use crate::status::Status;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub name: String,
    pub version: u32,
    pub status: String,
    pub error_code: String,
}

#[derive(Debug, Clone, Default)]
pub struct PendingList {
    entries: HashMap<String, PendingEntry>,
}

impl PendingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert semantics: create or overwrite the entry for `name`.
    pub fn update(&mut self, name: &str, version: u32, status: &str, error_code: &str) -> Status {
        self.entries.insert(
            name.to_string(),
            PendingEntry {
                name: name.to_string(),
                version,
                status: status.to_string(),
                error_code: error_code.to_string(),
            },
        );
        Status::Success
    }

    /// No-op success if `name` is absent.
    pub fn delete(&mut self, name: &str) -> Status {
        self.entries.remove(name);
        Status::Success
    }

    pub fn get(&self, name: &str) -> Option<&PendingEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_is_upsert() {
        let mut ptl = PendingList::new();
        assert!(ptl.update("wifi", 1, "pending", "none").is_success());
        assert_eq!(ptl.get("wifi").unwrap().version, 1);

        ptl.update("wifi", 2, "failed", "doc_rejected");
        let entry = ptl.get("wifi").unwrap();
        assert_eq!(entry.version, 2);
        assert_eq!(entry.status, "failed");
        assert_eq!(entry.error_code, "doc_rejected");
        assert_eq!(ptl.len(), 1);
    }

    #[test]
    fn delete_absent_is_success_noop() {
        let mut ptl = PendingList::new();
        assert!(ptl.delete("nope").is_success());
        assert!(ptl.is_empty());
    }

    #[test]
    fn delete_removes_entry() {
        let mut ptl = PendingList::new();
        ptl.update("wifi", 1, "pending", "none");
        assert!(ptl.delete("wifi").is_success());
        assert!(!ptl.contains("wifi"));
    }
}
