//! Snapshot diffing.

use std::collections::HashSet;

use crate::device::AnyDevice;

/// Devices that appeared and disappeared between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Present now, absent before.
    pub added: HashSet<AnyDevice>,
    /// Present before, absent now.
    pub removed: HashSet<AnyDevice>,
}

impl ChangeSet {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compute `current - previous` and `previous - current`, keyed by device id.
///
/// A device present on both sides yields nothing, even if its other attributes changed.
#[must_use]
pub fn diff(previous: &[AnyDevice], current: &[AnyDevice]) -> ChangeSet {
    let previous_ids: HashSet<&str> = previous.iter().map(|device| device.id()).collect();
    let current_ids: HashSet<&str> = current.iter().map(|device| device.id()).collect();

    ChangeSet {
        added: current
            .iter()
            .filter(|device| !previous_ids.contains(device.id()))
            .cloned()
            .collect(),
        removed: previous
            .iter()
            .filter(|device| !current_ids.contains(device.id()))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device::Platform, testing::device};

    fn ids(set: &HashSet<AnyDevice>) -> Vec<String> {
        let mut ids: Vec<_> = set.iter().map(|device| device.id().to_string()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn reports_added_and_removed() {
        let previous = [device("A"), device("B")];
        let current = [device("B"), device("C")];

        let changes = diff(&previous, &current);
        assert_eq!(ids(&changes.added), ["C"]);
        assert_eq!(ids(&changes.removed), ["A"]);
    }

    #[test]
    fn identical_snapshots_produce_nothing() {
        let snapshot = [device("A"), device("B")];
        assert!(diff(&snapshot, &snapshot).is_empty());
    }

    #[test]
    fn attribute_changes_are_not_reported() {
        let previous = [AnyDevice::new(
            crate::testing::FakeDevice::new("A", Platform::Android).named("before"),
        )];
        let current = [AnyDevice::new(
            crate::testing::FakeDevice::new("A", Platform::Android)
                .named("after")
                .unsupported(),
        )];
        assert!(diff(&previous, &current).is_empty());
    }

    #[test]
    fn seeding_from_nothing_adds_everything() {
        let changes = diff(&[], &[device("A"), device("B")]);
        assert_eq!(ids(&changes.added), ["A", "B"]);
        assert!(changes.removed.is_empty());
    }
}
