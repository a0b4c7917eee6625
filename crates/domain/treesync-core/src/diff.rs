use crate::{Snapshot, SyncPlan};

/// Work out what `local` needs to become `remote`.
///
/// A path is `changed` whenever the digests differ, including when the two
/// sides used different algorithms. No cross-algorithm comparison is attempted.
pub fn diff(local: &Snapshot, remote: &Snapshot) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for (path, remote_digest) in remote.iter() {
        match local.get(path) {
            None => plan.added.push(path.to_string()),
            Some(local_digest) if local_digest != remote_digest => {
                plan.changed.push(path.to_string())
            }
            Some(_) => {}
        }
    }

    // Anything left no longer exists in the remote index.
    for path in local.paths() {
        if !remote.contains(path) {
            plan.removed.push(path.to_string());
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DigestAlgorithm, FileDigest};

    fn snap(entries: &[(&str, &[u8])]) -> Snapshot {
        Snapshot::from_entries(
            entries
                .iter()
                .map(|(p, d)| (p.to_string(), FileDigest::new(DigestAlgorithm::Md5, *d))),
        )
        .unwrap()
    }

    #[test]
    fn reference_scenario() {
        let local = snap(&[
            ("a", b"deadbeef"),
            ("b", b"deadbeef"),
            ("c", b"deadbeef"),
            ("e", b"deadbeef"),
        ]);
        let remote = snap(&[
            ("a", b"caffeeee"),
            ("c", b"deadbeef"),
            ("d", b"deadbeef"),
            ("e", b"deadbeef"),
        ]);

        let plan = diff(&local, &remote);
        assert_eq!(plan.added, vec!["d"]);
        assert_eq!(plan.removed, vec!["b"]);
        assert_eq!(plan.changed, vec!["a"]);
    }

    #[test]
    fn empty_remote_removes_everything() {
        let local = snap(&[("x/1", b"1"), ("x/2", b"2"), ("y", b"3")]);
        let plan = diff(&local, &Snapshot::empty());
        assert!(plan.added.is_empty());
        assert!(plan.changed.is_empty());
        assert_eq!(plan.removed, vec!["x/1", "x/2", "y"]);
    }

    #[test]
    fn empty_local_adds_everything() {
        let remote = snap(&[("x", b"1"), ("y", b"2")]);
        let plan = diff(&Snapshot::empty(), &remote);
        assert_eq!(plan.added, vec!["x", "y"]);
        assert!(plan.removed.is_empty());
        assert!(plan.changed.is_empty());
    }

    #[test]
    fn mixed_algorithms_are_changed() {
        let local = Snapshot::from_entries([(
            "f".to_string(),
            FileDigest::new(DigestAlgorithm::Md5, vec![7; 8]),
        )])
        .unwrap();
        let remote = Snapshot::from_entries([(
            "f".to_string(),
            FileDigest::new(DigestAlgorithm::XxHash64, vec![7; 8]),
        )])
        .unwrap();

        let plan = diff(&local, &remote);
        assert_eq!(plan.changed, vec!["f"]);
        assert!(plan.added.is_empty() && plan.removed.is_empty());
    }
}
