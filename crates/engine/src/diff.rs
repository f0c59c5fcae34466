//! Set difference over fingerprints.

use crate::Fingerprint;
use serde::Serialize;
use std::collections::HashSet;

/// What a pass has to change remotely.
///
/// A file whose content changed shows up in both lists: its new fingerprint
/// has to be uploaded and its old one deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diff {
    pub to_upload: Vec<Fingerprint>,
    pub to_delete: Vec<Fingerprint>,
}

/// `to_upload = local \ remote`, `to_delete = remote \ local`.
///
/// Input order is preserved and duplicates are dropped.
pub fn diff(local: &[Fingerprint], remote: &[Fingerprint]) -> Diff {
    let local_set: HashSet<&Fingerprint> = local.iter().collect();
    let remote_set: HashSet<&Fingerprint> = remote.iter().collect();
    Diff {
        to_upload: difference(local, &remote_set),
        to_delete: difference(remote, &local_set),
    }
}

fn difference(items: &[Fingerprint], exclude: &HashSet<&Fingerprint>) -> Vec<Fingerprint> {
    let mut seen = HashSet::new();
    items.iter().filter(|fp| !exclude.contains(fp) && seen.insert(*fp)).cloned().collect()
}
