//! Grant state machine for one (user, plugin) pair.
//!
//! [`GrantSet`] applies request / grant / revoke transitions in memory and
//! remembers which rows changed so the caller can persist exactly those in
//! the same transaction as any installation or sandbox change.
//!
//! Audit timestamps are monotonic: `requested_at`, `granted_at` and
//! `revoked_at` may move forward when a transition repeats, but a later
//! transition never clears an earlier one.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use warden_types::error::PermissionError;
use warden_types::permission::{PermissionGrant, PermissionKind, PermissionState};
use warden_types::plugin::PluginManifest;

use super::catalog;

#[derive(Debug, Clone)]
pub struct GrantSet {
    user_id: String,
    plugin_id: String,
    grants: BTreeMap<PermissionKind, PermissionGrant>,
    dirty: BTreeSet<PermissionKind>,
}

impl GrantSet {
    /// Wrap the persisted grants of one pair. Rows for other pairs are ignored.
    pub fn new(user_id: &str, plugin_id: &str, grants: Vec<PermissionGrant>) -> Self {
        let grants = grants
            .into_iter()
            .filter(|g| g.user_id == user_id && g.plugin_id == plugin_id)
            .map(|g| (g.kind, g))
            .collect();
        Self {
            user_id: user_id.to_string(),
            plugin_id: plugin_id.to_string(),
            grants,
            dirty: BTreeSet::new(),
        }
    }

    pub fn state(&self, kind: PermissionKind) -> PermissionState {
        self.grants
            .get(&kind)
            .map(|g| g.state)
            .unwrap_or(PermissionState::NotRequested)
    }

    fn row(&mut self, kind: PermissionKind) -> &mut PermissionGrant {
        let (user_id, plugin_id) = (&self.user_id, &self.plugin_id);
        self.grants
            .entry(kind)
            .or_insert_with(|| PermissionGrant::not_requested(user_id, plugin_id, kind))
    }

    fn mark_requested(&mut self, kind: PermissionKind, now: DateTime<Utc>) {
        let row = self.row(kind);
        row.state = PermissionState::Requested;
        row.requested_at = Some(now);
        row.updated_at = now;
        self.dirty.insert(kind);
    }

    /// Move every declared kind that is not `requested` or `granted` to
    /// `requested`. Returns the kinds that changed.
    pub fn request(&mut self, manifest: &PluginManifest, now: DateTime<Utc>) -> Vec<PermissionKind> {
        let mut changed = Vec::new();
        for kind in manifest.declared_kinds() {
            match self.state(kind) {
                PermissionState::NotRequested | PermissionState::Revoked => {
                    self.mark_requested(kind, now);
                    changed.push(kind);
                }
                PermissionState::Requested | PermissionState::Granted => {}
            }
        }
        changed
    }

    /// Grant `kinds`, or every declared kind when `None`. A kind that was
    /// never requested (or was revoked) is requested first.
    pub fn grant(
        &mut self,
        manifest: &PluginManifest,
        kinds: Option<&[PermissionKind]>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PermissionKind>, PermissionError> {
        let kinds = match kinds {
            Some(kinds) => {
                if let Some(undeclared) = kinds.iter().find(|k| !manifest.declares(**k)) {
                    return Err(PermissionError::NotDeclared {
                        plugin_id: manifest.id.clone(),
                        kind: *undeclared,
                    });
                }
                kinds.to_vec()
            }
            None => manifest.declared_kinds(),
        };

        let mut changed = Vec::new();
        for kind in dedup_sorted(kinds) {
            match self.state(kind) {
                PermissionState::Granted => continue,
                PermissionState::NotRequested | PermissionState::Revoked => {
                    self.mark_requested(kind, now);
                }
                PermissionState::Requested => {}
            }
            let row = self.row(kind);
            row.state = PermissionState::Granted;
            row.granted_at = Some(now);
            row.updated_at = now;
            self.dirty.insert(kind);
            changed.push(kind);
        }
        Ok(changed)
    }

    /// Revoke `kinds`, or every existing grant when `None`. Kinds that were
    /// never requested or are already revoked are left alone.
    pub fn revoke(&mut self, kinds: Option<&[PermissionKind]>, now: DateTime<Utc>) -> Vec<PermissionKind> {
        let kinds = match kinds {
            Some(kinds) => dedup_sorted(kinds.to_vec()),
            None => self.grants.keys().copied().collect(),
        };

        let mut changed = Vec::new();
        for kind in kinds {
            let Some(row) = self.grants.get_mut(&kind) else {
                continue;
            };
            if matches!(row.state, PermissionState::Requested | PermissionState::Granted) {
                row.state = PermissionState::Revoked;
                row.revoked_at = Some(now);
                row.updated_at = now;
                self.dirty.insert(kind);
                changed.push(kind);
            }
        }
        changed
    }

    /// True iff every kind the manifest marks required is `granted`.
    pub fn is_fully_satisfied(&self, manifest: &PluginManifest) -> bool {
        self.unsatisfied(manifest).is_empty()
    }

    /// Required kinds that are not `granted`, in catalog order.
    pub fn unsatisfied(&self, manifest: &PluginManifest) -> Vec<PermissionKind> {
        let mut kinds: Vec<PermissionKind> = manifest
            .required_kinds()
            .into_iter()
            .filter(|k| self.state(*k) != PermissionState::Granted)
            .collect();
        kinds.sort_by_key(|k| catalog::position(*k));
        kinds
    }

    /// Rows touched since construction, for persistence.
    pub fn changed(&self) -> Vec<PermissionGrant> {
        self.dirty
            .iter()
            .filter_map(|k| self.grants.get(k).cloned())
            .collect()
    }

    /// Persisted rows plus synthesized `not-requested` rows for declared kinds
    /// that have none yet, in catalog order.
    pub fn listing(&self, manifest: Option<&PluginManifest>) -> Vec<PermissionGrant> {
        let mut rows: Vec<PermissionGrant> = self.grants.values().cloned().collect();
        if let Some(manifest) = manifest {
            for kind in manifest.declared_kinds() {
                if !self.grants.contains_key(&kind) {
                    rows.push(PermissionGrant::not_requested(&self.user_id, &self.plugin_id, kind));
                }
            }
        }
        rows.sort_by_key(|g| catalog::position(g.kind));
        rows
    }

    pub fn grants(&self) -> impl Iterator<Item = &PermissionGrant> {
        self.grants.values()
    }
}

fn dedup_sorted(mut kinds: Vec<PermissionKind>) -> Vec<PermissionKind> {
    kinds.sort_by_key(|k| catalog::position(*k));
    kinds.dedup();
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use semver::Version;

    fn scanner() -> PluginManifest {
        PluginManifest::new("c", Version::new(1, 0, 0))
            .with_permission(PermissionKind::ReadFiles, true)
            .with_permission(PermissionKind::NetworkAccess, true)
            .with_permission(PermissionKind::GitAccess, false)
    }

    #[test]
    fn request_creates_requested_rows_for_declared_kinds() {
        let manifest = scanner();
        let mut set = GrantSet::new("u1", "c", Vec::new());
        let now = Utc::now();

        let changed = set.request(&manifest, now);
        assert_eq!(
            changed,
            vec![PermissionKind::ReadFiles, PermissionKind::NetworkAccess, PermissionKind::GitAccess]
        );
        assert_eq!(set.state(PermissionKind::ReadFiles), PermissionState::Requested);
        assert_eq!(set.changed().len(), 3);
        assert!(set.changed().iter().all(|g| g.requested_at == Some(now)));
        assert!(!set.is_fully_satisfied(&manifest));

        // Requesting again changes nothing.
        assert!(set.request(&manifest, now).is_empty());
    }

    #[test]
    fn request_skips_granted_kinds() {
        let manifest = scanner();
        let mut set = GrantSet::new("u1", "c", Vec::new());
        let now = Utc::now();
        set.grant(&manifest, Some(&[PermissionKind::ReadFiles]), now).unwrap();

        let changed = set.request(&manifest, now);
        assert_eq!(changed, vec![PermissionKind::NetworkAccess, PermissionKind::GitAccess]);
        assert_eq!(set.state(PermissionKind::ReadFiles), PermissionState::Granted);
    }

    #[test]
    fn grant_without_request_requests_implicitly() {
        let manifest = scanner();
        let mut set = GrantSet::new("u1", "c", Vec::new());
        let now = Utc::now();

        set.grant(&manifest, Some(&[PermissionKind::NetworkAccess]), now).unwrap();
        let row = set
            .grants()
            .find(|g| g.kind == PermissionKind::NetworkAccess)
            .unwrap();
        assert_eq!(row.state, PermissionState::Granted);
        assert_eq!(row.requested_at, Some(now));
        assert_eq!(row.granted_at, Some(now));
    }

    #[test]
    fn grant_of_undeclared_kind_is_rejected() {
        let manifest = scanner();
        let mut set = GrantSet::new("u1", "c", Vec::new());
        let err = set
            .grant(&manifest, Some(&[PermissionKind::ApiKeys]), Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            PermissionError::NotDeclared {
                kind: PermissionKind::ApiKeys,
                ..
            }
        ));
        assert!(set.changed().is_empty());
    }

    #[test]
    fn satisfaction_needs_only_required_kinds() {
        let manifest = scanner();
        let mut set = GrantSet::new("u1", "c", Vec::new());
        set.grant(
            &manifest,
            Some(&[PermissionKind::ReadFiles, PermissionKind::NetworkAccess]),
            Utc::now(),
        )
        .unwrap();
        assert!(set.is_fully_satisfied(&manifest));
        assert_eq!(set.state(PermissionKind::GitAccess), PermissionState::NotRequested);
    }

    #[test]
    fn revoke_keeps_audit_timestamps() {
        let manifest = scanner();
        let mut set = GrantSet::new("u1", "c", Vec::new());
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(5);
        let t2 = t0 + Duration::seconds(10);

        set.request(&manifest, t0);
        set.grant(&manifest, None, t1).unwrap();
        let revoked = set.revoke(Some(&[PermissionKind::ReadFiles]), t2);
        assert_eq!(revoked, vec![PermissionKind::ReadFiles]);

        let row = set.grants().find(|g| g.kind == PermissionKind::ReadFiles).unwrap();
        assert_eq!(row.state, PermissionState::Revoked);
        assert_eq!(row.requested_at, Some(t0));
        assert_eq!(row.granted_at, Some(t1));
        assert_eq!(row.revoked_at, Some(t2));
        assert_eq!(set.unsatisfied(&manifest), vec![PermissionKind::ReadFiles]);
    }

    #[test]
    fn revoked_kind_can_be_requested_again() {
        let manifest = scanner();
        let mut set = GrantSet::new("u1", "c", Vec::new());
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(1);
        set.grant(&manifest, None, t0).unwrap();
        set.revoke(None, t0);

        let changed = set.request(&manifest, t1);
        assert_eq!(changed.len(), 3);
        let row = set.grants().find(|g| g.kind == PermissionKind::ReadFiles).unwrap();
        assert_eq!(row.state, PermissionState::Requested);
        assert_eq!(row.requested_at, Some(t1));
        assert_eq!(row.granted_at, Some(t0));
        assert_eq!(row.revoked_at, Some(t0));
    }

    #[test]
    fn revoke_ignores_unknown_and_already_revoked() {
        let manifest = scanner();
        let mut set = GrantSet::new("u1", "c", Vec::new());
        let now = Utc::now();
        assert!(set.revoke(Some(&[PermissionKind::ApiKeys]), now).is_empty());

        set.request(&manifest, now);
        assert_eq!(set.revoke(None, now).len(), 3);
        assert!(set.revoke(None, now).is_empty());
    }

    #[test]
    fn listing_synthesizes_missing_rows_in_catalog_order() {
        let manifest = PluginManifest::new("c", Version::new(1, 0, 0))
            .with_permission(PermissionKind::ApiKeys, true)
            .with_permission(PermissionKind::ReadFiles, true);
        let mut set = GrantSet::new("u1", "c", Vec::new());
        set.grant(&manifest, Some(&[PermissionKind::ApiKeys]), Utc::now()).unwrap();

        let rows = set.listing(Some(&manifest));
        let kinds: Vec<_> = rows.iter().map(|g| (g.kind, g.state)).collect();
        assert_eq!(
            kinds,
            vec![
                (PermissionKind::ReadFiles, PermissionState::NotRequested),
                (PermissionKind::ApiKeys, PermissionState::Granted),
            ]
        );
    }

    #[test]
    fn rows_for_other_pairs_are_ignored() {
        let stray = PermissionGrant::not_requested("u2", "c", PermissionKind::ReadFiles);
        let set = GrantSet::new("u1", "c", vec![stray]);
        assert_eq!(set.grants().count(), 0);
    }
}
