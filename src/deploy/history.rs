// ABOUTME: Per-component revision history persisted as JSON in the state directory.
// ABOUTME: Grows monotonically; rollback only moves the active marker and failed runs mark commits.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{CommitRef, ComponentName, Revision};

use super::DeployError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHistory {
    /// Oldest first.
    pub revisions: Vec<Revision>,
    #[serde(default)]
    pub active: Option<CommitRef>,
    /// Commits a run failed on; never chosen as a rollback target.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub failed: BTreeSet<CommitRef>,
}

impl ComponentHistory {
    fn active_index(&self) -> Option<usize> {
        let active = self.active.as_ref()?;
        self.revisions.iter().rposition(|r| &r.commit == active)
    }
}

#[derive(Debug, Clone)]
pub struct RevisionHistory {
    path: PathBuf,
    components: BTreeMap<ComponentName, ComponentHistory>,
}

impl RevisionHistory {
    /// Load from `path`; a missing file is an empty history.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, DeployError> {
        let path = path.into();
        let components = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                DeployError::StateFile(format!("{} is not valid history: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(DeployError::StateFile(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        Ok(Self { path, components })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write atomically through a sibling temp file.
    pub fn save(&self) -> Result<(), DeployError> {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&self.components)?;
            let tmp = self.path.with_extension("json.tmp");
            std::fs::write(&tmp, json)?;
            std::fs::rename(&tmp, &self.path)
        };
        write().map_err(|e| {
            DeployError::StateFile(format!("failed to write {}: {e}", self.path.display()))
        })
    }

    /// Record `commit` as the component's active revision.
    ///
    /// Appends only when it differs from the most recent entry. Returns true
    /// when the active revision changed.
    pub fn record(&mut self, component: &ComponentName, commit: &CommitRef) -> bool {
        let entry = self.components.entry(component.clone()).or_default();
        if entry.revisions.last().map(|r| &r.commit) != Some(commit) {
            entry
                .revisions
                .push(Revision::new(component.clone(), commit.clone()));
        }
        let changed = entry.active.as_ref() != Some(commit);
        entry.active = Some(commit.clone());
        changed
    }

    /// Mark an existing (or explicitly chosen) commit active without touching the list.
    pub fn activate(&mut self, component: &ComponentName, commit: &CommitRef) {
        let entry = self.components.entry(component.clone()).or_default();
        entry.active = Some(commit.clone());
    }

    pub fn active(&self, component: &ComponentName) -> Option<&CommitRef> {
        self.components.get(component)?.active.as_ref()
    }

    /// The newest revision recorded before the active one that no run failed on.
    pub fn previous(&self, component: &ComponentName) -> Option<&Revision> {
        let entry = self.components.get(component)?;
        let index = entry.active_index()?;
        let active = entry.active.as_ref()?;
        entry.revisions[..index]
            .iter()
            .rev()
            .find(|r| &r.commit != active && !entry.failed.contains(&r.commit))
    }

    /// Remember that a run failed on `commit`.
    pub fn mark_failed(&mut self, component: &ComponentName, commit: &CommitRef) {
        let entry = self.components.entry(component.clone()).or_default();
        entry.failed.insert(commit.clone());
    }

    /// The active revision ran successfully; it is a rollback target again.
    pub fn mark_good(&mut self, component: &ComponentName) {
        if let Some(entry) = self.components.get_mut(component)
            && let Some(active) = entry.active.clone()
        {
            entry.failed.remove(&active);
        }
    }

    pub fn is_failed(&self, component: &ComponentName, commit: &CommitRef) -> bool {
        self.components
            .get(component)
            .is_some_and(|h| h.failed.contains(commit))
    }

    pub fn revisions(&self, component: &ComponentName) -> &[Revision] {
        self.components
            .get(component)
            .map(|h| h.revisions.as_slice())
            .unwrap_or_default()
    }

    pub fn components(&self) -> impl Iterator<Item = (&ComponentName, &ComponentHistory)> {
        self.components.iter()
    }
}
