// src/replay/staged.rs

//! Buffered group and environment state
//!
//! A replay saves and removes group records as it goes, but the run may
//! still fail once the whole document has been checked. [`StagedComps`]
//! keeps those writes in memory on top of the real store until
//! [`StagedComps::commit`] is called.

use super::collab::CompsHistory;
use crate::error::Result;
use crate::history::{CompsEnvironment, CompsGroup};
use std::collections::BTreeMap;
use tracing::debug;

pub struct StagedComps<C: CompsHistory> {
    inner: C,
    /// `None` marks a staged removal
    groups: BTreeMap<String, Option<CompsGroup>>,
    environments: BTreeMap<String, Option<CompsEnvironment>>,
}

impl<C: CompsHistory> StagedComps<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            groups: BTreeMap::new(),
            environments: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.environments.is_empty()
    }

    pub fn has_group_change(&self, id: &str) -> bool {
        self.groups.contains_key(id)
    }

    pub fn has_environment_change(&self, id: &str) -> bool {
        self.environments.contains_key(id)
    }

    /// Write every staged change through to the underlying store
    pub fn commit(mut self) -> Result<C> {
        debug!(
            "Committing {} group and {} environment changes",
            self.groups.len(),
            self.environments.len()
        );
        for (id, group) in std::mem::take(&mut self.groups) {
            match group {
                Some(group) => self.inner.save_group(&group)?,
                None => self.inner.remove_group(&id)?,
            }
        }
        for (id, environment) in std::mem::take(&mut self.environments) {
            match environment {
                Some(environment) => self.inner.save_environment(&environment)?,
                None => self.inner.remove_environment(&id)?,
            }
        }
        Ok(self.inner)
    }

    /// Drop every staged change and hand back the store untouched
    pub fn discard(self) -> C {
        self.inner
    }
}

impl<C: CompsHistory> CompsHistory for StagedComps<C> {
    fn get_group(&self, id: &str) -> Result<Option<CompsGroup>> {
        match self.groups.get(id) {
            Some(staged) => Ok(staged.clone()),
            None => self.inner.get_group(id),
        }
    }

    fn save_group(&mut self, group: &CompsGroup) -> Result<()> {
        self.groups.insert(group.id.clone(), Some(group.clone()));
        Ok(())
    }

    fn remove_group(&mut self, id: &str) -> Result<()> {
        self.groups.insert(id.to_string(), None);
        Ok(())
    }

    fn get_environment(&self, id: &str) -> Result<Option<CompsEnvironment>> {
        match self.environments.get(id) {
            Some(staged) => Ok(staged.clone()),
            None => self.inner.get_environment(id),
        }
    }

    fn save_environment(&mut self, environment: &CompsEnvironment) -> Result<()> {
        self.environments
            .insert(environment.id.clone(), Some(environment.clone()));
        Ok(())
    }

    fn remove_environment(&mut self, id: &str) -> Result<()> {
        self.environments.insert(id.to_string(), None);
        Ok(())
    }
}
