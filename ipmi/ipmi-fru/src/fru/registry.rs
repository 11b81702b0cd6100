// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::Fru;
use crate::{
    domain::{Attribute, Domain},
    error::{Kind, Result},
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Name of the domain attribute holding the registry.
pub(crate) const FRU_ATTR_NAME: &str = "ipmi_fru";

/// Per-domain list of live, tracked FRU objects.
///
/// Membership only changes under the list lock. Iteration snapshots a strong
/// reference per element under the lock and visits with the lock released,
/// so a visited object stays live even if a concurrent destroyer removes it
/// mid-iteration, and the callback is free to allocate, destroy, or post
/// IPMI traffic.
#[derive(Default)]
pub struct FruRegistry {
    frus: Mutex<Vec<Arc<Fru>>>,
}

impl FruRegistry {
    /// Find-or-create the registry attribute on `domain`.
    pub(crate) fn attach(domain: &dyn Domain) -> Result<Arc<Self>> {
        let attribute =
            domain.attribute(FRU_ATTR_NAME, &mut || Arc::<Self>::default() as Attribute);
        attribute.downcast().map_err(|_| Kind::Invalid.err())
    }

    pub(crate) fn find(domain: &dyn Domain) -> Option<Arc<Self>> {
        domain.find_attribute(FRU_ATTR_NAME)?.downcast().ok()
    }

    /// Attaches a freshly allocated object, under the list lock, so an
    /// iterator can never observe a half-attached object.
    pub(crate) fn insert(&self, fru: &Arc<Fru>) {
        let mut frus = self.frus.lock();
        fru.state.lock().in_frulist = true;
        frus.push(fru.clone());
    }

    /// Drops the registry's reference to `fru`. Returns whether it was
    /// present.
    pub(crate) fn remove(&self, fru: &Arc<Fru>) -> bool {
        let mut frus = self.frus.lock();
        let before = frus.len();
        frus.retain(|tracked| !Arc::ptr_eq(tracked, fru));
        let removed = frus.len() != before;
        if removed {
            fru.state.lock().in_frulist = false;
        }
        removed
    }

    pub fn iterate(&self, mut f: impl FnMut(&Arc<Fru>)) {
        let snapshot: Vec<_> = self.frus.lock().clone();
        for fru in &snapshot {
            f(fru);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.frus.lock().len()
    }
}

/// Visits every FRU currently tracked for `domain`.
pub fn iterate(domain: &dyn Domain, f: impl FnMut(&Arc<Fru>)) {
    if let Some(registry) = FruRegistry::find(domain) {
        registry.iterate(f);
    }
}
