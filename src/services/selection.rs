use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::MerchantAppId;

/// Merchant apps the user picked for a token push. Membership only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSet {
    ids: BTreeSet<MerchantAppId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips membership of `id`; returns whether it is now selected
    pub fn toggle(&mut self, id: MerchantAppId) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    /// Selects every known app, or clears the set if all of them already are.
    pub fn select_all(&mut self, known: &[MerchantAppId]) {
        let full = !known.is_empty() && known.iter().all(|id| self.ids.contains(id));

        if full {
            self.ids.clear();
        } else {
            self.ids = known.iter().copied().collect();
        }
    }

    pub fn count(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: MerchantAppId) -> bool {
        self.ids.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = MerchantAppId> + '_ {
        self.ids.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<MerchantAppId> {
        self.iter().collect()
    }
}

impl FromIterator<MerchantAppId> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = MerchantAppId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
