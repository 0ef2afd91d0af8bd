// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Field-group precedence merge of fragments into a [`Record`].
//!
//! API provenance strictly dominates DOM provenance. Within a tier the first
//! non-empty value of a group wins, so a populated group is never replaced.
//! The visit seed is applied as the last fragment of its own tier.

use crate::types::{FieldGroup, FieldSet, FieldSource, Fragment, Provenance, Record, SearchHit};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};

/// Builds records from a seed and the fragments captured for it.
#[derive(Debug, Clone, Default)]
pub struct RecordMerger {
    search_query: String,
    search_location: Option<String>,
}

impl RecordMerger {
    pub fn new(search_query: impl Into<String>) -> Self {
        Self {
            search_query: search_query.into(),
            search_location: None,
        }
    }

    /// Stamp records with the location the search was narrowed to.
    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.search_location = location;
        self
    }

    /// Merge everything known about `seed` into one record.
    pub fn merge(&self, seed: &SearchHit, fragments: &[Fragment]) -> Record {
        let mut fields = FieldSet::default();
        let mut sources = BTreeMap::new();

        for tier in [Provenance::Api, Provenance::Dom] {
            apply_tier(&mut fields, &mut sources, seed, fragments, tier);
        }

        for group in FieldGroup::ALL {
            sources.entry(group).or_insert(FieldSource::Absent);
        }

        Record {
            public_id: seed.public_id.clone(),
            profile_url: seed.profile_url.clone(),
            fields,
            sources,
            search_query: self.search_query.clone(),
            search_location: self.search_location.clone(),
            scraped_at: Utc::now().to_rfc3339(),
        }
    }

    /// Groups still empty once the API tier is applied.
    pub fn missing_groups(seed: &SearchHit, fragments: &[Fragment]) -> BTreeSet<FieldGroup> {
        let mut fields = FieldSet::default();
        let mut sources = BTreeMap::new();
        apply_tier(&mut fields, &mut sources, seed, fragments, Provenance::Api);
        FieldGroup::ALL
            .into_iter()
            .filter(|g| !fields.has(*g))
            .collect()
    }
}

fn apply_tier(
    fields: &mut FieldSet,
    sources: &mut BTreeMap<FieldGroup, FieldSource>,
    seed: &SearchHit,
    fragments: &[Fragment],
    tier: Provenance,
) {
    let relevant = fragments.iter().filter(|f| {
        f.provenance() == tier && f.subject().map_or(true, |s| s == seed.public_id)
    });
    for fragment in relevant {
        if let Some(data) = fragment.fields() {
            apply(fields, sources, data, tier);
        }
    }
    if seed.provenance == tier {
        apply(fields, sources, &seed.identity(), tier);
    }
}

fn apply(
    fields: &mut FieldSet,
    sources: &mut BTreeMap<FieldGroup, FieldSource>,
    data: &FieldSet,
    provenance: Provenance,
) {
    for group in FieldGroup::ALL {
        if fields.fill_group(data, group) {
            sources.insert(group, provenance.into());
        }
    }
}
