// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core data types: fragments, field groups, records, outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Base of every public profile URL.
pub const PROFILE_URL_BASE: &str = "https://www.linkedin.com/in/";

/// Build the canonical profile URL for a public identifier.
pub fn profile_url(public_id: &str) -> String {
    format!("{PROFILE_URL_BASE}{public_id}/")
}

/// Where a piece of data was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Decoded from an intercepted internal-API response.
    Api,
    /// Extracted from the rendered page structure.
    Dom,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::Dom => write!(f, "dom"),
        }
    }
}

/// The endpoint family a fragment was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Search,
    Profile,
    Contact,
    Skills,
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search => write!(f, "search"),
            Self::Profile => write!(f, "profile"),
            Self::Contact => write!(f, "contact"),
            Self::Skills => write!(f, "skills"),
        }
    }
}

/// Unit of merge precedence. A group is written at most once per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    // ── Identity ──
    Name,
    Headline,
    Location,
    // ── Professional ──
    /// Current company and title, taken together.
    Position,
    Industry,
    About,
    Connections,
    Experience,
    Education,
    Skills,
    // ── Contact ──
    Email,
    Phone,
    Website,
    Twitter,
}

impl FieldGroup {
    pub const ALL: [FieldGroup; 14] = [
        FieldGroup::Name,
        FieldGroup::Headline,
        FieldGroup::Location,
        FieldGroup::Position,
        FieldGroup::Industry,
        FieldGroup::About,
        FieldGroup::Connections,
        FieldGroup::Experience,
        FieldGroup::Education,
        FieldGroup::Skills,
        FieldGroup::Email,
        FieldGroup::Phone,
        FieldGroup::Website,
        FieldGroup::Twitter,
    ];

    /// Identity groups are seeded from the search context of a visit.
    pub fn is_identity(self) -> bool {
        matches!(self, Self::Name | Self::Headline | Self::Location)
    }
}

/// Which source populated a field group of a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Api,
    Dom,
    Absent,
}

impl From<Provenance> for FieldSource {
    fn from(p: Provenance) -> Self {
        match p {
            Provenance::Api => Self::Api,
            Provenance::Dom => Self::Dom,
        }
    }
}

/// A single work experience entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experience {
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub date_range: Option<String>,
}

impl Experience {
    /// `title @ company`, or whichever half is present.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.title.is_empty() {
            parts.push(self.title.clone());
        }
        if !self.company.is_empty() {
            parts.push(format!("@ {}", self.company));
        }
        parts.join(" ")
    }
}

/// A single education entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Education {
    pub school: String,
    pub degree: Option<String>,
    pub field_of_study: Option<String>,
    pub date_range: Option<String>,
}

impl Education {
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(degree) = self.degree.as_deref().filter(|d| !d.is_empty()) {
            parts.push(degree.to_string());
        }
        if let Some(field) = self.field_of_study.as_deref().filter(|f| !f.is_empty()) {
            parts.push(field.to_string());
        }
        if !self.school.is_empty() {
            if parts.is_empty() {
                return self.school.clone();
            }
            parts.push(format!("- {}", self.school));
        }
        parts.join(" ")
    }
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// The logical fields of one subject, any of which may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet {
    pub name: Option<String>,
    pub headline: Option<String>,
    pub location: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub industry: Option<String>,
    pub about: Option<String>,
    pub connections: Option<String>,
    #[serde(default)]
    pub experience: Vec<Experience>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub twitter: Option<String>,
}

impl FieldSet {
    /// Whether `group` carries a non-empty value.
    pub fn has(&self, group: FieldGroup) -> bool {
        match group {
            FieldGroup::Name => filled(&self.name),
            FieldGroup::Headline => filled(&self.headline),
            FieldGroup::Location => filled(&self.location),
            FieldGroup::Position => filled(&self.company) || filled(&self.title),
            FieldGroup::Industry => filled(&self.industry),
            FieldGroup::About => filled(&self.about),
            FieldGroup::Connections => filled(&self.connections),
            FieldGroup::Experience => !self.experience.is_empty(),
            FieldGroup::Education => !self.education.is_empty(),
            FieldGroup::Skills => !self.skills.is_empty(),
            FieldGroup::Email => filled(&self.email),
            FieldGroup::Phone => filled(&self.phone),
            FieldGroup::Website => filled(&self.website),
            FieldGroup::Twitter => filled(&self.twitter),
        }
    }

    /// Groups that carry a value, in canonical order.
    pub fn groups(&self) -> BTreeSet<FieldGroup> {
        FieldGroup::ALL
            .into_iter()
            .filter(|g| self.has(*g))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        FieldGroup::ALL.into_iter().all(|g| !self.has(g))
    }

    /// Copy `group` from `other`. Returns false (and writes nothing) when
    /// this set already has the group or `other` lacks it.
    pub fn fill_group(&mut self, other: &FieldSet, group: FieldGroup) -> bool {
        if self.has(group) || !other.has(group) {
            return false;
        }
        match group {
            FieldGroup::Name => self.name = other.name.clone(),
            FieldGroup::Headline => self.headline = other.headline.clone(),
            FieldGroup::Location => self.location = other.location.clone(),
            FieldGroup::Position => {
                self.company = other.company.clone();
                self.title = other.title.clone();
            }
            FieldGroup::Industry => self.industry = other.industry.clone(),
            FieldGroup::About => self.about = other.about.clone(),
            FieldGroup::Connections => self.connections = other.connections.clone(),
            FieldGroup::Experience => self.experience = other.experience.clone(),
            FieldGroup::Education => self.education = other.education.clone(),
            FieldGroup::Skills => self.skills = other.skills.clone(),
            FieldGroup::Email => self.email = other.email.clone(),
            FieldGroup::Phone => self.phone = other.phone.clone(),
            FieldGroup::Website => self.website = other.website.clone(),
            FieldGroup::Twitter => self.twitter = other.twitter.clone(),
        }
        true
    }

    /// Derive the current position from the first experience entry.
    pub fn derive_position(&mut self) {
        if self.has(FieldGroup::Position) {
            return;
        }
        if let Some(first) = self.experience.first() {
            if !first.company.is_empty() {
                self.company = Some(first.company.clone());
            }
            if !first.title.is_empty() {
                self.title = Some(first.title.clone());
            }
        }
    }
}

/// Opaque pagination token carried by a search fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(pub String);

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A search result: the minimal identity that seeds a profile visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub public_id: String,
    pub name: Option<String>,
    pub headline: Option<String>,
    pub location: Option<String>,
    pub profile_url: String,
    pub provenance: Provenance,
}

impl SearchHit {
    pub fn new(public_id: impl Into<String>, provenance: Provenance) -> Self {
        let public_id = public_id.into();
        Self {
            profile_url: profile_url(&public_id),
            public_id,
            name: None,
            headline: None,
            location: None,
            provenance,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_headline(mut self, headline: impl Into<String>) -> Self {
        self.headline = Some(headline.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// The identity groups this hit can seed.
    pub fn identity(&self) -> FieldSet {
        FieldSet {
            name: self.name.clone(),
            headline: self.headline.clone(),
            location: self.location.clone(),
            ..FieldSet::default()
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    pub cursor: Option<Cursor>,
}

/// The typed body of a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Search(SearchPage),
    Profile(FieldSet),
    Contact(FieldSet),
    Skills(FieldSet),
}

/// A provenance-tagged partial view of one subject. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    provenance: Provenance,
    subject: Option<String>,
    payload: Payload,
}

impl Fragment {
    pub fn new(provenance: Provenance, subject: Option<String>, payload: Payload) -> Self {
        Self {
            provenance,
            subject,
            payload,
        }
    }

    pub fn api(subject: impl Into<String>, payload: Payload) -> Self {
        Self::new(Provenance::Api, Some(subject.into()), payload)
    }

    pub fn dom(subject: impl Into<String>, payload: Payload) -> Self {
        Self::new(Provenance::Dom, Some(subject.into()), payload)
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Public identifier of the subject, when the source exposed one.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn kind(&self) -> FragmentKind {
        match self.payload {
            Payload::Search(_) => FragmentKind::Search,
            Payload::Profile(_) => FragmentKind::Profile,
            Payload::Contact(_) => FragmentKind::Contact,
            Payload::Skills(_) => FragmentKind::Skills,
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Field data for profile, contact and skills fragments.
    pub fn fields(&self) -> Option<&FieldSet> {
        match &self.payload {
            Payload::Profile(f) | Payload::Contact(f) | Payload::Skills(f) => Some(f),
            Payload::Search(_) => None,
        }
    }

    pub fn search_page(&self) -> Option<&SearchPage> {
        match &self.payload {
            Payload::Search(page) => Some(page),
            _ => None,
        }
    }
}

/// The merged, terminal representation of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub public_id: String,
    pub profile_url: String,
    #[serde(flatten)]
    pub fields: FieldSet,
    /// Source of every field group, `absent` included.
    pub sources: BTreeMap<FieldGroup, FieldSource>,
    pub search_query: String,
    /// Location facet the search was narrowed to, if any.
    #[serde(default)]
    pub search_location: Option<String>,
    pub scraped_at: String,
}

impl Record {
    pub fn source(&self, group: FieldGroup) -> FieldSource {
        self.sources
            .get(&group)
            .copied()
            .unwrap_or(FieldSource::Absent)
    }

    /// Whether any group beyond identity was populated.
    pub fn has_non_identity(&self) -> bool {
        FieldGroup::ALL
            .into_iter()
            .any(|g| !g.is_identity() && self.fields.has(g))
    }

    pub fn experience_summary(&self, max_entries: usize) -> String {
        self.fields
            .experience
            .iter()
            .take(max_entries)
            .map(Experience::summary)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    pub fn education_summary(&self, max_entries: usize) -> String {
        self.fields
            .education
            .iter()
            .take(max_entries)
            .map(Education::summary)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    pub fn skills_summary(&self, max_entries: usize) -> String {
        self.fields
            .skills
            .iter()
            .take(max_entries)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// How a visit went, as reported to the rate controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// Recoverable: the page loaded but yielded nothing beyond identity.
    SoftFailure,
    /// The navigation itself failed.
    HardFailure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::SoftFailure => write!(f, "soft-failure"),
            Self::HardFailure => write!(f, "hard-failure"),
        }
    }
}

/// A completed network exchange observed by the browser session.
#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    pub url: String,
    pub status: u16,
    pub body: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl InterceptedResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
            timestamp: Utc::now(),
        }
    }

    /// Stamp with the time the response headers arrived rather than now.
    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = at;
        self
    }
}
