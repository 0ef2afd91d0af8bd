// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Response correlation: turns intercepted API traffic into fragments.
//!
//! The correlator attributes responses to a subject purely by time: whatever
//! arrives while a [`CaptureWindow`] is open belongs to that window's visit.
//! The upstream API does not carry a reliable request-to-subject key, so at
//! most one window may be open, and anything observed while no window is open
//! (or stamped before the window opened) is discarded.

use crate::error::{DecodeError, HarvestError, HarvestResult};
use crate::types::{
    Cursor, Education, Experience, FieldSet, Fragment, FragmentKind, InterceptedResponse,
    Payload, Provenance, SearchHit, SearchPage,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Default bound on fragments accumulated by one window.
pub const DEFAULT_WINDOW_CAPACITY: usize = 256;

/// Every endpoint we decode lives under this path.
const API_PREFIX: &str = "/voyager/api/";

/// A known endpoint family: path must contain every `all_of` needle and at
/// least one `any_of` needle (lowercase).
struct EndpointSignature {
    kind: FragmentKind,
    all_of: &'static [&'static str],
    any_of: &'static [&'static str],
}

/// Checked in order; the first match wins.
const SIGNATURES: &[EndpointSignature] = &[
    EndpointSignature {
        kind: FragmentKind::Search,
        all_of: &["search"],
        any_of: &["clusters", "blended", "people"],
    },
    EndpointSignature {
        kind: FragmentKind::Contact,
        all_of: &[],
        any_of: &["profilecontactinfo", "contactinfo"],
    },
    EndpointSignature {
        kind: FragmentKind::Skills,
        all_of: &[],
        any_of: &["normskills", "/skills", "featuredbysection"],
    },
    EndpointSignature {
        kind: FragmentKind::Profile,
        all_of: &["/identity/"],
        any_of: &["profile", "position", "education", "dash"],
    },
];

/// Classify a response URL against the known endpoint signatures.
pub fn classify(url: &str) -> Option<FragmentKind> {
    let lower = url.to_ascii_lowercase();
    if !lower.contains(API_PREFIX) {
        return None;
    }
    SIGNATURES
        .iter()
        .find(|sig| {
            sig.all_of.iter().all(|n| lower.contains(n))
                && sig.any_of.iter().any(|n| lower.contains(n))
        })
        .map(|sig| sig.kind)
}

/// What happened to one observed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// No window was open, or the response predates the window.
    Discarded,
    /// Not a known endpoint, or not a 200.
    Noise,
    /// Decoded and appended to the window.
    Captured(FragmentKind),
    /// Known endpoint, well-formed, but carried nothing usable.
    Empty(FragmentKind),
    /// Known endpoint with an undecodable body.
    DecodeFailed(FragmentKind),
    /// Decoded fragment belongs to a different subject.
    Misattributed(FragmentKind),
    /// The window accumulator is full.
    Overflow(FragmentKind),
}

/// The span during which responses are attributed to one visit.
#[derive(Debug)]
pub struct CaptureWindow {
    subject: Option<String>,
    opened_at: DateTime<Utc>,
    fragments: Vec<Fragment>,
    decode_errors: Vec<DecodeError>,
    dropped: usize,
    capacity: usize,
}

impl CaptureWindow {
    fn new(subject: Option<String>, capacity: usize) -> Self {
        Self {
            subject,
            opened_at: Utc::now(),
            fragments: Vec::new(),
            decode_errors: Vec::new(),
            dropped: 0,
            capacity,
        }
    }

    /// Subject being visited; `None` for search visits.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn decode_errors(&self) -> &[DecodeError] {
        &self.decode_errors
    }

    /// Fragments dropped because the accumulator was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_fragments(self) -> Vec<Fragment> {
        self.fragments
    }

    /// Search pages captured in this window, in arrival order.
    pub fn search_pages(&self) -> impl Iterator<Item = &SearchPage> {
        self.fragments.iter().filter_map(Fragment::search_page)
    }
}

/// Observes responses and accumulates fragments into the open window.
#[derive(Debug)]
pub struct ResponseCorrelator {
    window: Option<CaptureWindow>,
    capacity: usize,
}

impl Default for ResponseCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WINDOW_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            window: None,
            capacity: capacity.max(1),
        }
    }

    /// Open a window for `subject` (or for a search when `None`).
    pub fn open(&mut self, subject: Option<&str>) -> HarvestResult<()> {
        if let Some(w) = &self.window {
            return Err(HarvestError::WindowAlreadyOpen(
                w.subject().unwrap_or("search").to_string(),
            ));
        }
        self.window = Some(CaptureWindow::new(
            subject.map(str::to_string),
            self.capacity,
        ));
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.window.is_some()
    }

    pub fn window(&self) -> Option<&CaptureWindow> {
        self.window.as_ref()
    }

    /// Close the open window and hand back its accumulator.
    pub fn close(&mut self) -> Option<CaptureWindow> {
        self.window.take()
    }

    /// Classify and decode one response into the open window.
    pub fn observe(&mut self, response: &InterceptedResponse) -> Observation {
        let Some(window) = self.window.as_mut() else {
            debug!("discarding response outside capture window: {}", response.url);
            return Observation::Discarded;
        };
        if response.timestamp < window.opened_at {
            debug!("discarding stale response: {}", response.url);
            return Observation::Discarded;
        }
        let Some(kind) = classify(&response.url) else {
            return Observation::Noise;
        };
        if response.status != 200 {
            debug!("ignoring {kind} response with status {}", response.status);
            return Observation::Noise;
        }

        match decode(kind, &response.url, &response.body, window.subject()) {
            Ok(Some(fragment)) => {
                if let (Some(expected), Some(actual)) = (window.subject(), fragment.subject()) {
                    if expected != actual {
                        debug!("dropping {kind} fragment for {actual} during visit to {expected}");
                        return Observation::Misattributed(kind);
                    }
                }
                if window.fragments.len() >= window.capacity {
                    window.dropped += 1;
                    warn!(
                        "capture window full ({} fragments), dropping {kind} fragment",
                        window.capacity
                    );
                    return Observation::Overflow(kind);
                }
                window.fragments.push(fragment);
                Observation::Captured(kind)
            }
            Ok(None) => Observation::Empty(kind),
            Err(e) => {
                debug!("{e}");
                window.decode_errors.push(e);
                Observation::DecodeFailed(kind)
            }
        }
    }
}

// ── Decoding ──

/// Decode a body from a known endpoint. `Ok(None)` means well-formed but empty.
pub fn decode(
    kind: FragmentKind,
    url: &str,
    body: &[u8],
    window_subject: Option<&str>,
) -> Result<Option<Fragment>, DecodeError> {
    let fail = |reason: String| DecodeError {
        kind,
        url: url.to_string(),
        reason,
    };

    let text = std::str::from_utf8(body).map_err(|e| fail(format!("invalid UTF-8: {e}")))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(fail("empty body".into()));
    }
    let data: Value =
        serde_json::from_str(trimmed).map_err(|e| fail(format!("invalid JSON: {e}")))?;
    if !data.is_object() {
        return Err(fail("expected a JSON object".into()));
    }

    let fragment = match kind {
        FragmentKind::Search => decode_search(&data).map(|page| {
            Fragment::new(Provenance::Api, None, Payload::Search(page))
        }),
        FragmentKind::Profile => decode_profile(&data, window_subject).map(|(subject, fields)| {
            Fragment::new(Provenance::Api, subject, Payload::Profile(fields))
        }),
        FragmentKind::Contact => {
            let subject = contact_subject(url).or_else(|| window_subject.map(str::to_string));
            decode_contact(&data)
                .map(|fields| Fragment::new(Provenance::Api, subject, Payload::Contact(fields)))
        }
        FragmentKind::Skills => decode_skills(&data).map(|fields| {
            Fragment::new(
                Provenance::Api,
                window_subject.map(str::to_string),
                Payload::Skills(fields),
            )
        }),
    };
    Ok(fragment)
}

fn included(data: &Value) -> impl Iterator<Item = &Value> {
    data.get("included")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn type_of(item: &Value) -> &str {
    item.get("$type")
        .or_else(|| item.get("_type"))
        .and_then(Value::as_str)
        .unwrap_or("")
}

fn text(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn full_name(item: &Value) -> Option<String> {
    let first = text(item, "firstName").unwrap_or_default();
    let last = text(item, "lastName").unwrap_or_default();
    let name = format!("{first} {last}").trim().to_string();
    (!name.is_empty()).then_some(name)
}

fn mini_profile_urn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"fs_miniProfile:(.+)").expect("mini profile regex is valid"))
}

fn owner_urn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([^,)]+)").expect("owner urn regex is valid"))
}

fn contact_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)/profiles/([^/?]+)/profileContactInfo").expect("contact url regex is valid")
    })
}

fn decode_search(data: &Value) -> Option<SearchPage> {
    let mut hits: Vec<SearchHit> = Vec::new();
    let mut seen = HashSet::new();

    for item in included(data) {
        let ty = type_of(item);
        let candidate = if ty.contains("MiniProfile") || ty.contains("miniProfile") {
            Some(item)
        } else {
            item.get("miniProfile").or_else(|| {
                item.pointer("/hitInfo/com.linkedin.voyager.search.SearchProfile/miniProfile")
            })
        };
        if let Some(hit) = candidate.and_then(mini_profile) {
            if seen.insert(hit.public_id.clone()) {
                hits.push(hit);
            }
        }
    }

    let cursor = search_cursor(data);
    if hits.is_empty() && cursor.is_none() {
        return None;
    }
    Some(SearchPage { hits, cursor })
}

fn mini_profile(item: &Value) -> Option<SearchHit> {
    let public_id = text(item, "publicIdentifier")
        .or_else(|| text(item, "public_id"))
        .or_else(|| {
            let urn = item.get("entityUrn").and_then(Value::as_str)?;
            mini_profile_urn_re()
                .captures(urn)
                .map(|c| c[1].to_string())
        })?;

    let mut hit = SearchHit::new(public_id, Provenance::Api);
    hit.name = full_name(item);
    hit.headline = text(item, "occupation").or_else(|| text(item, "headline"));
    hit.location = text(item, "locationName");
    Some(hit)
}

fn search_cursor(data: &Value) -> Option<Cursor> {
    let roots = [Some(data), data.get("data")];
    for root in roots.into_iter().flatten() {
        if let Some(token) = root
            .pointer("/metadata/paginationToken")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        {
            return Some(Cursor(token.to_string()));
        }
    }
    for root in roots.into_iter().flatten() {
        if let Some(paging) = root.get("paging") {
            let field = |k: &str| paging.get(k).and_then(Value::as_u64);
            if let (Some(start), Some(count), Some(total)) =
                (field("start"), field("count"), field("total"))
            {
                let next = start + count;
                if count > 0 && next < total {
                    return Some(Cursor(next.to_string()));
                }
                return None;
            }
        }
    }
    None
}

fn decode_profile(data: &Value, window_subject: Option<&str>) -> Option<(Option<String>, FieldSet)> {
    let profiles: Vec<&Value> = included(data)
        .filter(|item| type_of(item).contains("Profile") && text(item, "publicIdentifier").is_some())
        .collect();
    let primary = profiles
        .iter()
        .copied()
        .find(|p| window_subject.is_some() && text(p, "publicIdentifier").as_deref() == window_subject)
        .or_else(|| profiles.first().copied());

    let mut fields = FieldSet::default();
    let mut subject = window_subject.map(str::to_string);
    let primary_urn = primary
        .and_then(|p| text(p, "entityUrn"))
        .unwrap_or_default();

    if let Some(p) = primary {
        subject = text(p, "publicIdentifier");
        fields.name = full_name(p);
        fields.headline = text(p, "headline");
        fields.location = text(p, "locationName").or_else(|| text(p, "geoLocationName"));
        fields.industry = text(p, "industryName").or_else(|| text(p, "industry"));
        fields.about = text(p, "summary");
        fields.connections = connection_count(p);
    }

    let primary_id = primary.and_then(|p| text(p, "publicIdentifier"));
    let other_urns: Vec<String> = profiles
        .iter()
        .filter(|p| text(p, "publicIdentifier") != primary_id)
        .filter_map(|p| text(p, "entityUrn"))
        .collect();

    // Entries owned by another member are dropped; unresolvable ones stay.
    let owned_here = |item: &Value| -> bool {
        let Some(urn) = item.get("entityUrn").and_then(Value::as_str) else {
            return true;
        };
        let Some(caps) = owner_urn_re().captures(urn) else {
            return true;
        };
        let member = &caps[1];
        if !primary_urn.is_empty() && primary_urn.contains(member) {
            return true;
        }
        !other_urns.iter().any(|u| u.contains(member))
    };

    for item in included(data) {
        let ty = type_of(item);
        if ty.contains("Position") && owned_here(item) {
            fields.experience.push(position(item));
        } else if ty.contains("Education") && owned_here(item) {
            if let Some(edu) = education(item) {
                fields.education.push(edu);
            }
        }
    }
    fields.derive_position();

    if fields.is_empty() {
        return None;
    }
    Some((subject, fields))
}

fn connection_count(profile: &Value) -> Option<String> {
    match profile.get("connections")? {
        Value::Object(conns) => conns
            .get("paging")
            .and_then(|p| p.get("total"))
            .and_then(Value::as_u64)
            .map(|n| n.to_string()),
        Value::Number(n) => n.as_f64().map(|f| (f as u64).to_string()),
        _ => None,
    }
}

fn position(item: &Value) -> Experience {
    let company = match item.get("company").or_else(|| item.get("companyName")) {
        Some(c @ Value::Object(_)) => c
            .pointer("/miniCompany/name")
            .and_then(Value::as_str)
            .or_else(|| c.get("name").and_then(Value::as_str))
            .unwrap_or("")
            .to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };
    Experience {
        title: text(item, "title").unwrap_or_default(),
        company,
        location: text(item, "locationName"),
        date_range: date_range(item.get("timePeriod")),
    }
}

fn education(item: &Value) -> Option<Education> {
    let school = text(item, "schoolName")
        .or_else(|| item.get("school").and_then(|s| text(s, "name")))
        .unwrap_or_default();
    let degree = text(item, "degreeName");
    if school.is_empty() && degree.is_none() {
        return None;
    }
    Some(Education {
        school,
        degree,
        field_of_study: text(item, "fieldOfStudy"),
        date_range: date_range(item.get("timePeriod")),
    })
}

/// `M/YYYY - M/YYYY`, `YYYY - Present`, ...
fn date_range(period: Option<&Value>) -> Option<String> {
    let period = period?.as_object()?;
    if period.is_empty() {
        return None;
    }
    let format_date = |d: &Value| -> Option<String> {
        let year = d.get("year").and_then(Value::as_u64)?;
        Some(match d.get("month").and_then(Value::as_u64) {
            Some(month) => format!("{month}/{year}"),
            None => year.to_string(),
        })
    };
    let mut parts = Vec::new();
    if let Some(start) = period.get("startDate").and_then(format_date) {
        parts.push(start);
    }
    match period.get("endDate").and_then(format_date) {
        Some(end) => parts.push(end),
        None => parts.push("Present".to_string()),
    }
    Some(parts.join(" - "))
}

fn contact_subject(url: &str) -> Option<String> {
    contact_url_re().captures(url).map(|c| c[1].to_string())
}

/// First element of an array, as a string or via `key` of an object.
fn first_entry(payload: &Value, array: &str, key: &str) -> Option<String> {
    match payload.get(array)?.as_array()?.first()? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        obj @ Value::Object(_) => text(obj, key),
        _ => None,
    }
}

fn decode_contact(data: &Value) -> Option<FieldSet> {
    let payload = data.get("data").filter(|d| d.is_object()).unwrap_or(data);
    let mut fields = FieldSet::default();

    fields.email = match payload.get("emailAddress") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(obj @ Value::Object(_)) => text(obj, "emailAddress"),
        _ => None,
    };
    fields.phone = first_entry(payload, "phoneNumbers", "number");
    fields.website = first_entry(payload, "websites", "url");
    fields.twitter = first_entry(payload, "twitterHandles", "name")
        .map(|handle| format!("https://twitter.com/{}", handle.trim_start_matches('@')));

    (!fields.is_empty()).then_some(fields)
}

fn decode_skills(data: &Value) -> Option<FieldSet> {
    let mut skills: Vec<String> = Vec::new();
    for name in included(data).filter_map(|item| text(item, "name")) {
        if !skills.contains(&name) {
            skills.push(name);
        }
    }
    if skills.is_empty() {
        return None;
    }
    Some(FieldSet {
        skills,
        ..FieldSet::default()
    })
}
