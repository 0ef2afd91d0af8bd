// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Structural page extraction, used only for field groups the API left empty.
//!
//! Parsing works on a copy of the page HTML, so extraction is idempotent and
//! never touches the live page. The selector catalog is compiled once per
//! extractor.

use crate::types::{
    Education, Experience, FieldGroup, FieldSet, Fragment, Payload, Provenance, SearchHit,
    SearchPage,
};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::debug;

const MAX_EXPERIENCE: usize = 5;
const MAX_EDUCATION: usize = 3;
const MAX_SKILLS: usize = 10;
/// Shorter about texts are partial matches (button labels, ellipses).
const MIN_ABOUT_LEN: usize = 10;

/// Compiled selector catalog for profile and search pages.
struct Selectors {
    // Profile header
    name: Selector,
    headline: Selector,
    location: Selector,
    connections: Selector,
    // Sections are found by the anchor they contain.
    section: Selector,
    about_anchor: Selector,
    experience_anchor: Selector,
    education_anchor: Selector,
    about_text: Vec<Selector>,
    list_item: Selector,
    item_primary: Selector,
    item_secondary: Selector,
    item_caption: Selector,
    skill: Selector,
    // Contact overlay
    email: Selector,
    phone: Selector,
    website: Selector,
    // Search result cards
    result_card: Selector,
    result_link: Selector,
    result_name: Selector,
    result_headline: Selector,
    result_location: Selector,
}

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("fallback selector is valid")
}

impl Selectors {
    fn compile() -> Self {
        Self {
            name: sel(r#"h1.text-heading-xlarge, h1[class*="text-heading"]"#),
            headline: sel("div.text-body-medium.break-words"),
            location: sel("span.text-body-small.inline.t-black--light.break-words"),
            connections: sel("li.text-body-small span.t-bold"),
            section: sel("section"),
            about_anchor: sel("#about"),
            experience_anchor: sel("#experience"),
            education_anchor: sel("#education"),
            about_text: vec![
                sel(r#"span[aria-hidden="true"]"#),
                sel("div.display-flex span"),
                sel("div.inline-show-more-text span"),
            ],
            list_item: sel("li.artdeco-list__item"),
            item_primary: sel(r#"div.display-flex span[aria-hidden="true"]"#),
            item_secondary: sel(r#"span.t-14.t-normal span[aria-hidden="true"]"#),
            item_caption: sel(r#"span.t-14.t-normal.t-black--light span[aria-hidden="true"]"#),
            skill: sel(r#"#skills ~ div ul > li span[aria-hidden="true"]"#),
            email: sel(r#"section.ci-email a[href^="mailto:"]"#),
            phone: sel("section.ci-phone span.t-14.t-black.t-normal"),
            website: sel("section.ci-websites a.link-without-visited-state"),
            result_card: sel("li.reusable-search__result-container"),
            result_link: sel(r#"span.entity-result__title-text a[href*="/in/"]"#),
            result_name: sel(r#"span.entity-result__title-text a span[aria-hidden="true"]"#),
            result_headline: sel("div.entity-result__primary-subtitle"),
            result_location: sel("div.entity-result__secondary-subtitle"),
        }
    }
}

fn public_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/in/([^/?#]+)").expect("profile link regex is valid"))
}

/// Collapsed inner text of an element.
fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .map(text_of)
        .find(|t| !t.is_empty())
}

/// Extracts fields from rendered page content.
pub struct FallbackExtractor {
    selectors: Selectors,
}

impl Default for FallbackExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FallbackExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackExtractor").finish_non_exhaustive()
    }
}

impl FallbackExtractor {
    pub fn new() -> Self {
        Self {
            selectors: Selectors::compile(),
        }
    }

    /// Extract exactly the `missing` groups from a profile page.
    ///
    /// Returns a DOM-provenance fragment holding only the groups found, or
    /// `None` when the page yields none of them.
    pub fn extract(
        &self,
        html: &str,
        missing: &BTreeSet<FieldGroup>,
        subject: &str,
    ) -> Option<Fragment> {
        if missing.is_empty() {
            return None;
        }
        let document = Html::parse_document(html);
        let root = document.root_element();
        let s = &self.selectors;
        let mut fields = FieldSet::default();

        for group in missing {
            match group {
                FieldGroup::Name => fields.name = first_text(root, &s.name),
                FieldGroup::Headline => fields.headline = first_text(root, &s.headline),
                FieldGroup::Location => fields.location = first_text(root, &s.location),
                FieldGroup::Connections => fields.connections = first_text(root, &s.connections),
                FieldGroup::About => fields.about = self.about(root),
                FieldGroup::Experience => fields.experience = self.experience(root),
                FieldGroup::Position => {
                    let mut derived = FieldSet {
                        experience: self.experience(root),
                        ..FieldSet::default()
                    };
                    derived.derive_position();
                    fields.company = derived.company;
                    fields.title = derived.title;
                }
                FieldGroup::Education => fields.education = self.education(root),
                FieldGroup::Skills => fields.skills = self.skills(root),
                FieldGroup::Email => fields.email = self.email(root),
                FieldGroup::Phone => {
                    fields.phone =
                        first_text(root, &s.phone).filter(|t| t.chars().any(|c| c.is_ascii_digit()))
                }
                FieldGroup::Website => fields.website = self.website(root),
                // No structural source on the rendered page.
                FieldGroup::Industry | FieldGroup::Twitter => {}
            }
        }

        if fields.is_empty() {
            debug!(subject, "fallback found none of {} missing groups", missing.len());
            return None;
        }
        debug!(subject, groups = ?fields.groups(), "fallback filled groups");
        Some(Fragment::dom(subject, Payload::Profile(fields)))
    }

    /// Parse search result cards. Hits carry DOM provenance.
    pub fn search_hits(&self, html: &str) -> Vec<SearchHit> {
        let document = Html::parse_document(html);
        let s = &self.selectors;
        let mut seen = BTreeSet::new();
        let mut hits = Vec::new();

        for card in document.select(&s.result_card) {
            let Some(href) = card
                .select(&s.result_link)
                .find_map(|a| a.value().attr("href"))
            else {
                continue;
            };
            let Some(public_id) = public_id_regex()
                .captures(href)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
            else {
                continue;
            };
            if !seen.insert(public_id.clone()) {
                continue;
            }
            let mut hit = SearchHit::new(public_id, Provenance::Dom);
            hit.name = first_text(card, &s.result_name);
            hit.headline = first_text(card, &s.result_headline);
            hit.location = first_text(card, &s.result_location);
            hits.push(hit);
        }
        hits
    }

    /// A DOM search fragment for the page, or `None` when it has no cards.
    /// Never carries a cursor.
    pub fn search_fragment(&self, html: &str) -> Option<Fragment> {
        let hits = self.search_hits(html);
        if hits.is_empty() {
            return None;
        }
        Some(Fragment::new(
            Provenance::Dom,
            None,
            Payload::Search(SearchPage { hits, cursor: None }),
        ))
    }

    // ── Sections ──

    fn section<'a>(&self, root: ElementRef<'a>, anchor: &Selector) -> Option<ElementRef<'a>> {
        root.select(&self.selectors.section)
            .find(|section| section.select(anchor).next().is_some())
    }

    fn about(&self, root: ElementRef<'_>) -> Option<String> {
        let section = self.section(root, &self.selectors.about_anchor)?;
        self.selectors.about_text.iter().find_map(|selector| {
            section
                .select(selector)
                .map(text_of)
                .find(|t| t.len() > MIN_ABOUT_LEN)
        })
    }

    fn experience(&self, root: ElementRef<'_>) -> Vec<Experience> {
        let s = &self.selectors;
        let Some(section) = self.section(root, &s.experience_anchor) else {
            return Vec::new();
        };
        section
            .select(&s.list_item)
            .take(MAX_EXPERIENCE)
            .filter_map(|item| {
                let title = first_text(item, &s.item_primary).unwrap_or_default();
                let company = first_text(item, &s.item_secondary).unwrap_or_default();
                if title.is_empty() && company.is_empty() {
                    return None;
                }
                Some(Experience {
                    title,
                    company,
                    location: None,
                    date_range: first_text(item, &s.item_caption),
                })
            })
            .collect()
    }

    fn education(&self, root: ElementRef<'_>) -> Vec<Education> {
        let s = &self.selectors;
        let Some(section) = self.section(root, &s.education_anchor) else {
            return Vec::new();
        };
        section
            .select(&s.list_item)
            .take(MAX_EDUCATION)
            .filter_map(|item| {
                let school = first_text(item, &s.item_primary)?;
                Some(Education {
                    school,
                    degree: first_text(item, &s.item_secondary),
                    field_of_study: None,
                    date_range: first_text(item, &s.item_caption),
                })
            })
            .collect()
    }

    fn skills(&self, root: ElementRef<'_>) -> Vec<String> {
        let mut skills: Vec<String> = Vec::new();
        for text in root.select(&self.selectors.skill).take(MAX_SKILLS).map(text_of) {
            if !text.is_empty() && !skills.contains(&text) {
                skills.push(text);
            }
        }
        skills
    }

    fn email(&self, root: ElementRef<'_>) -> Option<String> {
        let el = root.select(&self.selectors.email).next()?;
        if let Some(address) = el
            .value()
            .attr("href")
            .and_then(|h| h.strip_prefix("mailto:"))
            .map(str::trim)
            .filter(|a| !a.is_empty())
        {
            return Some(address.to_string());
        }
        Some(text_of(el)).filter(|t| t.contains('@'))
    }

    fn website(&self, root: ElementRef<'_>) -> Option<String> {
        let el = root.select(&self.selectors.website).next()?;
        el.value()
            .attr("href")
            .map(str::to_string)
            .or_else(|| Some(text_of(el)))
            .filter(|w| !w.is_empty())
    }
}
