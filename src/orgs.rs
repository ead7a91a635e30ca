//! An affiliation resolves to a known organization only when both scorers
//! pick the same alias and each clears its threshold. Everything else becomes
//! a new organization note.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::KiraError;
use crate::note::{metadata_lines, split_lines};
use crate::sanitize::sanitize;
use crate::vault::{NoteStore, note_path};

pub const MIN_SIMILARITY: f64 = 0.75;
pub const MAX_DISTANCE: f64 = 0.33;

const LEVENSHTEIN_WEIGHT: f64 = 0.6;
const JARO_WINKLER_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Default)]
pub struct OrganizationCatalog {
    aliases: BTreeMap<String, String>,
}

impl OrganizationCatalog {
    pub fn from_entries<I, A>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, A)>,
        A: IntoIterator<Item = String>,
    {
        let mut catalog = Self::default();
        for (canonical, aliases) in entries {
            catalog.insert(&canonical, aliases);
        }
        catalog
    }

    pub fn load<S: NoteStore + ?Sized>(store: &S, folder: &str) -> Result<Self, KiraError> {
        let mut catalog = Self::default();
        for child in store.list_children(folder)? {
            let Some(canonical) = child.strip_suffix(".md") else {
                continue;
            };
            let path = note_path(folder, canonical);
            let aliases = match store.read_text(&path) {
                Ok(text) => parse_aliases(&text, &path),
                Err(err) => {
                    warn!(%path, error = %err, "organization note unreadable; using its name only");
                    Vec::new()
                }
            };
            catalog.insert(canonical, aliases);
        }
        debug!(folder, aliases = catalog.len(), "organization catalog loaded");
        Ok(catalog)
    }

    // later entries win on alias conflicts
    fn insert(&mut self, canonical: &str, aliases: impl IntoIterator<Item = String>) {
        self.aliases
            .insert(canonical.to_string(), canonical.to_string());
        for alias in aliases {
            let alias = alias.trim();
            if !alias.is_empty() {
                self.aliases.insert(alias.to_string(), canonical.to_string());
            }
        }
    }

    pub fn canonical(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.aliases.keys().map(String::as_str)
    }
}

fn parse_aliases(text: &str, path: &str) -> Vec<String> {
    let lines = split_lines(text);
    let block = match metadata_lines(&lines) {
        Ok(Some(block)) if !block.is_empty() => block.join("\n"),
        Ok(_) => return Vec::new(),
        Err(_) => {
            debug!(%path, "organization note has an unterminated metadata block");
            return Vec::new();
        }
    };
    let value: serde_yaml::Value = match serde_yaml::from_str(&block) {
        Ok(value) => value,
        Err(err) => {
            debug!(%path, error = %err, "organization metadata is not YAML");
            return Vec::new();
        }
    };
    match value.get("aliases") {
        Some(serde_yaml::Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(serde_yaml::Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub alias: String,
    pub score: f64,
}

struct TokenSetIndex<'a> {
    entries: &'a [(String, String)],
}

impl TokenSetIndex<'_> {
    fn best(&self, query: &str) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for (alias, lowered) in self.entries {
            let score = strsim::sorensen_dice(query, lowered);
            if best.as_ref().map(|b| score > b.score).unwrap_or(true) {
                best = Some(Candidate {
                    alias: alias.clone(),
                    score,
                });
            }
        }
        best
    }
}

struct RankIndex<'a> {
    entries: &'a [(String, String)],
}

impl RankIndex<'_> {
    fn best(&self, query: &str) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for (alias, lowered) in self.entries {
            let closeness = LEVENSHTEIN_WEIGHT * strsim::normalized_levenshtein(query, lowered)
                + JARO_WINKLER_WEIGHT * strsim::jaro_winkler(query, lowered);
            let score = (1.0 - closeness).clamp(0.0, 1.0);
            if best.as_ref().map(|b| score < b.score).unwrap_or(true) {
                best = Some(Candidate {
                    alias: alias.clone(),
                    score,
                });
            }
        }
        best
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Resolution {
    Known { canonical: String, alias: String },
    New { name: String },
}

impl Resolution {
    pub fn name(&self) -> &str {
        match self {
            Resolution::Known { canonical, .. } => canonical,
            Resolution::New { name } => name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    pub query: String,
    pub similarity: Option<Candidate>,
    pub distance: Option<Candidate>,
    pub resolution: Resolution,
}

pub fn decide<'c>(similarity: Option<&'c Candidate>, distance: Option<&Candidate>) -> Option<&'c str> {
    let (similarity, distance) = (similarity?, distance?);
    let agreed = similarity.alias == distance.alias;
    (agreed && similarity.score >= MIN_SIMILARITY && distance.score <= MAX_DISTANCE)
        .then_some(similarity.alias.as_str())
}

pub struct OrganizationMatcher<'a> {
    catalog: &'a OrganizationCatalog,
    entries: Vec<(String, String)>,
}

impl<'a> OrganizationMatcher<'a> {
    pub fn new(catalog: &'a OrganizationCatalog) -> Self {
        let entries = catalog
            .aliases()
            .map(|alias| (alias.to_string(), alias.to_lowercase()))
            .collect();
        Self { catalog, entries }
    }

    /// Matches an already truncated affiliation. Pure: nothing is registered.
    pub fn evaluate(&self, affiliation: &str) -> MatchReport {
        let query = affiliation.trim().to_lowercase();
        let similarity = TokenSetIndex {
            entries: &self.entries,
        }
        .best(&query);
        let distance = RankIndex {
            entries: &self.entries,
        }
        .best(&query);

        let known = decide(similarity.as_ref(), distance.as_ref()).and_then(|alias| {
            self.catalog.canonical(alias).map(|canonical| Resolution::Known {
                canonical: canonical.to_string(),
                alias: alias.to_string(),
            })
        });
        let resolution = known.unwrap_or_else(|| Resolution::New {
            name: sanitize(affiliation),
        });

        MatchReport {
            query: affiliation.to_string(),
            similarity,
            distance,
            resolution,
        }
    }
}

pub fn register_organization<S: NoteStore + ?Sized>(
    store: &S,
    folder: &str,
    name: &str,
) -> Result<bool, KiraError> {
    store.ensure_folder(folder)?;
    let path = note_path(folder, name);
    let created = store.create_if_absent(&path, "")?;
    if created {
        info!(%path, "organization registered");
    } else {
        debug!(%path, "organization note already present");
    }
    Ok(created)
}
