use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KiraError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pid(String);

impl Pid {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn profile_url(&self, base_url: &str) -> String {
        format!("{}/pid/{}.html", base_url.trim_end_matches('/'), self.0)
    }

    pub fn xml_url(&self, base_url: &str) -> String {
        format!("{}/pid/{}.xml", base_url.trim_end_matches('/'), self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Pid {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let without_query = trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');
        let raw = match without_query.split_once("/pid/") {
            Some((_, rest)) => rest,
            None => without_query,
        };
        let raw = [".html", ".xml", ".bib", ".rss"]
            .iter()
            .find_map(|ext| raw.strip_suffix(ext))
            .unwrap_or(raw);

        let segments = raw.split('/').collect::<Vec<_>>();
        let is_valid = segments.len() >= 2
            && segments.iter().all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
            });
        if !is_valid {
            return Err(KiraError::InvalidPid(value.to_string()));
        }
        Ok(Self(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Venue {
    Conference { booktitle: String },
    Journal { journal: String },
    Informal { journal: String, publtype: String },
}

impl Venue {
    /// A booktitle makes a conference paper; a journal with a publication
    /// type tag is informal (CoRR and friends); a bare journal is a journal
    /// article. Anything else is not a venue this crate files.
    pub fn classify(
        booktitle: Option<String>,
        journal: Option<String>,
        publtype: Option<String>,
    ) -> Option<Self> {
        match (booktitle, journal, publtype) {
            (Some(booktitle), _, _) => Some(Venue::Conference { booktitle }),
            (None, Some(journal), Some(publtype)) => Some(Venue::Informal { journal, publtype }),
            (None, Some(journal), None) => Some(Venue::Journal { journal }),
            (None, None, _) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Venue::Conference { .. } => "conference",
            Venue::Journal { .. } => "journal",
            Venue::Informal { .. } => "informal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationRecord {
    pub key: String,
    pub title: String,
    pub year: String,
    pub authors: Vec<String>,
    pub venue: Venue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoauthorRecord {
    pub name: String,
    pub pid: Pid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffiliationNote {
    pub text: String,
    pub note_type: Option<String>,
    pub label: Option<String>,
}

impl AffiliationNote {
    pub fn is_current_affiliation(&self) -> bool {
        self.note_type.as_deref() == Some("affiliation") && self.label.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProfile {
    pub name: String,
    pub pid: Pid,
    pub publication_count: Option<u32>,
    pub publications: Vec<PublicationRecord>,
    pub coauthors: Vec<CoauthorRecord>,
    pub notes: Vec<AffiliationNote>,
    pub urls: Vec<String>,
}

impl RemoteProfile {
    pub fn current_affiliations(&self) -> impl Iterator<Item = &str> {
        self.notes
            .iter()
            .filter(|note| note.is_current_affiliation())
            .map(|note| note.text.as_str())
    }

    pub fn identity_links(&self, base_url: &str) -> Vec<IdentityLink> {
        let mut by_kind = BTreeMap::new();
        by_kind.insert(LinkKind::Dblp, self.pid.profile_url(base_url));
        for url in &self.urls {
            if let Some(kind) = LinkKind::classify(url) {
                by_kind.insert(kind, url.trim().to_string());
            }
        }
        by_kind
            .into_iter()
            .map(|(kind, url)| IdentityLink { kind, url })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Dblp,
    Orcid,
    Wikipedia,
    MathGenealogy,
}

impl LinkKind {
    pub fn field(&self) -> &'static str {
        match self {
            LinkKind::Dblp => crate::note::IDENTITY_FIELD,
            LinkKind::Orcid => "orcid",
            LinkKind::Wikipedia => "wikipedia",
            LinkKind::MathGenealogy => "mathgenealogy",
        }
    }

    pub fn classify(url: &str) -> Option<Self> {
        let parsed = reqwest::Url::parse(url.trim()).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        let on = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));
        if on("orcid.org") {
            Some(LinkKind::Orcid)
        } else if on("wikipedia.org") {
            Some(LinkKind::Wikipedia)
        } else if on("mathgenealogy.org") || on("genealogy.math.ndsu.nodak.edu") {
            Some(LinkKind::MathGenealogy)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityLink {
    pub kind: LinkKind,
    pub url: String,
}

impl IdentityLink {
    pub fn new(kind: LinkKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
        }
    }
}
