use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Folders;
use crate::dblp::DblpClient;
use crate::domain::{PublicationRecord, Venue};
use crate::error::KiraError;
use crate::note::{AUTHOR_TAG, KEY_FIELD, SENTINEL, join_lines, read_field, split_lines};
use crate::sanitize::{normalize_path, sanitize};
use crate::vault::{NoteStore, note_path};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublicationOutcome {
    Created { key: String, path: String },
    Disambiguated { key: String, path: String },
    AlreadySynced { key: String, path: String },
    Skipped { key: String, reason: String },
}

impl PublicationOutcome {
    pub fn wrote(&self) -> bool {
        matches!(
            self,
            PublicationOutcome::Created { .. } | PublicationOutcome::Disambiguated { .. }
        )
    }
}

/// Uppercase letters of a venue name: `Int'l Conf. on Foo` becomes `ICF`.
pub fn venue_acronym(booktitle: &str) -> String {
    let acronym = booktitle
        .chars()
        .filter(|ch| ch.is_uppercase())
        .collect::<String>();
    if acronym.is_empty() {
        sanitize(booktitle)
    } else {
        acronym
    }
}

pub fn target_folder(record: &PublicationRecord, folders: &Folders) -> String {
    let year = sanitize(&record.year);
    let path = match &record.venue {
        Venue::Conference { booktitle } => {
            format!("{}/{}/{}", folders.conferences, venue_acronym(booktitle), year)
        }
        Venue::Journal { journal } => {
            format!("{}/{}/{}", folders.journals, sanitize(journal), year)
        }
        Venue::Informal { .. } => format!("{}/{}", folders.informal, year),
    };
    normalize_path(&path)
}

pub fn render_note(record: &PublicationRecord, citation: &str) -> String {
    let mut lines = vec![
        SENTINEL.to_string(),
        format!("{KEY_FIELD}: {}", record.key),
        SENTINEL.to_string(),
        "```bibtex".to_string(),
    ];
    lines.extend(split_lines(citation.trim()));
    lines.push("```".to_string());
    for author in &record.authors {
        lines.push(format!("{AUTHOR_TAG} [[{}]]", sanitize(author)));
    }
    join_lines(&lines)
}

#[derive(Debug, PartialEq, Eq)]
enum Occupant {
    Vacant,
    Same,
    Other(Option<String>),
}

pub struct PublicationReconciler<'a, D: DblpClient, S: NoteStore> {
    client: &'a D,
    store: &'a S,
    folders: &'a Folders,
}

impl<'a, D: DblpClient, S: NoteStore> PublicationReconciler<'a, D, S> {
    pub fn new(client: &'a D, store: &'a S, folders: &'a Folders) -> Self {
        Self {
            client,
            store,
            folders,
        }
    }

    pub fn reconcile(&self, record: &PublicationRecord) -> PublicationOutcome {
        let key = record.key.as_str();
        let stem = sanitize(&record.title);
        if stem.is_empty() {
            warn!(%key, title = %record.title, "title yields no note name; record skipped");
            return PublicationOutcome::Skipped {
                key: key.to_string(),
                reason: "title yields no note name".to_string(),
            };
        }
        let folder = target_folder(record, self.folders);
        if let Err(err) = self.store.ensure_folder(&folder) {
            warn!(%folder, %key, error = %err, "publication folder unavailable");
            return skipped(key, &err);
        }

        let primary = note_path(&folder, &stem);
        let alternate = note_path(
            &folder,
            &sanitize(&format!("{}({})", record.title, record.key)),
        );

        if self.occupant(&primary, key) == Occupant::Same {
            return already_synced(key, primary);
        }
        if self.occupant(&alternate, key) == Occupant::Same {
            return already_synced(key, alternate);
        }

        let citation = match self.client.fetch_citation(key) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                let err = KiraError::DblpHttp(format!("empty citation for {key}"));
                warn!(%key, path = %primary, "citation unavailable; record skipped");
                return skipped(key, &err);
            }
            Err(err) => {
                warn!(%key, path = %primary, error = %err, "citation unavailable; record skipped");
                return skipped(key, &err);
            }
        };
        let content = render_note(record, &citation);

        match self.store.create_if_absent(&primary, &content) {
            Ok(true) => {
                info!(%key, path = %primary, "publication note created");
                return PublicationOutcome::Created {
                    key: key.to_string(),
                    path: primary,
                };
            }
            Ok(false) => {}
            Err(err) => {
                warn!(%key, path = %primary, error = %err, "publication note not written");
                return skipped(key, &err);
            }
        }

        match self.occupant(&primary, key) {
            Occupant::Same => return already_synced(key, primary),
            Occupant::Other(existing) => {
                debug!(%key, path = %primary, existing = ?existing, "title collision");
            }
            Occupant::Vacant => {}
        }

        match self.store.create_if_absent(&alternate, &content) {
            Ok(true) => {
                info!(%key, path = %alternate, "publication note created under disambiguated title");
                PublicationOutcome::Disambiguated {
                    key: key.to_string(),
                    path: alternate,
                }
            }
            Ok(false) if self.occupant(&alternate, key) == Occupant::Same => {
                already_synced(key, alternate)
            }
            Ok(false) => {
                let err = KiraError::WriteCollision {
                    path: alternate,
                    key: key.to_string(),
                };
                warn!(%key, error = %err, "publication left unsynced");
                skipped(key, &err)
            }
            Err(err) => {
                warn!(%key, path = %alternate, error = %err, "publication note not written");
                skipped(key, &err)
            }
        }
    }

    fn occupant(&self, path: &str, key: &str) -> Occupant {
        if !self.store.exists(path) {
            return Occupant::Vacant;
        }
        let recorded = self
            .store
            .read_text(path)
            .and_then(|text| read_field(KEY_FIELD, &split_lines(&text)));
        match recorded {
            Ok(Some(existing)) if existing == key => Occupant::Same,
            Ok(existing) => Occupant::Other(existing),
            Err(err) => {
                warn!(%path, %key, error = %err, "existing note has no readable key");
                Occupant::Other(None)
            }
        }
    }
}

fn already_synced(key: &str, path: String) -> PublicationOutcome {
    debug!(%key, %path, "publication already synced");
    PublicationOutcome::AlreadySynced {
        key: key.to_string(),
        path,
    }
}

fn skipped(key: &str, err: &KiraError) -> PublicationOutcome {
    PublicationOutcome::Skipped {
        key: key.to_string(),
        reason: err.to_string(),
    }
}
