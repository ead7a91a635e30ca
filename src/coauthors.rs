use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::CoauthorRecord;
use crate::error::KiraError;
use crate::note::{IDENTITY_FIELD, join_lines, read_field, split_lines, upsert_field};
use crate::sanitize::sanitize;
use crate::vault::{NoteStore, note_path};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CoauthorOutcome {
    Created { name: String, path: String },
    Linked { name: String, path: String },
    Unchanged { name: String, path: String },
    Skipped { name: String, reason: String },
}

impl CoauthorOutcome {
    pub fn wrote(&self) -> bool {
        matches!(
            self,
            CoauthorOutcome::Created { .. } | CoauthorOutcome::Linked { .. }
        )
    }
}

enum Change {
    Created,
    Linked,
    Unchanged,
}

pub fn person_note_path(folder: &str, name: &str) -> String {
    note_path(folder, &sanitize(name))
}

pub struct CoauthorReconciler<'a, S: NoteStore> {
    store: &'a S,
    folder: &'a str,
    base_url: &'a str,
}

impl<'a, S: NoteStore> CoauthorReconciler<'a, S> {
    pub fn new(store: &'a S, folder: &'a str, base_url: &'a str) -> Self {
        Self {
            store,
            folder,
            base_url,
        }
    }

    pub fn reconcile(&self, coauthor: &CoauthorRecord) -> CoauthorOutcome {
        let name = coauthor.name.clone();
        let path = person_note_path(self.folder, &coauthor.name);
        let url = coauthor.pid.profile_url(self.base_url);

        let result = if self.store.exists(&path) {
            self.link_existing(&path, &url)
        } else {
            self.create(&path, &url)
        };

        match result {
            Ok(Change::Created) => {
                info!(%path, pid = %coauthor.pid, "person note created");
                CoauthorOutcome::Created { name, path }
            }
            Ok(Change::Linked) => {
                info!(%path, pid = %coauthor.pid, "person note linked");
                CoauthorOutcome::Linked { name, path }
            }
            Ok(Change::Unchanged) => CoauthorOutcome::Unchanged { name, path },
            Err(err) => {
                warn!(%path, pid = %coauthor.pid, error = %err, "person note skipped");
                CoauthorOutcome::Skipped {
                    name,
                    reason: err.to_string(),
                }
            }
        }
    }

    fn link_existing(&self, path: &str, url: &str) -> Result<Change, KiraError> {
        let lines = split_lines(&self.store.read_text(path)?);
        let map_malformed = |err: KiraError| match err {
            KiraError::MalformedNote(_) => KiraError::MalformedNote(path.to_string()),
            other => other,
        };
        if let Some(existing) = read_field(IDENTITY_FIELD, &lines).map_err(map_malformed)? {
            if existing != url {
                debug!(%path, %existing, candidate = %url, "person note keeps its identity");
            }
            return Ok(Change::Unchanged);
        }
        let updated = upsert_field(IDENTITY_FIELD, url, lines).map_err(map_malformed)?;
        self.store.write_text(path, &join_lines(&updated))?;
        Ok(Change::Linked)
    }

    fn create(&self, path: &str, url: &str) -> Result<Change, KiraError> {
        self.store.ensure_folder(self.folder)?;
        let content = join_lines(&upsert_field(IDENTITY_FIELD, url, Vec::new())?);
        if self.store.create_if_absent(path, &content)? {
            return Ok(Change::Created);
        }
        // appeared since the existence probe
        self.link_existing(path, url)
    }
}
