use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::coauthors::{CoauthorOutcome, CoauthorReconciler};
use crate::config::ResolvedConfig;
use crate::dblp::DblpClient;
use crate::domain::{IdentityLink, Pid, RemoteProfile};
use crate::error::KiraError;
use crate::note::{join_lines, merge_subject_note, split_lines};
use crate::orgs::{
    MatchReport, OrganizationCatalog, OrganizationMatcher, Resolution, register_organization,
};
use crate::profile::parse_profile;
use crate::publications::{PublicationOutcome, PublicationReconciler};
use crate::sanitize::slice_at_first_comma_with;
use crate::vault::NoteStore;

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub profile: String,
    pub pid: String,
    pub publication_count: Option<u32>,
    pub publications: Vec<PublicationOutcome>,
    pub coauthors: Vec<CoauthorOutcome>,
    pub organizations: Vec<OrganizationOutcome>,
    pub links: Vec<IdentityLink>,
    pub subject_note: String,
    pub subject_updated: bool,
    pub synced_at: String,
}

impl SyncReport {
    pub fn writes(&self) -> usize {
        self.publications.iter().filter(|p| p.wrote()).count()
            + self.coauthors.iter().filter(|c| c.wrote()).count()
            + self.organizations.iter().filter(|o| o.registered).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizationOutcome {
    pub affiliation: String,
    pub resolution: Resolution,
    pub registered: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<D: DblpClient, S: NoteStore> {
    client: D,
    store: S,
    config: ResolvedConfig,
}

impl<D: DblpClient, S: NoteStore> App<D, S> {
    pub fn new(client: D, store: S, config: ResolvedConfig) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    pub fn client(&self) -> &D {
        &self.client
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sync_profile(
        &self,
        profile: &str,
        subject_note: &str,
        sink: &dyn ProgressSink,
    ) -> Result<SyncReport, KiraError> {
        let start = Instant::now();
        let pid: Pid = profile.parse()?;
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; profile {pid}"),
            elapsed: None,
        });
        let remote = self.fetch_remote(&pid)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; {} publications, {} coauthors",
                remote.publications.len(),
                remote.coauthors.len()
            ),
            elapsed: Some(start.elapsed()),
        });

        let folders = &self.config.folders;
        let catalog = OrganizationCatalog::load(&self.store, &folders.organizations)?;
        let organizations = self.resolve_affiliations(&remote, &catalog);
        let links = remote.identity_links(&self.config.dblp_base_url);

        sink.event(ProgressEvent {
            message: "phase=Store; publications".to_string(),
            elapsed: Some(start.elapsed()),
        });
        let reconciler = PublicationReconciler::new(&self.client, &self.store, folders);
        let publications = in_bounded_groups(&remote.publications, self.config.concurrency, |record| {
            reconciler.reconcile(record)
        });

        sink.event(ProgressEvent {
            message: "phase=Store; coauthors".to_string(),
            elapsed: Some(start.elapsed()),
        });
        let reconciler =
            CoauthorReconciler::new(&self.store, &folders.people, &self.config.dblp_base_url);
        let coauthors = in_bounded_groups(&remote.coauthors, self.config.concurrency, |coauthor| {
            reconciler.reconcile(coauthor)
        });

        let synced_at = iso_timestamp();
        let resolved = organizations
            .iter()
            .map(|org| org.resolution.name().to_string())
            .collect::<Vec<_>>();
        let subject_updated = match self.update_subject(subject_note, &links, &resolved, &synced_at)
        {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %subject_note, pid = %pid, error = %err, "subject note not updated");
                false
            }
        };

        let report = SyncReport {
            profile: remote.name.clone(),
            pid: pid.to_string(),
            publication_count: remote.publication_count,
            publications,
            coauthors,
            organizations,
            links,
            subject_note: subject_note.to_string(),
            subject_updated,
            synced_at,
        };
        info!(pid = %pid, writes = report.writes(), "sync finished");
        sink.event(ProgressEvent {
            message: format!("phase=Done; {} notes written", report.writes()),
            elapsed: Some(start.elapsed()),
        });
        Ok(report)
    }

    pub fn match_affiliation(&self, affiliation: &str) -> Result<MatchReport, KiraError> {
        let catalog =
            OrganizationCatalog::load(&self.store, &self.config.folders.organizations)?;
        let truncated = slice_at_first_comma_with(affiliation, &self.config.affiliation_prefixes);
        Ok(OrganizationMatcher::new(&catalog).evaluate(&truncated))
    }

    fn fetch_remote(&self, pid: &Pid) -> Result<RemoteProfile, KiraError> {
        let xml = self.client.fetch_profile(pid).map_err(|err| {
            warn!(pid = %pid, error = %err, "profile fetch failed");
            KiraError::ProfileFetch(format!("{pid}: {err}"))
        })?;
        if xml.trim().is_empty() {
            return Err(KiraError::ProfileFetch(format!("{pid}: empty response")));
        }
        parse_profile(&xml)
    }

    // Each occurrence is resolved on its own; a repeated new organization
    // hits create-if-absent twice and the second call is a no-op.
    fn resolve_affiliations(
        &self,
        remote: &RemoteProfile,
        catalog: &OrganizationCatalog,
    ) -> Vec<OrganizationOutcome> {
        let matcher = OrganizationMatcher::new(catalog);
        let folder = &self.config.folders.organizations;
        remote
            .current_affiliations()
            .filter_map(|affiliation| {
                let truncated =
                    slice_at_first_comma_with(affiliation, &self.config.affiliation_prefixes);
                if truncated.trim().is_empty() {
                    warn!(%affiliation, "affiliation names no organization; skipped");
                    return None;
                }
                let resolution = matcher.evaluate(&truncated).resolution;
                let registered = match &resolution {
                    Resolution::Known { .. } => false,
                    Resolution::New { name } => {
                        match register_organization(&self.store, folder, name) {
                            Ok(created) => created,
                            Err(err) => {
                                warn!(%folder, organization = %name, error = %err, "organization note not created");
                                false
                            }
                        }
                    }
                };
                Some(OrganizationOutcome {
                    affiliation: affiliation.to_string(),
                    resolution,
                    registered,
                })
            })
            .collect()
    }

    fn update_subject(
        &self,
        path: &str,
        links: &[IdentityLink],
        organizations: &[String],
        timestamp: &str,
    ) -> Result<(), KiraError> {
        let lines = match self.store.read_text(path) {
            Ok(text) => split_lines(&text),
            Err(KiraError::NoteNotFound(_)) => Vec::new(),
            Err(err) => return Err(err),
        };
        let merged = merge_subject_note(lines, links, organizations, timestamp).map_err(
            |err| match err {
                KiraError::MalformedNote(_) => KiraError::MalformedNote(path.to_string()),
                other => other,
            },
        )?;
        self.store.write_text(path, &join_lines(&merged))
    }
}

fn in_bounded_groups<T, R, F>(items: &[T], limit: usize, work: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let work = &work;
    let mut results = Vec::with_capacity(items.len());
    for group in items.chunks(limit.max(1)) {
        thread::scope(|scope| {
            let handles = group
                .iter()
                .map(|item| scope.spawn(move || work(item)))
                .collect::<Vec<_>>();
            for handle in handles {
                match handle.join() {
                    Ok(result) => results.push(result),
                    Err(payload) => std::panic::resume_unwind(payload),
                }
            }
        });
    }
    results
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
