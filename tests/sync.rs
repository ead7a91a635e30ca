use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_scholar_sync::app::{App, ProgressEvent, ProgressSink};
use kira_scholar_sync::coauthors::CoauthorOutcome;
use kira_scholar_sync::config::{Config, ConfigLoader, ResolvedConfig};
use kira_scholar_sync::dblp::DblpClient;
use kira_scholar_sync::domain::Pid;
use kira_scholar_sync::error::KiraError;
use kira_scholar_sync::orgs::Resolution;
use kira_scholar_sync::publications::PublicationOutcome;
use kira_scholar_sync::vault::{NoteStore, Vault};

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Default)]
struct MockDblp {
    profile: Option<String>,
    citations: HashMap<String, String>,
    citation_calls: Mutex<usize>,
}

impl MockDblp {
    fn with_profile(xml: &str) -> Self {
        Self {
            profile: Some(xml.to_string()),
            ..Self::default()
        }
    }

    fn citation(mut self, key: &str) -> Self {
        self.citations
            .insert(key.to_string(), format!("@inproceedings{{DBLP:{key},\n  title = {{T}}\n}}"));
        self
    }

    fn calls(&self) -> usize {
        *self.citation_calls.lock().unwrap()
    }
}

impl DblpClient for MockDblp {
    fn fetch_profile(&self, _pid: &Pid) -> Result<String, KiraError> {
        self.profile.clone().ok_or(KiraError::DblpStatus {
            status: 404,
            message: "not found".to_string(),
        })
    }

    fn fetch_citation(&self, key: &str) -> Result<String, KiraError> {
        *self.citation_calls.lock().unwrap() += 1;
        self.citations
            .get(key)
            .cloned()
            .ok_or_else(|| KiraError::DblpHttp(format!("no citation for {key}")))
    }

    fn base_url(&self) -> &str {
        "https://dblp.org"
    }
}

fn temp_vault() -> (tempfile::TempDir, Vault) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, Vault::new(root))
}

fn config(concurrency: usize) -> ResolvedConfig {
    ConfigLoader::resolve_config(Config {
        concurrency: Some(concurrency),
        ..Config::default()
    })
}

fn snapshot(root: &Path) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
                files.insert(rel, fs::read_to_string(&path).unwrap());
            }
        }
    }
    files
}

fn without_sync_stamp(text: &str) -> String {
    text.lines()
        .filter(|line| !line.starts_with("last sync:"))
        .collect::<Vec<_>>()
        .join("\n")
}

const SCENARIO: &str = r#"<?xml version="1.0" encoding="US-ASCII"?>
<dblpperson name="Sam Subject" pid="s/SubjectS" n="1">
  <person key="homepages/s/SubjectS" mdate="2024-01-01">
    <author pid="s/SubjectS">Sam Subject</author>
    <note type="affiliation">Example University, Dept. of CS</note>
    <url>https://orcid.org/0000-0002-1825-0097</url>
  </person>
  <r><inproceedings key="conf/foo/X21" mdate="2021-06-01">
    <author pid="s/SubjectS">Sam Subject</author>
    <author pid="d/DoeJ">Jane Doe</author>
    <title>Foo Considered Harmful.</title>
    <year>2021</year>
    <booktitle>Int'l Conf. on Foo</booktitle>
  </inproceedings></r>
  <coauthors n="1" nc="1">
    <co c="0"><na f="d/DoeJ" pid="d/DoeJ">Jane Doe</na></co>
  </coauthors>
</dblpperson>"#;

#[test]
fn end_to_end_scenario() {
    let (temp, vault) = temp_vault();
    vault.write_text("Sam Subject.md", "---\n---\n").unwrap();
    let client = MockDblp::with_profile(SCENARIO).citation("conf/foo/X21");
    let app = App::new(client, vault, config(4));

    let report = app
        .sync_profile("https://dblp.org/pid/s/SubjectS.html", "Sam Subject.md", &NoopSink)
        .unwrap();

    assert_matches!(
        &report.publications[0],
        PublicationOutcome::Created { path, .. } if path == "Conference/ICF/2021/Foo Considered Harmful.md"
    );
    let files = snapshot(temp.path());
    let publication = &files["Conference/ICF/2021/Foo Considered Harmful.md"];
    assert!(publication.starts_with("---\nkey: conf/foo/X21\n---\n```bibtex\n@inproceedings{DBLP:conf/foo/X21,"));
    assert!(publication.ends_with("```\nauthor:: [[Sam Subject]]\nauthor:: [[Jane Doe]]\n"));

    assert_eq!(
        files["People/Jane Doe.md"],
        "---\ndblp-identity: https://dblp.org/pid/d/DoeJ.html\n---\n"
    );
    assert_eq!(files["Organizations/Example University.md"], "");

    let subject = &files["Sam Subject.md"];
    let lines = subject.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], "---");
    assert_eq!(lines[1], "dblp-identity: https://dblp.org/pid/s/SubjectS.html");
    assert_eq!(lines[2], "orcid: https://orcid.org/0000-0002-1825-0097");
    assert_eq!(lines[3], "---");
    assert_eq!(lines[4], "affiliation:: [[Example University]]");
    assert!(lines[5].starts_with("last sync: "));
    assert_eq!(lines.len(), 6);
    assert!(report.subject_updated);
}

#[test]
fn second_run_changes_only_the_timestamp() {
    let (temp, vault) = temp_vault();
    vault
        .write_text("Sam Subject.md", "---\ntags: me\n---\n# Sam\n\nSome prose.\n")
        .unwrap();
    let client = MockDblp::with_profile(SCENARIO).citation("conf/foo/X21");
    let app = App::new(client, vault, config(4));

    app.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink).unwrap();
    let first = snapshot(temp.path());
    let calls_after_first = app.client().calls();

    let report = app.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink).unwrap();
    let second = snapshot(temp.path());

    assert_eq!(report.writes(), 0);
    assert_eq!(app.client().calls(), calls_after_first);
    assert_eq!(first.keys().collect::<Vec<_>>(), second.keys().collect::<Vec<_>>());
    for (path, content) in &first {
        if path == "Sam Subject.md" {
            assert_eq!(without_sync_stamp(content), without_sync_stamp(&second[path]));
        } else {
            assert_eq!(content, &second[path], "{path} changed");
        }
    }
    assert!(first["Sam Subject.md"].contains("# Sam\n\nSome prose.\n"));
    assert_matches!(report.publications[0], PublicationOutcome::AlreadySynced { .. });
    assert_matches!(report.coauthors[0], CoauthorOutcome::Unchanged { .. });
}

const COLLIDING: &str = r#"<dblpperson name="Sam Subject" pid="s/SubjectS" n="2">
  <person key="homepages/s/SubjectS"><author pid="s/SubjectS">Sam Subject</author></person>
  <r><inproceedings key="conf/foo/A21">
    <author pid="s/SubjectS">Sam Subject</author>
    <title>Same Title.</title><year>2021</year><booktitle>ICF</booktitle>
  </inproceedings></r>
  <r><inproceedings key="conf/foo/B21">
    <author pid="s/SubjectS">Sam Subject</author>
    <title>Same Title.</title><year>2021</year><booktitle>ICF</booktitle>
  </inproceedings></r>
</dblpperson>"#;

#[test]
fn colliding_titles_are_both_kept() {
    let (temp, vault) = temp_vault();
    let client = MockDblp::with_profile(COLLIDING)
        .citation("conf/foo/A21")
        .citation("conf/foo/B21");
    let app = App::new(client, vault, config(1));

    let report = app.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink).unwrap();
    assert_matches!(report.publications[0], PublicationOutcome::Created { .. });
    assert_matches!(
        &report.publications[1],
        PublicationOutcome::Disambiguated { path, .. }
            if path == "Conference/ICF/2021/Same Title(conf\u{2215}foo\u{2215}B21).md"
    );

    let files = snapshot(temp.path());
    assert!(files["Conference/ICF/2021/Same Title.md"].contains("key: conf/foo/A21"));
    assert!(
        files["Conference/ICF/2021/Same Title(conf\u{2215}foo\u{2215}B21).md"]
            .contains("key: conf/foo/B21")
    );

    let rerun = app.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink).unwrap();
    assert!(rerun
        .publications
        .iter()
        .all(|p| matches!(p, PublicationOutcome::AlreadySynced { .. })));
}

#[test]
fn handwritten_note_at_title_path_is_not_overwritten() {
    let (_temp, vault) = temp_vault();
    vault
        .write_text("Conference/ICF/2021/Foo Considered Harmful.md", "my own notes\n")
        .unwrap();
    let client = MockDblp::with_profile(SCENARIO).citation("conf/foo/X21");
    let app = App::new(client, vault, config(2));

    let report = app.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink).unwrap();
    assert_matches!(report.publications[0], PublicationOutcome::Disambiguated { .. });
    assert_eq!(
        app.store()
            .read_text("Conference/ICF/2021/Foo Considered Harmful.md")
            .unwrap(),
        "my own notes\n"
    );
}

#[test]
fn failed_citation_skips_only_that_record() {
    let (_temp, vault) = temp_vault();
    let client = MockDblp::with_profile(COLLIDING).citation("conf/foo/B21");
    let app = App::new(client, vault, config(1));

    let report = app.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink).unwrap();
    assert_matches!(report.publications[0], PublicationOutcome::Skipped { .. });
    assert_matches!(report.publications[1], PublicationOutcome::Created { .. });
    assert!(app.store().read_text("Conference/ICF/2021/Same Title.md").unwrap().contains("conf/foo/B21"));
    assert!(report.subject_updated);
}

#[test]
fn missing_profile_aborts_without_writes() {
    let (temp, vault) = temp_vault();
    let app = App::new(MockDblp::default(), vault, config(4));
    let err = app
        .sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink)
        .unwrap_err();
    assert_matches!(err, KiraError::ProfileFetch(_));
    assert!(snapshot(temp.path()).is_empty());

    let empty = App::new(MockDblp::with_profile("  \n"), app.store().clone(), config(4));
    assert_matches!(
        empty.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink),
        Err(KiraError::ProfileFetch(_))
    );
    assert!(snapshot(temp.path()).is_empty());
}

#[test]
fn malformed_profile_is_a_parse_error() {
    let (temp, vault) = temp_vault();
    let app = App::new(MockDblp::with_profile("<html>nope</html>"), vault, config(4));
    assert_matches!(
        app.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink),
        Err(KiraError::ProfileParse(_))
    );
    assert!(snapshot(temp.path()).is_empty());
}

#[test]
fn existing_person_notes_keep_their_content() {
    let (_temp, vault) = temp_vault();
    vault
        .write_text("People/Jane Doe.md", "---\ntags: colleague\n---\nMet at ICF.\n")
        .unwrap();
    let client = MockDblp::with_profile(SCENARIO).citation("conf/foo/X21");
    let app = App::new(client, vault, config(4));

    let report = app.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink).unwrap();
    assert_matches!(report.coauthors[0], CoauthorOutcome::Linked { .. });
    assert_eq!(
        app.store().read_text("People/Jane Doe.md").unwrap(),
        "---\ndblp-identity: https://dblp.org/pid/d/DoeJ.html\ntags: colleague\n---\nMet at ICF.\n"
    );
}

#[test]
fn namesake_with_other_identity_is_left_alone() {
    let (_temp, vault) = temp_vault();
    let original = "---\ndblp-identity: https://dblp.org/pid/d/DoeJ2.html\n---\nA different Jane.\n";
    vault.write_text("People/Jane Doe.md", original).unwrap();
    let client = MockDblp::with_profile(SCENARIO).citation("conf/foo/X21");
    let app = App::new(client, vault, config(4));

    let report = app.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink).unwrap();
    assert_matches!(report.coauthors[0], CoauthorOutcome::Unchanged { .. });
    assert_eq!(app.store().read_text("People/Jane Doe.md").unwrap(), original);
}

#[test]
fn malformed_person_note_is_skipped() {
    let (_temp, vault) = temp_vault();
    vault.write_text("People/Jane Doe.md", "---\ntags: x\nno closing").unwrap();
    let client = MockDblp::with_profile(SCENARIO).citation("conf/foo/X21");
    let app = App::new(client, vault, config(4));

    let report = app.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink).unwrap();
    assert_matches!(&report.coauthors[0], CoauthorOutcome::Skipped { reason, .. } if reason.contains("People/Jane Doe.md"));
}

const AFFILIATIONS: &str = r#"<dblpperson name="Sam Subject" pid="s/SubjectS" n="0">
  <person key="homepages/s/SubjectS">
    <note type="affiliation">Example University, Dept. of CS</note>
    <note type="affiliation">Example University, Dept. of Math</note>
    <note type="affiliation">MIT, CSAIL</note>
    <note type="affiliation" label="former">Old Institute, Somewhere</note>
    <note type="award">Best Paper</note>
  </person>
</dblpperson>"#;

#[test]
fn affiliations_resolve_against_catalog() {
    let (temp, vault) = temp_vault();
    vault
        .write_text(
            "Organizations/Massachusetts Institute of Technology.md",
            "---\naliases:\n  - MIT\n---\n",
        )
        .unwrap();
    let app = App::new(MockDblp::with_profile(AFFILIATIONS), vault, config(4));

    let report = app.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink).unwrap();
    assert_eq!(report.organizations.len(), 3);
    assert_eq!(
        report.organizations[0].resolution,
        Resolution::New {
            name: "Example University".to_string()
        }
    );
    assert!(report.organizations[0].registered);
    assert_eq!(report.organizations[1].resolution.name(), "Example University");
    assert!(!report.organizations[1].registered);
    assert_matches!(report.organizations[2].resolution, Resolution::Known { .. });

    let files = snapshot(temp.path());
    assert!(!files.contains_key("Organizations/MIT.md"));
    assert!(!files.contains_key("Organizations/Old Institute.md"));
    let subject = &files["Sam Subject.md"];
    assert_eq!(subject.matches("affiliation:: [[Example University]]").count(), 1);
    assert!(subject.contains("affiliation:: [[Massachusetts Institute of Technology]]"));
}

#[test]
fn match_command_does_not_register() {
    let (temp, vault) = temp_vault();
    let app = App::new(MockDblp::default(), vault, config(4));
    let report = app.match_affiliation("Example University, Dept. of CS").unwrap();
    assert_eq!(report.resolution.name(), "Example University");
    assert!(snapshot(temp.path()).is_empty());
}

#[test]
fn double_collision_is_skipped_without_overwrite() {
    let (_temp, vault) = temp_vault();
    let primary = "Conference/ICF/2021/Foo Considered Harmful.md";
    let alternate = "Conference/ICF/2021/Foo Considered Harmful(conf\u{2215}foo\u{2215}X21).md";
    vault.write_text(primary, "---\nkey: conf/other/Y21\n---\n").unwrap();
    vault.write_text(alternate, "my own notes\n").unwrap();
    let client = MockDblp::with_profile(SCENARIO).citation("conf/foo/X21");
    let app = App::new(client, vault, config(4));

    let report = app.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink).unwrap();
    assert_matches!(
        &report.publications[0],
        PublicationOutcome::Skipped { reason, .. } if reason.contains("occupied by another record")
    );
    assert_eq!(app.store().read_text(primary).unwrap(), "---\nkey: conf/other/Y21\n---\n");
    assert_eq!(app.store().read_text(alternate).unwrap(), "my own notes\n");
    assert!(report.subject_updated);
}

#[test]
fn malformed_subject_note_is_left_alone() {
    let (_temp, vault) = temp_vault();
    let original = "---\ntags: me\nno closing line\n";
    vault.write_text("Sam Subject.md", original).unwrap();
    let client = MockDblp::with_profile(SCENARIO).citation("conf/foo/X21");
    let app = App::new(client, vault, config(4));

    let report = app.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink).unwrap();
    assert!(!report.subject_updated);
    assert_eq!(app.store().read_text("Sam Subject.md").unwrap(), original);
    assert_matches!(report.publications[0], PublicationOutcome::Created { .. });
    assert_matches!(report.coauthors[0], CoauthorOutcome::Created { .. });
}

const NAMELESS: &str = r#"<dblpperson name="Sam Subject" pid="s/SubjectS" n="1">
  <person key="homepages/s/SubjectS">
    <note type="affiliation">, Dept. of CS</note>
    <note type="affiliation">Example University, Dept. of CS</note>
  </person>
  <r><inproceedings key="conf/foo/Dot21">
    <author pid="s/SubjectS">Sam Subject</author>
    <title>.</title><year>2021</year><booktitle>ICF</booktitle>
  </inproceedings></r>
</dblpperson>"#;

#[test]
fn nameless_affiliation_and_title_write_nothing() {
    let (temp, vault) = temp_vault();
    let client = MockDblp::with_profile(NAMELESS).citation("conf/foo/Dot21");
    let app = App::new(client, vault, config(4));

    let report = app.sync_profile("s/SubjectS", "Sam Subject.md", &NoopSink).unwrap();
    assert_eq!(report.organizations.len(), 1);
    assert_eq!(report.organizations[0].resolution.name(), "Example University");
    assert_matches!(report.publications[0], PublicationOutcome::Skipped { .. });
    assert_eq!(app.client().calls(), 0);

    let files = snapshot(temp.path());
    assert!(files.keys().all(|path| !path.ends_with("/.md")), "{files:?}");
    assert!(!files["Sam Subject.md"].contains("[[]]"));
    assert_eq!(
        files.keys().collect::<Vec<_>>(),
        vec!["Organizations/Example University.md", "Sam Subject.md"]
    );
}
