use quick_xml::Reader;
use quick_xml::events::{BytesStart, BytesText, Event};
use tracing::{debug, warn};

use crate::domain::{
    AffiliationNote, CoauthorRecord, Pid, PublicationRecord, RemoteProfile, Venue,
};
use crate::error::KiraError;

pub fn parse_profile(xml: &str) -> Result<RemoteProfile, KiraError> {
    let mut reader = Reader::from_str(xml);
    let mut builder = ProfileBuilder::default();
    let mut stack: Vec<String> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|err| {
            KiraError::ProfileParse(format!(
                "at byte {}: {err}",
                reader.buffer_position()
            ))
        })?;
        match event {
            Event::Start(element) => {
                let name = element_name(&element);
                builder.open(&element, &name, stack.last().map(String::as_str), stack.len())?;
                stack.push(name);
            }
            Event::Empty(element) => {
                let name = element_name(&element);
                let depth = stack.len();
                builder.open(&element, &name, stack.last().map(String::as_str), depth)?;
                builder.close(depth);
            }
            Event::End(_) => {
                stack.pop();
                builder.close(stack.len());
            }
            Event::Text(text) => builder.text(&decode_text(&text)),
            Event::CData(data) => builder.text(&String::from_utf8_lossy(&data)),
            Event::Eof => break,
            _ => {}
        }
    }

    builder.finish()
}

fn element_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.name().as_ref()).into_owned()
}

fn decode_text(text: &BytesText<'_>) -> String {
    match text.unescape() {
        Ok(value) => value.into_owned(),
        Err(_) => String::from_utf8_lossy(text.as_ref()).into_owned(),
    }
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>, KiraError> {
    let attr = element
        .try_get_attribute(name)
        .map_err(|err| KiraError::ProfileParse(err.to_string()))?;
    attr.map(|attr| {
        attr.unescape_value()
            .map(|value| value.into_owned())
            .map_err(|err| KiraError::ProfileParse(err.to_string()))
    })
    .transpose()
}

fn squash_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Year,
    Booktitle,
    Journal,
    Author,
    Note,
    Url,
    Coauthor,
}

#[derive(Debug)]
struct Capture {
    field: Field,
    depth: usize,
    buffer: String,
}

#[derive(Debug, Default)]
struct RecordDraft {
    depth: usize,
    element: String,
    key: Option<String>,
    publtype: Option<String>,
    title: Option<String>,
    year: Option<String>,
    booktitle: Option<String>,
    journal: Option<String>,
    authors: Vec<String>,
}

#[derive(Debug, Default)]
struct ProfileBuilder {
    name: Option<String>,
    pid: Option<String>,
    count: Option<u32>,
    publications: Vec<PublicationRecord>,
    coauthors: Vec<CoauthorRecord>,
    notes: Vec<AffiliationNote>,
    urls: Vec<String>,
    record: Option<RecordDraft>,
    capture: Option<Capture>,
    pending_note: Option<(Option<String>, Option<String>)>,
    pending_coauthor_pid: Option<String>,
    co_taken: bool,
}

impl ProfileBuilder {
    fn open(
        &mut self,
        element: &BytesStart<'_>,
        name: &str,
        parent: Option<&str>,
        depth: usize,
    ) -> Result<(), KiraError> {
        // inline markup inside a captured field only contributes text
        if self.capture.is_some() {
            return Ok(());
        }

        if let Some(record) = self.record.as_ref() {
            if parent == Some(record.element.as_str()) {
                let field = match name {
                    "title" => Some(Field::Title),
                    "year" => Some(Field::Year),
                    "booktitle" => Some(Field::Booktitle),
                    "journal" => Some(Field::Journal),
                    "author" => Some(Field::Author),
                    _ => None,
                };
                if let Some(field) = field {
                    self.start_capture(field, depth);
                }
            }
            return Ok(());
        }

        match (parent, name) {
            (None, "dblpperson") => {
                self.name = attribute(element, "name")?;
                self.pid = attribute(element, "pid")?;
                self.count = attribute(element, "n")?.and_then(|n| n.parse().ok());
            }
            (Some("person"), "note") => {
                self.pending_note = Some((attribute(element, "type")?, attribute(element, "label")?));
                self.start_capture(Field::Note, depth);
            }
            (Some("person"), "url") => self.start_capture(Field::Url, depth),
            (Some("r"), _) => {
                self.record = Some(RecordDraft {
                    depth,
                    element: name.to_string(),
                    key: attribute(element, "key")?,
                    publtype: attribute(element, "publtype")?,
                    ..RecordDraft::default()
                });
            }
            (Some("coauthors"), "co") => self.co_taken = false,
            (Some("co"), "na") if !self.co_taken => {
                self.co_taken = true;
                self.pending_coauthor_pid = attribute(element, "pid")?;
                self.start_capture(Field::Coauthor, depth);
            }
            _ => {}
        }
        Ok(())
    }

    fn start_capture(&mut self, field: Field, depth: usize) {
        self.capture = Some(Capture {
            field,
            depth,
            buffer: String::new(),
        });
    }

    fn text(&mut self, value: &str) {
        if let Some(capture) = self.capture.as_mut() {
            capture.buffer.push_str(value);
        }
    }

    fn close(&mut self, depth: usize) {
        if self
            .capture
            .as_ref()
            .map(|capture| capture.depth == depth)
            .unwrap_or(false)
        {
            if let Some(capture) = self.capture.take() {
                self.store_capture(capture);
            }
            return;
        }

        if self
            .record
            .as_ref()
            .map(|record| record.depth == depth)
            .unwrap_or(false)
        {
            if let Some(record) = self.record.take() {
                self.finish_record(record);
            }
        }
    }

    fn store_capture(&mut self, capture: Capture) {
        let value = squash_whitespace(&capture.buffer);
        match capture.field {
            Field::Note => {
                let (note_type, label) = self.pending_note.take().unwrap_or_default();
                if !value.is_empty() {
                    self.notes.push(AffiliationNote {
                        text: value,
                        note_type,
                        label,
                    });
                }
            }
            Field::Url => {
                if !value.is_empty() {
                    self.urls.push(value);
                }
            }
            Field::Coauthor => {
                let pid = self.pending_coauthor_pid.take();
                match pid.as_deref().map(str::parse::<Pid>) {
                    Some(Ok(pid)) if !value.is_empty() => {
                        self.coauthors.push(CoauthorRecord { name: value, pid })
                    }
                    _ => debug!(name = %value, "coauthor without usable pid skipped"),
                }
            }
            field => {
                let Some(record) = self.record.as_mut() else {
                    return;
                };
                match field {
                    Field::Title => record.title = Some(strip_final_period(&value)),
                    Field::Year => record.year = Some(value),
                    Field::Booktitle => record.booktitle = Some(value),
                    Field::Journal => record.journal = Some(value),
                    Field::Author => record.authors.push(value),
                    Field::Note | Field::Url | Field::Coauthor => {}
                }
            }
        }
    }

    fn finish_record(&mut self, record: RecordDraft) {
        let (Some(key), Some(title), Some(year)) = (record.key, record.title, record.year) else {
            warn!(element = %record.element, "record without key, title or year skipped");
            return;
        };
        let Some(venue) = Venue::classify(record.booktitle, record.journal, record.publtype)
        else {
            debug!(%key, element = %record.element, "record has no filable venue");
            return;
        };
        self.publications.push(PublicationRecord {
            key,
            title,
            year,
            authors: record.authors,
            venue,
        });
    }

    fn finish(self) -> Result<RemoteProfile, KiraError> {
        let pid: Pid = self
            .pid
            .ok_or_else(|| KiraError::ProfileParse("missing dblpperson pid".to_string()))?
            .parse()
            .map_err(|err: KiraError| KiraError::ProfileParse(err.to_string()))?;
        let name = self
            .name
            .ok_or_else(|| KiraError::ProfileParse("missing dblpperson name".to_string()))?;
        Ok(RemoteProfile {
            name,
            pid,
            publication_count: self.count,
            publications: self.publications,
            coauthors: self.coauthors,
            notes: self.notes,
            urls: self.urls,
        })
    }
}

fn strip_final_period(title: &str) -> String {
    title.strip_suffix('.').unwrap_or(title).to_string()
}
