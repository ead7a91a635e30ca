use std::collections::BTreeSet;

use crate::domain::IdentityLink;
use crate::error::KiraError;

pub const SENTINEL: &str = "---";
pub const IDENTITY_FIELD: &str = "dblp-identity";
pub const KEY_FIELD: &str = "key";
pub const AFFILIATION_TAG: &str = "affiliation::";
pub const AUTHOR_TAG: &str = "author::";
pub const LAST_SYNC_PREFIX: &str = "last sync:";

pub fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

pub fn join_lines(lines: &[String]) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

pub fn has_metadata_block(lines: &[String]) -> bool {
    lines
        .first()
        .map(|line| line.trim_end() == SENTINEL)
        .unwrap_or(false)
}

fn closing_index(lines: &[String]) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| line.trim_end() == SENTINEL)
        .map(|(idx, _)| idx)
}

pub fn metadata_lines(lines: &[String]) -> Result<Option<&[String]>, KiraError> {
    if !has_metadata_block(lines) {
        return Ok(None);
    }
    let end = closing_index(lines)
        .ok_or_else(|| KiraError::MalformedNote("unterminated metadata block".to_string()))?;
    Ok(Some(&lines[1..end]))
}

pub fn field_exists(field: &str, lines: &[String]) -> Result<bool, KiraError> {
    Ok(read_field(field, lines)?.is_some())
}

pub fn read_field(field: &str, lines: &[String]) -> Result<Option<String>, KiraError> {
    let Some(block) = metadata_lines(lines)? else {
        return Ok(None);
    };
    let prefix = format!("{field}:");
    Ok(block
        .iter()
        .find_map(|line| line.strip_prefix(&prefix))
        .map(|value| value.trim().to_string()))
}

/// Adds `field: value` at the top of the metadata block, creating the block
/// when the note has none. An existing field is never touched.
pub fn upsert_field(field: &str, value: &str, lines: Vec<String>) -> Result<Vec<String>, KiraError> {
    let entry = format!("{field}: {value}");
    if has_metadata_block(&lines) {
        if field_exists(field, &lines)? {
            return Ok(lines);
        }
        let mut lines = lines;
        lines.insert(1, entry);
        return Ok(lines);
    }

    let mut out = Vec::with_capacity(lines.len() + 3);
    out.push(SENTINEL.to_string());
    out.push(entry);
    out.push(SENTINEL.to_string());
    out.extend(lines);
    Ok(out)
}

fn field_index(field: &str, lines: &[String]) -> Result<Option<usize>, KiraError> {
    let Some(block) = metadata_lines(lines)? else {
        return Ok(None);
    };
    let prefix = format!("{field}:");
    Ok(block
        .iter()
        .position(|line| line.starts_with(&prefix))
        .map(|idx| idx + 1))
}

fn mentions_url(lines: &[String], url: &str) -> bool {
    let is_boundary = |ch: char| ch.is_whitespace() || "<>()[]\"'`".contains(ch);
    lines
        .iter()
        .flat_map(|line| line.split(is_boundary))
        .any(|token| token == url)
}

pub fn collapse_blank_lines(lines: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        let blank = line.trim().is_empty();
        let prev_blank = out.last().map(|prev| prev.trim().is_empty()).unwrap_or(false);
        if blank && prev_blank {
            continue;
        }
        out.push(line);
    }
    out
}

/// Rewrites the subject note: affiliation and last-sync lines are replaced
/// wholesale, link fields are set to the remote value, everything else keeps
/// its place. A link whose URL already appears in the note is not repeated.
pub fn merge_subject_note(
    lines: Vec<String>,
    links: &[IdentityLink],
    organizations: &[String],
    timestamp: &str,
) -> Result<Vec<String>, KiraError> {
    let mut kept: Vec<String> = lines
        .into_iter()
        .filter(|line| !line.starts_with(LAST_SYNC_PREFIX) && !line.starts_with(AFFILIATION_TAG))
        .collect();

    let mut fresh = Vec::new();
    for link in links {
        let entry = format!("{}: {}", link.kind.field(), link.url);
        if let Some(idx) = field_index(link.kind.field(), &kept)? {
            if read_field(link.kind.field(), &kept)?.as_deref() != Some(link.url.as_str()) {
                kept[idx] = entry;
            }
            continue;
        }
        if mentions_url(&kept, &link.url) {
            continue;
        }
        fresh.push(entry);
    }

    if !fresh.is_empty() {
        if has_metadata_block(&kept) {
            kept.splice(1..1, fresh);
        } else {
            let mut block = Vec::with_capacity(fresh.len() + 2 + kept.len());
            block.push(SENTINEL.to_string());
            block.extend(fresh);
            block.push(SENTINEL.to_string());
            block.extend(kept);
            kept = block;
        }
    }

    let mut seen = BTreeSet::new();
    for org in organizations {
        if seen.insert(org.as_str()) {
            kept.push(format!("{AFFILIATION_TAG} [[{org}]]"));
        }
    }
    kept.push(format!("{LAST_SYNC_PREFIX} {timestamp}"));

    Ok(collapse_blank_lines(kept))
}
