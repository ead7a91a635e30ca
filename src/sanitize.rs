use std::sync::LazyLock;

use regex::Regex;

/// Characters that cannot appear in a note name, paired with a look-alike.
const FORBIDDEN: &[(char, char)] = &[
    ('/', '\u{2215}'),
    ('\\', '\u{29F5}'),
    (':', '\u{A789}'),
    ('*', '\u{2217}'),
    ('?', '\u{FF1F}'),
    ('"', '\u{FF02}'),
    ('<', '\u{2039}'),
    ('>', '\u{203A}'),
    ('|', '\u{2223}'),
    ('#', '\u{FF03}'),
    ('^', '\u{FF3E}'),
    ('[', '\u{FF3B}'),
    (']', '\u{FF3D}'),
];

pub const DEFAULT_AFFILIATION_PREFIXES: &[&str] = &[
    "University of California,",
    "University of Colorado,",
    "University of Hawaii,",
    "University of Illinois,",
    "University of Maryland,",
    "University of Massachusetts,",
    "University of Michigan,",
    "University of Missouri,",
    "University of Nebraska,",
    "University of North Carolina,",
    "University of Texas,",
    "University of Wisconsin,",
    "State University of New York,",
];

static SEPARATOR_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\\/]+").expect("static separator pattern"));
static SPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("static whitespace pattern"));

pub fn sanitize(value: &str) -> String {
    let replaced = value
        .chars()
        .map(|ch| {
            FORBIDDEN
                .iter()
                .find(|(bad, _)| *bad == ch)
                .map(|(_, good)| *good)
                .unwrap_or(ch)
        })
        .collect::<String>();
    normalize_path(&replaced)
}

pub fn normalize_path(value: &str) -> String {
    let spaced = value.replace(['\u{00A0}', '\u{202F}'], " ");
    let collapsed = SEPARATOR_RUN.replace_all(&spaced, "/");
    let collapsed = SPACE_RUN.replace_all(&collapsed, " ");
    collapsed
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Cuts an affiliation at its first comma, keeping the built-in state-system
/// prefixes intact.
pub fn slice_at_first_comma(affiliation: &str) -> String {
    slice_at_first_comma_with(affiliation, &[])
}

pub fn slice_at_first_comma_with(affiliation: &str, extra_prefixes: &[String]) -> String {
    let trimmed = affiliation.trim();
    let prefix_len = DEFAULT_AFFILIATION_PREFIXES
        .iter()
        .copied()
        .chain(extra_prefixes.iter().map(String::as_str))
        .filter(|prefix| trimmed.starts_with(prefix))
        .map(str::len)
        .max()
        .unwrap_or(0);

    match trimmed[prefix_len..].find(',') {
        Some(offset) => trimmed[..prefix_len + offset].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}
