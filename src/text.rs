//! Text cleanup applied to extracted strings
//!
//! Pure leaf-level transforms: typography folded to ASCII, accents stripped
//! through NFKD decomposition, whitespace runs collapsed and stray spaces
//! before punctuation removed.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.;?!])").unwrap());

/// Characters folded to an ASCII replacement
const REPLACEMENTS: &[(&str, &[char])] = &[
    (
        "'",
        &[
            '\u{02bc}', '\u{2018}', '\u{2019}', '\u{201a}', '\u{201b}', '\u{2039}', '\u{203a}',
            '\u{300c}', '\u{300d}',
        ],
    ),
    (
        "\"",
        &[
            '\u{00ab}', '\u{00bb}', '\u{201c}', '\u{201d}', '\u{201e}', '\u{201f}', '\u{300e}',
            '\u{300f}',
        ],
    ),
    (
        "-",
        &['\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}', '\u{2015}'],
    ),
    ("(c)", &['\u{00a9}', '\u{24b8}', '\u{24d2}']),
    ("(r)", &['\u{00ae}', '\u{24c7}']),
    ("(p)", &['\u{2117}', '\u{24c5}', '\u{24df}']),
    ("(sm)", &['\u{2120}']),
    ("(tm)", &['\u{2122}']),
    // soft hyphen
    ("", &['\u{00ad}']),
];

fn replacement(c: char) -> Option<&'static str> {
    REPLACEMENTS
        .iter()
        .find(|(_, codes)| codes.contains(&c))
        .map(|(replacement, _)| *replacement)
}

/// Normalize one string to ASCII.
///
/// Characters with no ASCII decomposition are dropped. Leading and trailing whitespace is collapsed but not removed; callers
/// trim where the position of the string in a join matters.
pub fn clean_text(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.chars() {
        match replacement(c) {
            Some(r) => folded.push_str(r),
            None => folded.push(c),
        }
    }

    let ascii: String = folded.nfkd().filter(char::is_ascii).collect();
    let collapsed = WHITESPACE.replace_all(&ascii, " ");
    SPACE_BEFORE_PUNCT.replace_all(&collapsed, "$1").into_owned()
}

/// Clean and trim each string, optionally dropping the ones left empty
pub fn clean_strings<I, S>(strings: I, filter_empty: bool) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    strings
        .into_iter()
        .map(|s| clean_text(s.as_ref()).trim().to_string())
        .filter(|s| !filter_empty || !s.is_empty())
        .collect()
}
