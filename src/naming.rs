//! Output-name normalization and allocation.
//!
//! Candidate names come out of a pattern engine (or the source entry stem)
//! and pass through transliteration, punctuation cleanup, whitespace
//! substitution and truncation before a free path is allocated under the
//! target bucket. The candidate may contain `/`; subdirectories it names
//! are honored under the bucket.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::model::FictionBook;

/// Pure function from a repaired document to an output name.
pub trait NamePattern {
    fn render(&self, book: &FictionBook) -> String;
}

impl<F> NamePattern for F
where
    F: Fn(&FictionBook) -> String,
{
    fn render(&self, book: &FictionBook) -> String {
        self(book)
    }
}

/// Case folding applied to the final name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseFolding {
    #[default]
    None,
    Upper,
    Lower,
}

/// Name shaping policies applied after the pattern engine.
#[derive(Debug, Clone, Default)]
pub struct NamingOptions {
    /// Transliterate Cyrillic into Latin before cleanup.
    pub translify: bool,
    /// Restrict the name to word characters and a small punctuation set.
    pub strict: bool,
    /// Substitution for whitespace; runs collapse to one occurrence.
    pub replace_char: Option<char>,
    pub case: CaseFolding,
    /// Maximum name length in characters, 0 for unlimited. The extension
    /// and any collision suffix are paid out of this budget.
    pub max_length: usize,
}

/// `" & "` (raw or as the XML entity) rewritten to `" and "`.
static AMPERSAND_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s&(amp;)?\s").expect("valid regex"));

/// Strict mode: everything outside letters, digits, connectors and a small
/// punctuation set becomes a space.
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\p{Ll}\p{Lu}\p{Lt}\p{Lo}\p{Nd}\p{Pc}\p{Lm}\\/\[\]\-_*,()']")
        .expect("valid regex")
});

/// Shape a raw candidate name according to the options. Leading separators
/// are dropped and separator runs collapsed so the result stays relative.
pub fn shape_name(raw: &str, options: &NamingOptions) -> String {
    let mut name = if options.translify {
        translify(raw)
    } else {
        raw.to_string()
    };
    name = dirify(&name, options.strict);

    if let Some(substitute) = options.replace_char {
        name = name
            .chars()
            .map(|ch| if ch.is_whitespace() { substitute } else { ch })
            .collect();
        name = squeeze(&name, substitute);
    }

    match options.case {
        CaseFolding::Upper => name = name.to_uppercase(),
        CaseFolding::Lower => name = name.to_lowercase(),
        CaseFolding::None => {}
    }

    let name = name.trim_start_matches('/');
    squeeze(name, '/')
}

/// Allocate a path under `directory` that does not exist yet: `name` plus
/// `extension`, then `name1`, `name2`, ... on collision. Each round the
/// truncation budget shrinks by the suffix's own width so the full file
/// name never exceeds `max_length`.
pub fn unique_path(
    directory: &Path,
    name: &str,
    extension: &str,
    max_length: usize,
) -> PathBuf {
    let budgeted = |suffix_len: usize| {
        if max_length > 0 {
            truncate(name, max_length.saturating_sub(extension.len() + suffix_len))
        } else {
            name
        }
    };

    let mut candidate = directory.join(format!("{}{extension}", budgeted(0)));
    let mut index: u32 = 0;
    while candidate.exists() {
        index += 1;
        let suffix = index.to_string();
        candidate = directory.join(format!("{}{suffix}{extension}", budgeted(suffix.len())));
    }
    candidate
}

/// Fixed Cyrillic-to-Latin transliteration. An uppercase letter followed by
/// a lowercase one maps to a capitalized form (`Щука` becomes `Schuka`,
/// not `SCHuka`).
pub fn translify(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match transliterate(ch) {
            Some(mapped) => {
                let before_lower = chars.peek().is_some_and(|next| next.is_lowercase());
                if ch.is_uppercase() && before_lower {
                    out.push_str(&capitalize(&mapped.to_lowercase()));
                } else {
                    out.push_str(mapped);
                }
            }
            None => out.push(ch),
        }
    }
    out
}

/// Make a name filesystem-friendly: ampersands spelled out, typographic
/// dashes and quotes normalized, characters invalid in file names removed
/// (`/` survives as the subdirectory separator), a single leading or
/// trailing underscore stripped.
pub fn dirify(value: &str, strict: bool) -> String {
    if value.is_empty() {
        return String::new();
    }

    let name = AMPERSAND_WORD.replace_all(value, " and ");
    let name = name
        .replace(['\u{2013}', '\u{2014}', '\u{2015}'], "-")
        .replace('\u{2017}', "_")
        .replace(
            [
                '\u{AB}', '\u{BB}', '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}', '\u{201C}',
                '\u{201D}', '\u{201E}', '\u{2032}', '\u{2033}', '\u{2039}', '\u{203A}',
            ],
            "'",
        );

    let name = if strict {
        squeeze(&NON_WORD.replace_all(&name, " "), ' ')
    } else {
        name
    };

    let name: String = name
        .chars()
        .filter(|&ch| {
            !matches!(ch, '<' | '>' | ':' | '"' | '\\' | '|' | '?' | '*') && !ch.is_control()
        })
        .collect();

    let name = name.strip_suffix('_').unwrap_or(&name);
    let name = name.strip_prefix('_').unwrap_or(name);
    name.trim().to_string()
}

/// Collapse runs of `value` into a single occurrence.
pub fn squeeze(text: &str, value: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous: Option<char> = None;
    for ch in text.chars() {
        if ch == value && previous == Some(value) {
            continue;
        }
        out.push(ch);
        previous = Some(ch);
    }
    out
}

/// First `max_length` characters of `value`.
pub fn truncate(value: &str, max_length: usize) -> &str {
    match value.char_indices().nth(max_length) {
        Some((index, _)) => &value[..index],
        None => value,
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn transliterate(ch: char) -> Option<&'static str> {
    Some(match ch {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' => "e",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "h",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "sch",
        'ъ' => "'",
        'ы' => "yi",
        'ь' => "",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        'і' => "i",
        'ґ' => "g",
        'ё' => "yo",
        'є' => "e",
        'ї' => "yi",
        '№' => "#",
        'А' => "A",
        'Б' => "B",
        'В' => "V",
        'Г' => "G",
        'Д' => "D",
        'Е' => "E",
        'Ж' => "ZH",
        'З' => "Z",
        'И' => "I",
        'Й' => "Y",
        'К' => "K",
        'Л' => "L",
        'М' => "M",
        'Н' => "N",
        'О' => "O",
        'П' => "P",
        'Р' => "R",
        'С' => "S",
        'Т' => "T",
        'У' => "U",
        'Ф' => "F",
        'Х' => "H",
        'Ц' => "TS",
        'Ч' => "CH",
        'Ш' => "SH",
        'Щ' => "SCH",
        'Ъ' => "'",
        'Ы' => "YI",
        'Ь' => "",
        'Э' => "E",
        'Ю' => "YU",
        'Я' => "YA",
        'І' => "I",
        'Ґ' => "G",
        'Ё' => "YO",
        'Є' => "E",
        'Ї' => "YI",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translify_table_and_case() {
        assert_eq!(translify("привет"), "privet");
        assert_eq!(translify("Пушкин"), "Pushkin");
        assert_eq!(translify("Щука"), "Schuka");
        assert_eq!(translify("ЩУКА"), "SCHUKA");
        assert_eq!(translify("объём"), "ob'yom");
        assert_eq!(translify("№7"), "#7");
        assert_eq!(translify("plain latin"), "plain latin");
    }

    #[test]
    fn test_dirify_ampersand_and_quotes() {
        assert_eq!(dirify("War & Peace", false), "War and Peace");
        assert_eq!(dirify("War &amp; Peace", false), "War and Peace");
        assert_eq!(dirify("\u{AB}Title\u{BB}", false), "'Title'");
        assert_eq!(dirify("long\u{2014}dash", false), "long-dash");
    }

    #[test]
    fn test_dirify_removes_invalid_characters() {
        assert_eq!(dirify("a:b?c*d|e", false), "abcde");
        assert_eq!(dirify("keep/subdir", false), "keep/subdir");
        assert_eq!(dirify("_wrapped_", false), "wrapped");
    }

    #[test]
    fn test_dirify_strict_mode() {
        assert_eq!(dirify("a!b@c", true), "a b c");
        assert_eq!(dirify("ok-name_7", true), "ok-name_7");
    }

    #[test]
    fn test_squeeze_runs() {
        assert_eq!(squeeze("a___b__c", '_'), "a_b_c");
        assert_eq!(squeeze("", '_'), "");
        assert_eq!(squeeze("aaa", 'b'), "aaa");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("граница", 3), "гра");
        assert_eq!(truncate("ab", 10), "ab");
    }

    #[test]
    fn test_shape_name_substitution_and_case() {
        let options = NamingOptions {
            replace_char: Some('_'),
            case: CaseFolding::Lower,
            ..NamingOptions::default()
        };
        assert_eq!(shape_name("War  and  Peace", &options), "war_and_peace");

        let options = NamingOptions {
            translify: true,
            replace_char: Some('_'),
            ..NamingOptions::default()
        };
        assert_eq!(shape_name("Война и мир", &options), "Voyna_i_mir");
    }

    #[test]
    fn test_shape_name_keeps_relative() {
        let options = NamingOptions::default();
        assert_eq!(shape_name("/authors//tolstoy", &options), "authors/tolstoy");
    }

    #[test]
    fn test_unique_path_appends_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "name", ".fb2", 0);
        assert_eq!(first, dir.path().join("name.fb2"));
        std::fs::write(&first, b"x").unwrap();

        let second = unique_path(dir.path(), "name", ".fb2", 0);
        assert_eq!(second, dir.path().join("name1.fb2"));
        std::fs::write(&second, b"x").unwrap();

        let third = unique_path(dir.path(), "name", ".fb2", 0);
        assert_eq!(third, dir.path().join("name2.fb2"));
    }

    #[test]
    fn test_unique_path_truncation_budget() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "abcdefgh", ".fb2", 8);
        assert_eq!(first, dir.path().join("abcd.fb2"));
        std::fs::write(&first, b"x").unwrap();

        // The collision suffix is paid out of the name budget.
        let second = unique_path(dir.path(), "abcdefgh", ".fb2", 8);
        assert_eq!(second, dir.path().join("abc1.fb2"));
    }
}
