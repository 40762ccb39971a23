//! Alternative spellings of names and authorities.

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static INITIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\p{Lu}\.(?:\s|-)*").expect("valid initial pattern"));

static INITIALS_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\p{Lu}\.-?)+$").expect("valid initials pattern"));

static SUBGENUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\([^)]*\)").expect("valid subgenus pattern"));

/// Genus, optional subgenus and root of a species-group name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameParts {
    pub genus: String,
    pub subgenus: Option<String>,
    pub root: String,
}

/// Split `"Mus (Leggada) minutoides"` into its parts.
pub fn split_name(name: &str) -> Option<NameParts> {
    let mut words = name.split_whitespace();
    let genus = words.next()?.to_string();
    let subgenus = name
        .find('(')
        .zip(name.find(')'))
        .filter(|(open, close)| open < close)
        .map(|(open, close)| name[open + 1..close].trim().to_string());
    if !words.any(|word| !word.starts_with('(')) {
        return None;
    }
    let root = crate::registry::root_name(name);
    if root.is_empty() {
        return None;
    }
    Some(NameParts {
        genus,
        subgenus,
        root,
    })
}

/// Drop a parenthetical subgenus: `"Mus (Leggada) minutoides"` gives
/// `"Mus minutoides"`.
pub fn strip_subgenus(name: &str) -> String {
    SUBGENUS.replace_all(name, "").trim().to_string()
}

/// Decompose and drop combining marks: `"Bogotá"` gives `"Bogota"`.
pub fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Expand the æ and œ ligatures.
pub fn expand_ligatures(text: &str) -> String {
    text.replace('æ', "ae")
        .replace('œ', "oe")
        .replace('Æ', "Ae")
        .replace('Œ', "Oe")
}

/// Remove all initials: `"J. E. Gray"` gives `"Gray"`.
pub fn strip_initials(author: &str) -> String {
    INITIAL
        .replace_all(author, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Join runs of initials: `"J. A. Allen"` gives `"J.A. Allen"`.
pub fn despace_initials(author: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for token in author.split_whitespace() {
        match out.last_mut() {
            Some(prev) if INITIALS_TOKEN.is_match(prev) && INITIALS_TOKEN.is_match(token) => {
                prev.push_str(token)
            }
            _ => out.push(token.to_string()),
        }
    }
    out.join(" ")
}

/// Separate joined initials: `"J.A. Allen"` gives `"J. A. Allen"`.
pub fn space_initials(author: &str) -> String {
    author
        .split_whitespace()
        .map(|token| {
            if INITIALS_TOKEN.is_match(token) {
                token
                    .split_inclusive('.')
                    .collect::<Vec<_>>()
                    .join(" ")
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split `"X in Y"` into `("X", "Y")`.
pub fn split_in_clause(author: &str) -> Option<(String, String)> {
    let (left, right) = author.split_once(" in ")?;
    let (left, right) = (left.trim(), right.trim());
    (!left.is_empty() && !right.is_empty()).then(|| (left.to_string(), right.to_string()))
}

fn umlauted(text: &str) -> String {
    text.replace("ue", "ü").replace("oe", "ö").replace("ae", "ä")
}

/// Prioritized alternative spellings of `author`, excluding `author` itself.
pub fn author_variants(author: &str, aliases: &IndexMap<String, Vec<String>>) -> Vec<String> {
    let author = author.trim();
    let mut out: IndexSet<String> = IndexSet::new();

    out.insert(despace_initials(author));
    out.insert(space_initials(author));
    let bare = strip_initials(author);
    out.insert(bare.clone());
    for key in [author, bare.as_str()] {
        if let Some(alternatives) = aliases.get(key) {
            out.extend(alternatives.iter().cloned());
        }
    }
    if let Some((left, right)) = split_in_clause(author) {
        for part in [left, right] {
            out.insert(strip_initials(&part));
            if let Some(alternatives) = aliases.get(&part) {
                out.extend(alternatives.iter().cloned());
            }
            out.insert(part);
        }
    }
    if author.contains(" & ") {
        out.insert(author.replace(" & ", " and "));
    }
    if author.contains(" and ") {
        out.insert(author.replace(" and ", " & "));
    }
    out.insert(umlauted(author));

    out.shift_remove(author);
    out.shift_remove("");
    out.into_iter().collect()
}

/// Prioritized alternative spellings of a name, excluding the name itself.
pub fn name_variants(name: &str) -> Vec<String> {
    let name = name.trim();
    let mut out: IndexSet<String> = IndexSet::new();
    let expanded = expand_ligatures(name);
    out.insert(strip_diacritics(&expanded));
    out.insert(expanded);
    out.shift_remove(name);
    out.into_iter().collect()
}

/// Every `(name, author)` pair worth retrying after an exact miss, in
/// priority order. The input pair itself is not included.
pub fn candidate_pairs(
    name: &str,
    author: &str,
    aliases: &IndexMap<String, Vec<String>>,
) -> Vec<(String, String)> {
    let names: Vec<String> = std::iter::once(name.trim().to_string())
        .chain(name_variants(name))
        .collect();
    let authors: Vec<String> = std::iter::once(author.trim().to_string())
        .chain(author_variants(author, aliases))
        .collect();

    let mut pairs: IndexSet<(String, String)> = IndexSet::new();
    for n in &names {
        for a in &authors {
            pairs.insert((n.clone(), a.clone()));
        }
    }
    pairs.shift_remove(&(name.trim().to_string(), author.trim().to_string()));
    pairs.into_iter().collect()
}
