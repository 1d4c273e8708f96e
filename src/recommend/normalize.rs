//! Name normalization for ownership checks and fuzzy track resolution.
//!
//! Album titles come back from different services with different casing,
//! punctuation, diacritics and edition decorations. Everything is folded
//! into a flat ASCII key so "Ágætis byrjun (10th Anniversary Edition)"
//! and "agaetis byrjun" land on the same key.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Parenthetical/bracketed segments: "(Deluxe Edition)", "[Remastered]".
    static ref PARENTHETICAL: Regex = Regex::new(r"[(\[][^)\]]*[)\]]").unwrap();
    /// Trailing edition decorations after a dash: "- 2011 Remaster",
    /// "- Deluxe Edition", "- 25th Anniversary Reissue".
    static ref EDITION_SUFFIX: Regex = Regex::new(
        r"(?i)\s+[-–]\s+(\d{4}\s+)?(\d+(st|nd|rd|th)\s+)?(deluxe|remaster(ed)?|expanded|anniversary|special|legacy|collector'?s?|bonus|reissue)\b.*$"
    )
    .unwrap();
    /// Everything that is not a letter, digit or whitespace.
    static ref PUNCTUATION: Regex = Regex::new(r"[^a-z0-9\s]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Fold common Latin diacritics and ligatures to ASCII.
fn fold_diacritics(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' => out.push('a'),
            'æ' => out.push_str("ae"),
            'ç' | 'ć' | 'č' => out.push('c'),
            'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' => out.push('e'),
            'ì' | 'í' | 'î' | 'ï' | 'ī' => out.push('i'),
            'ð' => out.push('d'),
            'ñ' | 'ń' => out.push('n'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => out.push('o'),
            'œ' => out.push_str("oe"),
            'ß' => out.push_str("ss"),
            'ś' | 'š' => out.push('s'),
            'þ' => out.push_str("th"),
            'ù' | 'ú' | 'û' | 'ü' | 'ū' => out.push('u'),
            'ý' | 'ÿ' => out.push('y'),
            'ź' | 'ż' | 'ž' => out.push('z'),
            _ => out.push(c),
        }
    }
    out
}

/// Normalize a name into its flat comparison key.
pub fn normalize_name(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let folded = fold_diacritics(&lowered);
    let without_editions = EDITION_SUFFIX.replace(&folded, "");
    let without_parens = PARENTHETICAL.replace_all(&without_editions, " ");
    let without_punct = PUNCTUATION.replace_all(&without_parens, "");
    WHITESPACE.replace_all(without_punct.trim(), " ").to_string()
}

/// Ownership key for an (artist, album title) pair.
pub fn ownership_key(artist: &str, title: &str) -> (String, String) {
    (normalize_name(artist), normalize_name(title))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_and_whitespace() {
        assert_eq!(normalize_name("  OK Computer  "), "ok computer");
        assert_eq!(normalize_name("In   Rainbows"), "in rainbows");
    }

    #[test]
    fn test_diacritics_fold() {
        assert_eq!(normalize_name("Ágætis byrjun"), "agaetis byrjun");
        assert_eq!(normalize_name("Björk"), "bjork");
        assert_eq!(normalize_name("Mañana"), "manana");
    }

    #[test]
    fn test_parentheticals_stripped() {
        assert_eq!(
            normalize_name("OK Computer (Collector's Edition)"),
            "ok computer"
        );
        assert_eq!(normalize_name("Loveless [Remastered]"), "loveless");
    }

    #[test]
    fn test_edition_suffixes_stripped() {
        assert_eq!(normalize_name("Kid A - 2011 Remaster"), "kid a");
        assert_eq!(normalize_name("Homework - Deluxe Edition"), "homework");
        assert_eq!(
            normalize_name("Blue Lines - 25th Anniversary Reissue"),
            "blue lines"
        );
    }

    #[test]
    fn test_punctuation_stripped() {
        assert_eq!(normalize_name("R.E.M."), "rem");
        assert_eq!(normalize_name("...And Justice for All"), "and justice for all");
    }

    #[test]
    fn test_hyphenated_titles_survive() {
        // A dash without an edition keyword is plain punctuation.
        assert_eq!(normalize_name("Mezzanine - Live"), "mezzanine live");
        assert_eq!(normalize_name("F# A# Infinity"), "f a infinity");
    }

    #[test]
    fn test_ownership_key_equivalence() {
        let a = ownership_key("Sigur Rós", "Ágætis byrjun (Special Edition)");
        let b = ownership_key("sigur ros", "agaetis byrjun");
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_albums_stay_distinct() {
        assert_ne!(normalize_name("Amnesiac"), normalize_name("Kid A"));
    }
}
