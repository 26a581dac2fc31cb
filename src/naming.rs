//! Naming normalization
//!
//! Deterministic string transforms that derive identifier-safe names from raw
//! catalog identifiers. Table class names are built as
//! `clean_up -> remove_table_prefixes -> singularize -> pascal_case`;
//! column property names only go through `clean_up`.

/// Words whose singular and plural forms are identical
const UNCOUNTABLE: &[&str] = &[
    "equipment",
    "information",
    "rice",
    "money",
    "species",
    "series",
    "fish",
    "sheep",
    "deer",
    "news",
    "data",
    "metadata",
    "staff",
];

/// Irregular (plural, singular) pairs, lowercase
const IRREGULAR: &[(&str, &str)] = &[
    ("people", "person"),
    ("men", "man"),
    ("women", "woman"),
    ("children", "child"),
    ("mice", "mouse"),
    ("geese", "goose"),
    ("teeth", "tooth"),
    ("feet", "foot"),
    ("oxen", "ox"),
    ("leaves", "leaf"),
    ("knives", "knife"),
    ("lives", "life"),
    ("wives", "wife"),
    ("halves", "half"),
    ("shelves", "shelf"),
    ("wolves", "wolf"),
    ("movies", "movie"),
    ("cookies", "cookie"),
    ("shoes", "shoe"),
    ("heroes", "hero"),
    ("potatoes", "potato"),
    ("statuses", "status"),
    ("buses", "bus"),
    ("campuses", "campus"),
    ("viruses", "virus"),
    ("indices", "index"),
    ("matrices", "matrix"),
    ("vertices", "vertex"),
    ("criteria", "criterion"),
    ("analyses", "analysis"),
    ("crises", "crisis"),
    ("theses", "thesis"),
];

/// Replaces every character outside `[A-Za-z0-9_]` with `_` and prefixes a
/// leading digit with `_`.
pub fn clean_up(name: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        cleaned.insert(0, '_');
    }
    cleaned
}

/// Strips a single leading `tbl_` or `tbl` token
pub fn remove_table_prefixes(name: &str) -> &str {
    name.strip_prefix("tbl_")
        .or_else(|| name.strip_prefix("tbl"))
        .unwrap_or(name)
}

/// Derives the clean name of a table from its raw name
pub fn clean_name(table_name: &str) -> String {
    remove_table_prefixes(&clean_up(table_name)).to_string()
}

/// Derives the class name of a table from its clean name
pub fn clean_name_to_class_name(clean_name: &str) -> String {
    pascal_case(&singularize(remove_table_prefixes(clean_name)))
}

/// Capitalizes the first character and every character following an
/// underscore, dropping the underscores. Other characters are unchanged.
pub fn pascal_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut chars = name.chars();

    if let Some(first) = chars.next() {
        result.extend(first.to_uppercase());
    }

    let mut to_upper = false;
    for c in chars {
        if c == '_' {
            to_upper = true;
        } else if to_upper {
            result.extend(c.to_uppercase());
            to_upper = false;
        } else {
            result.push(c);
        }
    }
    result
}

/// Returns `true` if the table name starts with any of the given prefixes
pub fn is_excluded(table_name: &str, exclude_prefixes: &[String]) -> bool {
    exclude_prefixes
        .iter()
        .any(|prefix| table_name.starts_with(prefix.as_str()))
}

/// Converts an English plural noun to its singular form.
///
/// Only the last word of the identifier is affected, where words are
/// delimited by `_` or by a lowercase-to-uppercase transition.
pub fn singularize(word: &str) -> String {
    let start = last_word_start(word);
    let (stem, last) = word.split_at(start);
    let lower = last.to_ascii_lowercase();

    if lower.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }

    if let Some((_, singular)) = IRREGULAR.iter().find(|(plural, _)| *plural == lower) {
        return format!("{}{}", stem, match_case(last, singular));
    }

    // (plural suffix, singular suffix), first match wins
    const RULES: &[(&str, &str)] = &[
        ("ies", "y"),
        ("sses", "ss"),
        ("shes", "sh"),
        ("ches", "ch"),
        ("xes", "x"),
        ("zzes", "zz"),
        ("ss", "ss"),
        ("us", "us"),
        ("is", "is"),
        ("s", ""),
    ];

    for (plural, singular) in RULES {
        // leave short words like "is" or "bus" alone
        if lower.len() > plural.len() && lower.ends_with(plural) {
            let cut = word.len() - plural.len();
            let suffix = &word[cut..];
            return format!("{}{}", &word[..cut], match_case(suffix, singular));
        }
    }

    word.to_string()
}

/// Converts an English singular noun to its plural form, after PascalCasing
pub fn pluralize(word: &str) -> String {
    let word = pascal_case(word);
    let start = last_word_start(&word);
    let (stem, last) = word.split_at(start);
    let lower = last.to_ascii_lowercase();

    if lower.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return word.clone();
    }

    if let Some((plural, _)) = IRREGULAR.iter().find(|(_, singular)| *singular == lower) {
        return format!("{}{}", stem, match_case(last, plural));
    }

    let ends_with_consonant_y = lower.ends_with('y')
        && lower.len() > 1
        && !matches!(lower.as_bytes()[lower.len() - 2], b'a' | b'e' | b'i' | b'o' | b'u');

    if ends_with_consonant_y {
        let cut = word.len() - 1;
        return format!("{}{}", &word[..cut], match_case(&word[cut..], "ies"));
    }

    let needs_es = ["s", "x", "z", "ch", "sh"]
        .iter()
        .any(|suffix| lower.ends_with(suffix));
    let suffix = if needs_es { "es" } else { "s" };
    let last_char = word.char_indices().last().map_or(0, |(i, _)| i);
    format!("{}{}", word, match_case(&word[last_char..], suffix))
}

/// Byte index at which the last word of an identifier starts
fn last_word_start(word: &str) -> usize {
    let mut start = 0;
    let mut prev: Option<char> = None;
    for (i, c) in word.char_indices() {
        match prev {
            Some('_') => start = i,
            Some(p) if p.is_lowercase() && c.is_uppercase() => start = i,
            _ => {}
        }
        prev = Some(c);
    }
    start
}

/// Returns `replacement` in the case style of `source`: all caps, leading
/// capital, or lowercase.
fn match_case(source: &str, replacement: &str) -> String {
    let letters: Vec<char> = source.chars().filter(|c| c.is_alphabetic()).collect();

    // a single capital ("S") says nothing about the rest of the word
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return replacement.to_uppercase();
    }

    match letters.first() {
        Some(first) if first.is_uppercase() => pascal_case(replacement),
        _ => replacement.to_string(),
    }
}
