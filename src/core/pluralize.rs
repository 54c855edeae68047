//! English pluralization of model identities for route paths

/// Nouns with an irregular plural, matched on the end of the identity
const IRREGULAR: [(&str, &str); 8] = [
    ("person", "people"),
    ("child", "children"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("tooth", "teeth"),
    ("foot", "feet"),
    ("index", "indices"),
    ("quiz", "quizzes"),
];

/// Nouns whose plural is the noun itself
const UNCOUNTABLE: [&str; 10] = [
    "equipment",
    "information",
    "news",
    "money",
    "species",
    "series",
    "fish",
    "sheep",
    "deer",
    "data",
];

/// Exceptions to the consonant + `o` → `oes` rule
const O_TAKES_S: [&str; 5] = ["photo", "piano", "halo", "video", "radio"];

/// Pluralizes the identities used as REST base routes
pub struct Pluralizer;

impl Pluralizer {
    /// Plural form of `singular`
    ///
    /// ```
    /// use blueprints::core::pluralize::Pluralizer;
    ///
    /// assert_eq!(Pluralizer::pluralize("widget"), "widgets");
    /// assert_eq!(Pluralizer::pluralize("category"), "categories");
    /// assert_eq!(Pluralizer::pluralize("salesperson"), "salespeople");
    /// ```
    pub fn pluralize(singular: &str) -> String {
        if singular.is_empty() || UNCOUNTABLE.iter().any(|u| singular.ends_with(u)) {
            return singular.to_string();
        }

        if let Some((stem, plural)) = IRREGULAR
            .iter()
            .find_map(|(one, many)| singular.strip_suffix(one).map(|stem| (stem, many)))
        {
            return format!("{stem}{plural}");
        }

        let before_last = |suffix_len: usize| {
            singular[..singular.len() - suffix_len]
                .chars()
                .last()
        };
        let is_vowel = |c: Option<char>| matches!(c, Some('a' | 'e' | 'i' | 'o' | 'u'));

        if let Some(stem) = singular.strip_suffix('y')
            && !stem.is_empty()
            && !is_vowel(before_last(1))
        {
            return format!("{stem}ies");
        }

        if ["s", "sh", "ch", "x", "z"].iter().any(|s| singular.ends_with(s)) {
            return format!("{singular}es");
        }

        if let Some(stem) = singular.strip_suffix("fe").filter(|s| !s.is_empty()) {
            return format!("{stem}ves");
        }
        if let Some(stem) = singular
            .strip_suffix('f')
            .filter(|s| !s.is_empty() && !s.ends_with('f'))
        {
            return format!("{stem}ves");
        }

        if singular.ends_with('o')
            && singular.len() > 1
            && !is_vowel(before_last(1))
            && !O_TAKES_S.iter().any(|w| singular.ends_with(w))
        {
            return format!("{singular}es");
        }

        format!("{singular}s")
    }
}
