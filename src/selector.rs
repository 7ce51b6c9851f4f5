//! Picks the translation that applies to a requested language.

use crate::model::{Element, Translation, Wiki};

/// Outcome of a language lookup over a record's translations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// A translation with exactly the requested language.
    Exact(usize),
    /// No exact match; the language-less default applies.
    Default(usize),
    /// Neither an exact match nor a default exists.
    Missing,
}

impl Selection {
    pub fn index(self) -> Option<usize> {
        match self {
            Selection::Exact(i) | Selection::Default(i) => Some(i),
            Selection::Missing => None,
        }
    }
}

/// Find the translation for `language`. The first exact match in stored
/// order wins, then the first default. A default is never matched by
/// language value.
pub fn select(translations: &[Translation], language: i32) -> Selection {
    if let Some(i) = translations
        .iter()
        .position(|t| t.language == Some(language))
    {
        return Selection::Exact(i);
    }
    match translations.iter().position(Translation::is_default) {
        Some(i) => Selection::Default(i),
        None => Selection::Missing,
    }
}

/// Narrow a record to the single translation a reader of `language` sees.
///
/// With no language the record is left untouched. When the record has
/// neither a matching nor a default translation, the template elements are
/// substituted as synthetic content for that language.
pub fn narrow(record: &mut Wiki, language: Option<i32>, template: Option<&[Element]>) {
    let Some(language) = language else {
        return;
    };

    let chosen = match select(&record.translation, language).index() {
        Some(i) => record.translation.swap_remove(i),
        None => Translation {
            language: Some(language),
            elements: template.map(<[Element]>::to_vec).unwrap_or_default(),
            ..Translation::default()
        },
    };
    record.translation = vec![chosen];
}

/// Translation an update should write into, if one exists.
///
/// A request without language targets the default translation.
pub fn update_target(translations: &[Translation], language: Option<i32>) -> Option<usize> {
    match language {
        Some(language) => select(translations, language).index(),
        None => translations.iter().position(Translation::is_default),
    }
}
