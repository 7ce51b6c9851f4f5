//! Completion statistics for editorial dashboards.
//!
//! For every record, each distinct `(number, type)` slot is marked "yes"
//! once any translation holds a non-blank value for it, and each language
//! is marked "yes" once any of its elements does. A "yes" is never
//! downgraded by a later blank occurrence.

use crate::model::Wiki;
use serde::Serialize;
use std::collections::BTreeMap;

/// Label used for translations without a language. It never appears in the
/// per-language output.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Check {
    Yes,
    No,
}

impl From<bool> for Check {
    fn from(value: bool) -> Self {
        if value {
            Check::Yes
        } else {
            Check::No
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementStatistics {
    pub number: i64,
    #[serde(rename = "type")]
    pub element_type: String,
    pub check: Check,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikiStatistics {
    pub code: String,
    pub languages: BTreeMap<String, Check>,
    pub elements: Vec<ElementStatistics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    /// `limit` must be positive.
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: if total <= 0 { 0 } else { (total - 1) / limit + 1 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticsPage {
    pub items: Vec<WikiStatistics>,
    pub pagination: Pagination,
}

/// Completion summary of one record.
///
/// Elements with a non-positive number or a blank type are corrupt stored
/// data and are skipped.
pub fn summarize(record: &Wiki) -> WikiStatistics {
    let mut elements: BTreeMap<(i64, &str), Check> = BTreeMap::new();
    let mut languages: BTreeMap<String, Check> = BTreeMap::new();

    for translation in &record.translation {
        let label = translation.language.map(|l| l.to_string());
        if let Some(label) = &label {
            languages.entry(label.clone()).or_insert(Check::No);
        }

        for element in &translation.elements {
            if element.number <= 0 || element.element_type.trim().is_empty() {
                continue;
            }

            let slot = elements
                .entry((element.number, element.element_type.as_str()))
                .or_insert(Check::No);
            if element.has_value() {
                *slot = Check::Yes;
                if let Some(label) = &label {
                    languages.insert(label.clone(), Check::Yes);
                }
            }
        }
    }

    WikiStatistics {
        code: record.code.clone(),
        languages,
        elements: elements
            .into_iter()
            .map(|((number, element_type), check)| ElementStatistics {
                number,
                element_type: element_type.to_string(),
                check,
            })
            .collect(),
    }
}

/// Summaries of one page of records with the paging envelope.
pub fn aggregate(records: &[Wiki], page: i64, limit: i64, total: i64) -> StatisticsPage {
    StatisticsPage {
        items: records.iter().map(summarize).collect(),
        pagination: Pagination::new(page, limit, total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Element, Translation};
    use chrono::Utc;
    use proptest::prelude::*;

    fn element(number: i64, element_type: &str, value: Option<&str>) -> Element {
        Element {
            number,
            element_type: element_type.to_string(),
            value: value.map(str::to_string),
            picture_keys: Vec::new(),
            video_id: None,
        }
    }

    fn translation(language: Option<i32>, elements: Vec<Element>) -> Translation {
        Translation {
            language,
            elements,
            ..Translation::default()
        }
    }

    fn record(code: &str, translations: Vec<Translation>) -> Wiki {
        let now = Utc::now();
        Wiki {
            id: 1,
            wiki_type: "quiz".to_string(),
            code: code.to_string(),
            public: 1,
            translation: translations,
            image_wiki: String::new(),
            created_by: "user-1".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn check_of(stats: &WikiStatistics, number: i64, element_type: &str) -> Check {
        stats
            .elements
            .iter()
            .find(|e| e.number == number && e.element_type == element_type)
            .map(|e| e.check)
            .expect("element present")
    }

    #[test]
    fn test_blank_string_is_not_a_value() {
        let wiki = record(
            "0001",
            vec![translation(Some(1), vec![element(5, "text", Some(""))])],
        );

        let stats = summarize(&wiki);

        assert_eq!(check_of(&stats, 5, "text"), Check::No);
        assert_eq!(stats.languages.get("1"), Some(&Check::No));
    }

    #[test]
    fn test_whitespace_only_is_not_a_value() {
        let wiki = record(
            "0001",
            vec![translation(Some(1), vec![element(1, "text", Some(" \t\n"))])],
        );
        assert_eq!(check_of(&summarize(&wiki), 1, "text"), Check::No);
    }

    #[test]
    fn test_yes_is_sticky_across_translations() {
        let wiki = record(
            "0002",
            vec![
                translation(Some(1), vec![element(1, "text", Some("hello"))]),
                translation(Some(2), vec![element(1, "text", None)]),
            ],
        );

        let stats = summarize(&wiki);

        assert_eq!(check_of(&stats, 1, "text"), Check::Yes);
        assert_eq!(stats.languages.get("1"), Some(&Check::Yes));
        assert_eq!(stats.languages.get("2"), Some(&Check::No));
    }

    #[test]
    fn test_later_yes_overwrites_no() {
        let wiki = record(
            "0003",
            vec![
                translation(Some(1), vec![element(1, "text", None)]),
                translation(Some(2), vec![element(1, "text", Some("hola"))]),
            ],
        );
        assert_eq!(check_of(&summarize(&wiki), 1, "text"), Check::Yes);
    }

    #[test]
    fn test_default_translation_counts_for_elements_not_languages() {
        let wiki = record(
            "0004",
            vec![translation(None, vec![element(2, "banner", Some("b.png"))])],
        );

        let stats = summarize(&wiki);

        assert_eq!(check_of(&stats, 2, "banner"), Check::Yes);
        assert!(stats.languages.is_empty());
        assert!(!stats.languages.contains_key(UNKNOWN_LANGUAGE));
    }

    #[test]
    fn test_same_number_different_types_are_distinct_slots() {
        let wiki = record(
            "0005",
            vec![translation(
                Some(1),
                vec![
                    element(3, "text", Some("x")),
                    element(3, "large_picture", None),
                    element(1, "title", None),
                ],
            )],
        );

        let stats = summarize(&wiki);

        let order: Vec<(i64, &str)> = stats
            .elements
            .iter()
            .map(|e| (e.number, e.element_type.as_str()))
            .collect();
        assert_eq!(order, vec![(1, "title"), (3, "large_picture"), (3, "text")]);
        assert_eq!(check_of(&stats, 3, "large_picture"), Check::No);
        assert_eq!(check_of(&stats, 3, "text"), Check::Yes);
    }

    #[test]
    fn test_corrupt_elements_are_skipped() {
        let wiki = record(
            "0006",
            vec![translation(
                Some(1),
                vec![
                    element(0, "text", Some("x")),
                    element(2, " ", Some("y")),
                    element(4, "text", Some("z")),
                ],
            )],
        );

        let stats = summarize(&wiki);

        assert_eq!(stats.elements.len(), 1);
        assert_eq!(stats.elements[0].number, 4);
    }

    #[test]
    fn test_aggregate_pagination() {
        let records = vec![record("0001", vec![]), record("0002", vec![])];

        let page = aggregate(&records, 2, 2, 5);

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[1].code, "0002");
        assert_eq!(
            page.pagination,
            Pagination {
                page: 2,
                limit: 2,
                total: 5,
                total_pages: 3
            }
        );
    }

    #[test]
    fn test_total_pages_rounding() {
        assert_eq!(Pagination::new(1, 20, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 20, 20).total_pages, 1);
        assert_eq!(Pagination::new(1, 20, 21).total_pages, 2);
        assert_eq!(Pagination::new(1, 1, 6000).total_pages, 6000);
    }

    #[test]
    fn test_total_pages_with_huge_limit() {
        assert_eq!(Pagination::new(1, i64::MAX, 3).total_pages, 1);
        assert_eq!(Pagination::new(1, i64::MAX, i64::MAX).total_pages, 1);
        assert_eq!(Pagination::new(1, i64::MAX, 0).total_pages, 0);
    }

    #[test]
    fn test_serialization_shape() {
        let wiki = record(
            "0007",
            vec![translation(Some(1), vec![element(1, "text", Some("x"))])],
        );
        let json = serde_json::to_value(summarize(&wiki)).expect("serialize");
        assert_eq!(json["languages"]["1"], "yes");
        assert_eq!(json["elements"][0]["type"], "text");
        assert_eq!(json["elements"][0]["check"], "yes");
    }

    proptest! {
        #[test]
        fn prop_yes_matches_any_non_blank_occurrence(
            values in prop::collection::vec(
                (1i32..4, prop::option::of(prop::sample::select(vec!["", "  ", "a", "b"]))),
                1..12,
            ),
        ) {
            let translations: Vec<Translation> = values
                .iter()
                .map(|(lang, value)| translation(Some(*lang), vec![element(1, "text", *value)]))
                .collect();
            let wiki = record("0001", translations);

            let expected = values
                .iter()
                .any(|(_, v)| v.is_some_and(|s| !s.trim().is_empty()));
            prop_assert_eq!(check_of(&summarize(&wiki), 1, "text"), Check::from(expected));
        }
    }
}
