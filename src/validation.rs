//! Request validation that must pass before any record is touched.

use crate::error::{WikiError, WikiResult};
use crate::model::{ElementInput, WikiId};
use std::collections::HashSet;

/// Check an element batch: every number positive, every type non-blank,
/// numbers unique within the batch.
pub fn validate_elements(elements: &[ElementInput]) -> WikiResult<()> {
    let mut seen = HashSet::with_capacity(elements.len());
    for element in elements {
        if element.number <= 0 {
            return Err(WikiError::validation(format!(
                "element number must be greater than 0, got {}",
                element.number
            )));
        }
        if element.element_type.trim().is_empty() {
            return Err(WikiError::validation(format!(
                "element {} is missing a type",
                element.number
            )));
        }
        if !seen.insert(element.number) {
            return Err(WikiError::validation(format!(
                "duplicate element number {}",
                element.number
            )));
        }
    }
    Ok(())
}

/// Largest page size a listing may request.
pub const MAX_PAGE_LIMIT: i64 = 1000;

pub fn validate_paging(page: i64, limit: i64) -> WikiResult<()> {
    if page < 1 {
        return Err(WikiError::validation("page must be greater than 0"));
    }
    if limit < 1 {
        return Err(WikiError::validation("limit must be greater than 0"));
    }
    if limit > MAX_PAGE_LIMIT {
        return Err(WikiError::validation(format!(
            "limit must not exceed {}",
            MAX_PAGE_LIMIT
        )));
    }
    Ok(())
}

/// A language must be non-negative and, when a supported list is
/// configured, one of its entries.
pub fn validate_language(language: i32, supported: &[i32]) -> WikiResult<()> {
    if language < 0 {
        return Err(WikiError::validation(
            "language must be greater than or equal to 0",
        ));
    }
    if !supported.is_empty() && !supported.contains(&language) {
        return Err(WikiError::validation(format!(
            "language {} does not exist",
            language
        )));
    }
    Ok(())
}

pub fn require<'a>(value: &'a str, field: &str) -> WikiResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WikiError::validation(format!("{} is required", field)));
    }
    Ok(trimmed)
}

/// A search term is a case-insensitive regular expression; blank terms
/// mean no filter.
pub fn validate_search(search: Option<&str>) -> WikiResult<Option<&str>> {
    let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    regex::Regex::new(search)
        .map_err(|_| WikiError::validation(format!("invalid search pattern: {}", search)))?;
    Ok(Some(search))
}

pub fn parse_id(raw: &str) -> WikiResult<WikiId> {
    let raw = require(raw, "id")?;
    match raw.parse::<WikiId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(WikiError::validation("invalid id format")),
    }
}
