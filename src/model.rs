//! Wiki records, translations and the typed content elements they hold.
//!
//! Elements keep an open string `type` vocabulary. The stored shape is flat
//! (a scalar `value`, a `picture_keys` gallery and an optional `video_id`)
//! so older consumers keep reading `value`; [`ElementContent`] is the typed
//! view the rest of the crate dispatches on.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identifier of a persisted wiki record.
pub type WikiId = i64;

/// Element types whose value is an image storage key.
const IMAGE_TYPES: &[&str] = &["banner", "large_picture", "graphic", "linked_in", "picture"];

/// Element types whose value is a PDF storage key.
const DOCUMENT_TYPES: &[&str] = &["document", "file"];

/// Element types whose value is free text or an external link.
const TEXT_TYPES: &[&str] = &["text", "video", "link", "url", "description", "quote"];

/// A wiki content document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wiki {
    pub id: WikiId,
    #[serde(rename = "type")]
    pub wiki_type: String,
    pub code: String,
    pub public: i32,
    #[serde(default)]
    pub translation: Vec<Translation>,
    #[serde(default)]
    pub image_wiki: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One language's rendering of a record, or the language-less default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    #[serde(default)]
    pub language: Option<i32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub level: Option<i32>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Translation {
    /// A language-less translation holding `elements` and no metadata.
    pub fn placeholder(elements: Vec<Element>) -> Self {
        Self {
            elements,
            ..Self::default()
        }
    }

    /// Whether this is the default (untranslated) block.
    pub fn is_default(&self) -> bool {
        self.language.is_none()
    }
}

/// One numbered content slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub number: i64,
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub picture_keys: Vec<PictureItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

/// One image of a picture gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PictureItem {
    pub key: String,
    pub order: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Element skeleton used to provision records of one type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiTemplate {
    #[serde(rename = "type")]
    pub wiki_type: String,
    pub elements: Vec<Element>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Typed view of an element's value, dispatched on the `type` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementContent<'a> {
    Scalar {
        value: Option<&'a str>,
        video_id: Option<&'a str>,
    },
    Gallery {
        items: &'a [PictureItem],
        video_id: Option<&'a str>,
    },
}

/// Which file-service endpoint owns a storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Pdf,
}

impl MediaKind {
    /// Classify a bare key when no element type is available.
    pub fn from_suffix(key: &str) -> Self {
        if key.to_ascii_lowercase().ends_with(".pdf") {
            MediaKind::Pdf
        } else {
            MediaKind::Image
        }
    }
}

/// A storage key referenced by an element, with the endpoint that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaRef {
    pub key: String,
    pub kind: MediaKind,
}

/// How a scalar value of a given element type is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueRole {
    Key(MediaKind),
    /// JSON object carrying an image key in the named field.
    Embedded(&'static str),
    Text,
    Unknown,
}

fn value_role(element_type: &str) -> ValueRole {
    let lowered = element_type.to_ascii_lowercase();
    let t = lowered.as_str();
    if IMAGE_TYPES.contains(&t) {
        ValueRole::Key(MediaKind::Image)
    } else if DOCUMENT_TYPES.contains(&t) {
        ValueRole::Key(MediaKind::Pdf)
    } else if t == "button" || t == "button_url" {
        ValueRole::Embedded("button_icon")
    } else if t == "title" {
        ValueRole::Embedded("image_key")
    } else if TEXT_TYPES.contains(&t) {
        ValueRole::Text
    } else {
        ValueRole::Unknown
    }
}

/// True for element types that carry an ordered gallery.
pub fn is_gallery_type(element_type: &str) -> bool {
    element_type.eq_ignore_ascii_case("picture")
}

pub fn is_image_type(element_type: &str) -> bool {
    value_role(element_type) == ValueRole::Key(MediaKind::Image)
}

pub fn is_document_type(element_type: &str) -> bool {
    value_role(element_type) == ValueRole::Key(MediaKind::Pdf)
}

/// Heuristic for values of unrecognised types: keys have no whitespace and
/// are neither JSON nor absolute URLs.
fn looks_like_storage_key(value: &str) -> bool {
    !value.is_empty()
        && !value.chars().any(char::is_whitespace)
        && !value.starts_with('{')
        && !value.starts_with('[')
        && !value.contains("://")
}

/// Read a string field out of a JSON object value.
pub fn embedded_field(value: &str, field: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(value).ok()?;
    parsed
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The storage key held by a scalar value of `element_type`, if any.
fn scalar_media_ref(element_type: &str, value: Option<&str>) -> Option<MediaRef> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match value_role(element_type) {
        ValueRole::Key(kind) => Some(MediaRef {
            key: value.to_string(),
            kind,
        }),
        ValueRole::Embedded(field) => embedded_field(value, field).map(|key| MediaRef {
            key,
            kind: MediaKind::Image,
        }),
        ValueRole::Text => None,
        ValueRole::Unknown if looks_like_storage_key(value) => Some(MediaRef {
            key: value.to_string(),
            kind: MediaKind::from_suffix(value),
        }),
        ValueRole::Unknown => None,
    }
}

impl Element {
    /// Build the stored shape of a requested element.
    ///
    /// Picture elements store the gallery as given and mirror the first
    /// item's key into `value`; a picture without gallery keeps its legacy
    /// single `value`. Every other type stores `value` as given.
    pub fn from_input(input: &ElementInput) -> Self {
        let (value, picture_keys) = if is_gallery_type(&input.element_type) {
            match input.picture_keys.first() {
                Some(first) => (Some(first.key.clone()), input.picture_keys.clone()),
                None => (input.value.clone(), Vec::new()),
            }
        } else {
            (input.value.clone(), Vec::new())
        };

        Self {
            number: input.number,
            element_type: input.element_type.clone(),
            value,
            picture_keys,
            video_id: input.video_id.clone(),
        }
    }

    /// Template skeleton: number, type and video reference only.
    pub fn skeleton(input: &ElementInput) -> Self {
        Self {
            number: input.number,
            element_type: input.element_type.clone(),
            value: None,
            picture_keys: Vec::new(),
            video_id: input.video_id.clone(),
        }
    }

    pub fn content(&self) -> ElementContent<'_> {
        let video_id = self.video_id.as_deref();
        if is_gallery_type(&self.element_type) {
            ElementContent::Gallery {
                items: &self.picture_keys,
                video_id,
            }
        } else {
            ElementContent::Scalar {
                value: self.value.as_deref(),
                video_id,
            }
        }
    }

    /// Whether the scalar value is present and not blank.
    pub fn has_value(&self) -> bool {
        self.value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    /// Storage keys this element owns in the file service.
    pub fn media_refs(&self) -> Vec<MediaRef> {
        match self.content() {
            ElementContent::Gallery { items, .. } => {
                let mut refs: Vec<MediaRef> = items
                    .iter()
                    .filter(|item| !item.key.is_empty())
                    .map(|item| MediaRef {
                        key: item.key.clone(),
                        kind: MediaKind::Image,
                    })
                    .collect();
                if let Some(value) = self.value.as_deref().filter(|v| !v.is_empty()) {
                    if !refs.iter().any(|r| r.key == value) {
                        refs.push(MediaRef {
                            key: value.to_string(),
                            kind: MediaKind::Image,
                        });
                    }
                }
                refs
            }
            ElementContent::Scalar { value, .. } => {
                scalar_media_ref(&self.element_type, value).into_iter().collect()
            }
        }
    }
}

/// A requested element as it arrives from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInput {
    #[serde(default)]
    pub number: i64,
    #[serde(rename = "type", default)]
    pub element_type: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub picture_keys: Vec<PictureItem>,
    #[serde(default)]
    pub video_id: Option<String>,
}

impl ElementInput {
    /// Every key-like string this input references: the raw value, every
    /// gallery key and any key embedded in a JSON value.
    pub fn referenced_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Some(value) = self.value.as_deref().filter(|v| !v.is_empty()) {
            keys.push(value.to_string());
        }
        keys.extend(
            self.picture_keys
                .iter()
                .filter(|item| !item.key.is_empty())
                .map(|item| item.key.clone()),
        );
        if let Some(media) = scalar_media_ref(&self.element_type, self.value.as_deref()) {
            keys.push(media.key);
        }
        keys
    }
}

impl From<&Element> for ElementInput {
    fn from(element: &Element) -> Self {
        Self {
            number: element.number,
            element_type: element.element_type.clone(),
            value: element.value.clone(),
            picture_keys: element.picture_keys.clone(),
            video_id: element.video_id.clone(),
        }
    }
}

/// Body of a template creation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTemplateRequest {
    #[serde(rename = "type", default)]
    pub wiki_type: String,
    #[serde(default)]
    pub elements: Vec<ElementInput>,
}

impl CreateTemplateRequest {
    /// Load a template request from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse template file {}", path.display()))
    }
}

/// Body of a record update request. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWikiRequest {
    #[serde(default)]
    pub language: Option<i32>,
    #[serde(default)]
    pub public: Option<i32>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub image_wiki: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub level: Option<i32>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub elements: Vec<ElementInput>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn input(number: i64, element_type: &str, value: Option<&str>) -> ElementInput {
        ElementInput {
            number,
            element_type: element_type.to_string(),
            value: value.map(str::to_string),
            ..ElementInput::default()
        }
    }

    fn picture(key: &str, order: i32) -> PictureItem {
        PictureItem {
            key: key.to_string(),
            order,
            title: None,
        }
    }

    #[test]
    fn test_picture_input_mirrors_first_gallery_key() {
        let mut req = input(1, "picture", Some("ignored"));
        req.picture_keys = vec![picture("b", 1), picture("a", 0)];

        let element = Element::from_input(&req);

        assert_eq!(element.value.as_deref(), Some("b"));
        assert_eq!(element.picture_keys, req.picture_keys);
    }

    #[test]
    fn test_picture_without_gallery_keeps_legacy_value() {
        let element = Element::from_input(&input(1, "Picture", Some("legacy.png")));
        assert_eq!(element.value.as_deref(), Some("legacy.png"));
        assert!(element.picture_keys.is_empty());
    }

    #[test]
    fn test_scalar_input_drops_gallery() {
        let mut req = input(2, "text", Some("hello"));
        req.picture_keys = vec![picture("x", 0)];
        req.video_id = Some("vid-1".to_string());

        let element = Element::from_input(&req);

        assert_eq!(element.value.as_deref(), Some("hello"));
        assert!(element.picture_keys.is_empty());
        assert_eq!(element.video_id.as_deref(), Some("vid-1"));
    }

    #[test]
    fn test_skeleton_strips_values() {
        let mut req = input(3, "picture", Some("a"));
        req.picture_keys = vec![picture("a", 0)];
        req.video_id = Some("v".to_string());

        let element = Element::skeleton(&req);

        assert_eq!(element.number, 3);
        assert!(element.value.is_none());
        assert!(element.picture_keys.is_empty());
        assert_eq!(element.video_id.as_deref(), Some("v"));
    }

    #[test]
    fn test_content_dispatch() {
        let scalar = Element::from_input(&input(1, "banner", Some("b.png")));
        assert!(matches!(
            scalar.content(),
            ElementContent::Scalar {
                value: Some("b.png"),
                ..
            }
        ));

        let mut req = input(2, "picture", None);
        req.picture_keys = vec![picture("a", 0)];
        let gallery = Element::from_input(&req);
        match gallery.content() {
            ElementContent::Gallery { items, .. } => assert_eq!(items.len(), 1),
            other => panic!("expected gallery, got {:?}", other),
        }
    }

    #[test]
    fn test_media_refs_by_type() {
        let banner = Element::from_input(&input(1, "banner", Some("b.png")));
        assert_eq!(
            banner.media_refs(),
            vec![MediaRef {
                key: "b.png".to_string(),
                kind: MediaKind::Image
            }]
        );

        let document = Element::from_input(&input(2, "document", Some("f.pdf")));
        assert_eq!(document.media_refs()[0].kind, MediaKind::Pdf);

        let text = Element::from_input(&input(3, "text", Some("plain words")));
        assert!(text.media_refs().is_empty());
    }

    #[test]
    fn test_media_refs_embedded_button_icon() {
        let button = Element::from_input(&input(
            4,
            "button",
            Some(r#"{"label":"Go","button_icon":"icon.png"}"#),
        ));
        assert_eq!(
            button.media_refs(),
            vec![MediaRef {
                key: "icon.png".to_string(),
                kind: MediaKind::Image
            }]
        );

        let plain_title = Element::from_input(&input(5, "title", Some("Just a title")));
        assert!(plain_title.media_refs().is_empty());
    }

    #[test]
    fn test_media_refs_unknown_type_uses_suffix() {
        let pdf = Element::from_input(&input(6, "brochure", Some("guide.PDF")));
        assert_eq!(pdf.media_refs()[0].kind, MediaKind::Pdf);

        let image = Element::from_input(&input(7, "sticker", Some("s/1.webp")));
        assert_eq!(image.media_refs()[0].kind, MediaKind::Image);

        let prose = Element::from_input(&input(8, "caption", Some("two words")));
        assert!(prose.media_refs().is_empty());

        let url = Element::from_input(&input(9, "embed", Some("https://example.com/x")));
        assert!(url.media_refs().is_empty());
    }

    #[test]
    fn test_gallery_media_refs_include_legacy_value() {
        let element = Element {
            number: 1,
            element_type: "picture".to_string(),
            value: Some("old.png".to_string()),
            picture_keys: vec![picture("a", 0)],
            video_id: None,
        };

        let keys: Vec<String> = element.media_refs().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["a".to_string(), "old.png".to_string()]);
    }

    #[test]
    fn test_referenced_keys_cover_value_gallery_and_embedded() {
        let mut req = input(1, "button", Some(r#"{"button_icon":"i.png"}"#));
        req.picture_keys = vec![picture("g", 0)];

        let keys = req.referenced_keys();

        assert!(keys.contains(&r#"{"button_icon":"i.png"}"#.to_string()));
        assert!(keys.contains(&"g".to_string()));
        assert!(keys.contains(&"i.png".to_string()));
    }

    #[test]
    fn test_has_value_trims_whitespace() {
        assert!(!Element::from_input(&input(1, "text", Some("   "))).has_value());
        assert!(!Element::from_input(&input(1, "text", None)).has_value());
        assert!(Element::from_input(&input(1, "text", Some(" x "))).has_value());
    }

    #[test]
    fn test_from_suffix() {
        assert_eq!(MediaKind::from_suffix("a/b/c.pdf"), MediaKind::Pdf);
        assert_eq!(MediaKind::from_suffix("a/b/c.png"), MediaKind::Image);
        assert_eq!(MediaKind::from_suffix("noext"), MediaKind::Image);
    }

    #[test]
    fn test_element_deserialization_defaults() {
        let json = r#"{"number": 5, "type": "text"}"#;
        let element: Element = serde_json::from_str(json).expect("Should deserialize");
        assert_eq!(element.number, 5);
        assert!(element.value.is_none());
        assert!(element.picture_keys.is_empty());
        assert!(element.video_id.is_none());
    }

    #[test]
    fn test_update_request_deserialization() {
        let json = r#"{
            "language": 2,
            "title": "Hello",
            "elements": [
                {"number": 1, "type": "picture", "picture_keys": [{"key": "a", "order": 0, "title": "A"}]}
            ]
        }"#;
        let req: UpdateWikiRequest = serde_json::from_str(json).expect("Should deserialize");
        assert_eq!(req.language, Some(2));
        assert!(req.public.is_none());
        assert_eq!(req.elements[0].picture_keys[0].title.as_deref(), Some("A"));
    }

    #[test]
    fn test_template_request_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"type": "quiz", "elements": [{{"number": 1, "type": "text"}}]}}"#
        )
        .expect("write");

        let req = CreateTemplateRequest::from_file(file.path()).expect("Should load");
        assert_eq!(req.wiki_type, "quiz");
        assert_eq!(req.elements.len(), 1);
    }

    #[test]
    fn test_template_request_from_missing_file() {
        let result = CreateTemplateRequest::from_file(Path::new("/non/existent/template.json"));
        assert!(result.is_err());
    }
}
