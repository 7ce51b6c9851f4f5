//! Response shapes for wiki records, with display URLs resolved through the
//! file and media gateways.
//!
//! Presentation runs in two phases: every key, PDF and video reference in
//! the record is collected and resolved concurrently, then the response is
//! built from the resolved table. A failed lookup leaves the URL absent.

use crate::gateway::{CurrentUser, FileGateway, MediaGateway};
use crate::model::{
    embedded_field, is_document_type, is_gallery_type, is_image_type, Element, PictureItem, Wiki,
    WikiId,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WikiResponse {
    pub id: WikiId,
    #[serde(rename = "type")]
    pub wiki_type: String,
    pub code: String,
    pub public: i32,
    /// Display URL of the cover image; empty when unset or unresolved.
    pub image_wiki: String,
    pub translation: Vec<TranslationResponse>,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_user: Option<CurrentUser>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResponse {
    pub language: Option<i32>,
    pub title: Option<String>,
    pub keywords: Option<String>,
    pub level: Option<i32>,
    pub unit: Option<String>,
    pub elements: Vec<ElementResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementResponse {
    pub number: i64,
    #[serde(rename = "type")]
    pub element_type: String,
    /// The stored value, untouched.
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_json: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub picture_keys: Vec<PictureItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub picture_keys_url: Vec<PictureKeyUrl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<TitleResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button: Option<ButtonResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button_url: Option<ButtonResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PictureKeyUrl {
    pub order: i32,
    /// Resolved URL, or the raw key when resolution failed.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleResponse {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub image_key: String,
    #[serde(default)]
    pub image_url: String,
}

/// A button value: the stored JSON object plus the resolved icon URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonResponse {
    #[serde(default)]
    pub button_icon: String,
    #[serde(default)]
    pub button_icon_url: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Resolved display URLs for one record.
#[derive(Debug, Default)]
struct ResolvedUrls {
    images: HashMap<String, String>,
    pdfs: HashMap<String, String>,
    videos: HashMap<(String, Option<i32>), String>,
}

impl ResolvedUrls {
    fn image(&self, key: &str) -> Option<String> {
        self.images.get(key).cloned()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn is_button_type(element_type: &str) -> bool {
    element_type.eq_ignore_ascii_case("button") || element_type.eq_ignore_ascii_case("button_url")
}

fn is_title_type(element_type: &str) -> bool {
    element_type.eq_ignore_ascii_case("title")
}

/// Whether a scalar of this element is presented as a single image.
fn presents_as_image(element: &Element) -> bool {
    is_image_type(&element.element_type)
        && !(is_gallery_type(&element.element_type) && !element.picture_keys.is_empty())
}

#[derive(Default)]
struct Wanted {
    images: BTreeSet<String>,
    pdfs: BTreeSet<String>,
    videos: BTreeSet<(String, Option<i32>)>,
}

fn collect_references(record: &Wiki) -> Wanted {
    let mut wanted = Wanted::default();
    if !record.image_wiki.is_empty() {
        wanted.images.insert(record.image_wiki.clone());
    }

    for translation in &record.translation {
        for element in &translation.elements {
            if let Some(video_id) = non_empty(element.video_id.as_deref()) {
                wanted
                    .videos
                    .insert((video_id.to_string(), translation.language));
            }

            if is_gallery_type(&element.element_type) {
                wanted.images.extend(
                    element
                        .picture_keys
                        .iter()
                        .filter(|item| !item.key.is_empty())
                        .map(|item| item.key.clone()),
                );
            }

            let Some(value) = non_empty(element.value.as_deref()) else {
                continue;
            };
            if presents_as_image(element) {
                wanted.images.insert(value.to_string());
            } else if is_document_type(&element.element_type) {
                wanted.pdfs.insert(value.to_string());
            } else if is_button_type(&element.element_type) {
                wanted.images.extend(embedded_field(value, "button_icon"));
            } else if is_title_type(&element.element_type) {
                wanted.images.extend(embedded_field(value, "image_key"));
            }
        }
    }
    wanted
}

async fn lookup<K, Fut>(kind: &'static str, key: K, pending: Fut) -> Option<(K, String)>
where
    K: std::fmt::Debug,
    Fut: Future<Output = Result<Option<String>>>,
{
    match pending.await {
        Ok(Some(url)) => Some((key, url)),
        Ok(None) => None,
        Err(e) => {
            warn!(kind, key = ?key, "Failed to resolve URL: {:#}", e);
            None
        }
    }
}

async fn resolve<F: FileGateway, M: MediaGateway>(
    wanted: &Wanted,
    files: &F,
    media: &M,
) -> ResolvedUrls {
    let images = join_all(
        wanted
            .images
            .iter()
            .map(|key| lookup("image", key.clone(), files.image_url(key))),
    );
    let pdfs = join_all(
        wanted
            .pdfs
            .iter()
            .map(|key| lookup("pdf", key.clone(), files.pdf_url(key))),
    );
    let videos = join_all(wanted.videos.iter().map(|(video_id, language)| {
        lookup(
            "video",
            (video_id.clone(), *language),
            media.video_url(video_id, *language),
        )
    }));

    let (images, pdfs, videos) = futures::join!(images, pdfs, videos);
    ResolvedUrls {
        images: images.into_iter().flatten().collect(),
        pdfs: pdfs.into_iter().flatten().collect(),
        videos: videos.into_iter().flatten().collect(),
    }
}

fn present_gallery(items: &[PictureItem], urls: &ResolvedUrls) -> (Vec<PictureItem>, Vec<PictureKeyUrl>, Value) {
    let mut sorted = items.to_vec();
    sorted.sort_by_key(|item| item.order);

    let mut picture_urls = Vec::with_capacity(sorted.len());
    let mut objects = Vec::with_capacity(sorted.len());
    for item in &sorted {
        let url = urls.image(&item.key).unwrap_or_else(|| item.key.clone());
        objects.push(json!({
            "key_url": item.key,
            "image_url": url,
            "title": item.title.clone().unwrap_or_default(),
            "order": item.order,
        }));
        picture_urls.push(PictureKeyUrl {
            order: item.order,
            url,
            title: item.title.clone(),
        });
    }
    (sorted, picture_urls, Value::Array(objects))
}

fn present_title(value: &str, urls: &ResolvedUrls) -> TitleResponse {
    match serde_json::from_str::<TitleResponse>(value) {
        Ok(mut title) => {
            if !title.image_key.is_empty() {
                title.image_url = urls.image(&title.image_key).unwrap_or_default();
            }
            title
        }
        Err(_) => TitleResponse {
            title: value.to_string(),
            ..TitleResponse::default()
        },
    }
}

fn present_button(value: &str, urls: &ResolvedUrls) -> Option<ButtonResponse> {
    let mut button: ButtonResponse = serde_json::from_str(value).ok()?;
    if !button.button_icon.is_empty() {
        button.button_icon_url = urls.image(&button.button_icon).unwrap_or_default();
    }
    Some(button)
}

/// Parsed JSON for values that are JSON objects or arrays.
fn raw_json(value: &str) -> Option<Value> {
    let trimmed = value.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    serde_json::from_str(value).ok()
}

fn present_element(element: &Element, language: Option<i32>, urls: &ResolvedUrls) -> ElementResponse {
    let mut response = ElementResponse {
        number: element.number,
        element_type: element.element_type.clone(),
        value: element.value.clone(),
        value_json: None,
        image_url: None,
        pdf_url: None,
        picture_keys: Vec::new(),
        picture_keys_url: Vec::new(),
        title: None,
        button: None,
        button_url: None,
        video_id: element.video_id.clone(),
        video_url: non_empty(element.video_id.as_deref())
            .and_then(|id| urls.videos.get(&(id.to_string(), language)).cloned()),
    };

    let element_type = element.element_type.as_str();
    if is_gallery_type(element_type) && !element.picture_keys.is_empty() {
        let (sorted, picture_urls, objects) = present_gallery(&element.picture_keys, urls);
        response.picture_keys = sorted;
        response.picture_keys_url = picture_urls;
        response.value_json = Some(objects);
        return response;
    }

    let Some(value) = non_empty(element.value.as_deref()) else {
        return response;
    };

    if presents_as_image(element) {
        response.image_url = urls.image(value);
        response.value_json = response
            .image_url
            .as_ref()
            .map(|url| json!({ "key_url": value, "image_url": url }));
    } else if is_document_type(element_type) {
        response.pdf_url = urls.pdfs.get(value).cloned();
    } else {
        response.value_json = raw_json(value);
        if element_type.eq_ignore_ascii_case("button") {
            response.button = present_button(value, urls);
        } else if element_type.eq_ignore_ascii_case("button_url") {
            response.button_url = present_button(value, urls);
        } else if is_title_type(element_type) {
            response.title = Some(present_title(value, urls));
        }
    }
    response
}

/// Build the response for `record`, resolving every display URL it needs.
pub async fn present<F: FileGateway, M: MediaGateway>(
    record: &Wiki,
    files: &F,
    media: &M,
    created_by_user: Option<CurrentUser>,
) -> WikiResponse {
    let urls = resolve(&collect_references(record), files, media).await;

    WikiResponse {
        id: record.id,
        wiki_type: record.wiki_type.clone(),
        code: record.code.clone(),
        public: record.public,
        image_wiki: urls.image(&record.image_wiki).unwrap_or_default(),
        translation: record
            .translation
            .iter()
            .map(|t| TranslationResponse {
                language: t.language,
                title: t.title.clone(),
                keywords: t.keywords.clone(),
                level: t.level,
                unit: t.unit.clone(),
                elements: t
                    .elements
                    .iter()
                    .map(|e| present_element(e, t.language, &urls))
                    .collect(),
            })
            .collect(),
        created_by: record.created_by.clone(),
        created_by_user,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

/// Present several records concurrently, preserving order.
pub async fn present_all<F: FileGateway, M: MediaGateway>(
    records: &[Wiki],
    files: &F,
    media: &M,
    viewer: Option<&CurrentUser>,
) -> Vec<WikiResponse> {
    join_all(records.iter().map(|record| {
        let created_by_user = viewer.filter(|u| u.id == record.created_by).cloned();
        present(record, files, media, created_by_user)
    }))
    .await
}
