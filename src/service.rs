//! Wiki use cases: template provisioning, reads with language narrowing,
//! statistics and translation updates.

use crate::error::{WikiError, WikiResult};
use crate::gateway::{
    CurrentUser, FileGateway, HttpFileGateway, HttpMediaGateway, HttpUserGateway, MediaGateway,
    UserGateway,
};
use crate::model::{
    CreateTemplateRequest, Element, Translation, UpdateWikiRequest, Wiki, WikiId, WikiTemplate,
};
use crate::presenter::{present, present_all, WikiResponse};
use crate::reconcile::{self, ChangeKind};
use crate::repository::{WikiQuery, WikiRepository};
use crate::selector::{self, Selection};
use crate::statistics::{self, Pagination, StatisticsPage};
use crate::validation::{
    parse_id, require, validate_elements, validate_language, validate_paging, validate_search,
};
use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Tunables the service reads from configuration.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Records created for each provisioned template.
    pub provision_count: usize,
    /// Languages accepted on update; empty accepts any non-negative id.
    pub supported_languages: Vec<i32>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            provision_count: 6000,
            supported_languages: Vec::new(),
        }
    }
}

/// Result of creating a template and provisioning its records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    #[serde(rename = "type")]
    pub wiki_type: String,
    pub elements: usize,
    pub created: u64,
}

/// A page of presented records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WikiPage {
    pub items: Vec<WikiResponse>,
    #[serde(flatten)]
    pub pagination: Pagination,
}

/// Listing parameters after defaults are applied.
#[derive(Debug, Clone, Default)]
pub struct WikiListing {
    pub page: i64,
    pub limit: i64,
    pub language: Option<i32>,
    pub wiki_type: String,
    pub search: Option<String>,
}

/// What an update changed and which orphaned media it cleaned up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub id: WikiId,
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    /// Orphaned keys deleted from the file service.
    pub deleted: Vec<String>,
    /// Orphaned keys whose delete failed; they remain in storage.
    pub failed: Vec<String>,
}

pub struct WikiService<R, F = HttpFileGateway, M = HttpMediaGateway, U = HttpUserGateway> {
    repo: R,
    files: F,
    media: M,
    users: U,
    settings: ServiceSettings,
}

impl<R, F, M, U> WikiService<R, F, M, U>
where
    R: WikiRepository,
    F: FileGateway,
    M: MediaGateway,
    U: UserGateway,
{
    pub fn new(repo: R, files: F, media: M, users: U, settings: ServiceSettings) -> Self {
        Self {
            repo,
            files,
            media,
            users,
            settings,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn files(&self) -> &F {
        &self.files
    }

    /// The caller behind `token`, if the user service recognises it.
    /// Lookup failures are logged and treated as anonymous.
    async fn viewer(&self, token: Option<&str>) -> Option<CurrentUser> {
        let token = token?;
        match self.users.current_user(token).await {
            Ok(user) => user,
            Err(e) => {
                warn!("Failed to resolve current user: {:#}", e);
                None
            }
        }
    }

    async fn template_elements(&self, wiki_type: &str) -> WikiResult<Option<Vec<Element>>> {
        Ok(self.repo.template(wiki_type).await?.map(|t| t.elements))
    }

    /// Narrow `records` to `language`, loading the type's template only when
    /// some record has neither a matching nor a default translation.
    async fn narrow_all(&self, records: &mut [Wiki], language: Option<i32>) -> WikiResult<()> {
        let Some(language) = language else {
            return Ok(());
        };

        let needs_template = records
            .iter()
            .any(|r| selector::select(&r.translation, language) == Selection::Missing);
        let mut templates: Vec<(String, Option<Vec<Element>>)> = Vec::new();
        if needs_template {
            for record in records.iter() {
                if !templates.iter().any(|(t, _)| *t == record.wiki_type) {
                    let elements = self.template_elements(&record.wiki_type).await?;
                    templates.push((record.wiki_type.clone(), elements));
                }
            }
        }

        for record in records.iter_mut() {
            let template = templates
                .iter()
                .find(|(t, _)| *t == record.wiki_type)
                .and_then(|(_, elements)| elements.as_deref());
            selector::narrow(record, Some(language), template);
        }
        Ok(())
    }

    /// Store the skeleton of `request` as the template of its type and
    /// replace every record of that type with freshly provisioned copies.
    pub async fn create_template(
        &self,
        request: CreateTemplateRequest,
        token: Option<&str>,
    ) -> WikiResult<ProvisionReport> {
        let user = match token {
            Some(token) => self
                .users
                .current_user(token)
                .await
                .context("Failed to resolve current user")?,
            None => None,
        };
        let user = user.ok_or_else(|| WikiError::validation("user is required"))?;

        let wiki_type = require(&request.wiki_type, "type")?.to_string();
        if request.elements.is_empty() {
            return Err(WikiError::validation("elements are required"));
        }
        validate_elements(&request.elements)?;

        let now = Utc::now();
        let template = WikiTemplate {
            wiki_type: wiki_type.clone(),
            elements: request.elements.iter().map(Element::skeleton).collect(),
            created_by: user.id.clone(),
            created_at: now,
            updated_at: now,
        };
        self.repo.save_template(&template).await?;

        let records: Vec<Wiki> = (1..=self.settings.provision_count)
            .map(|i| Wiki {
                id: 0,
                wiki_type: wiki_type.clone(),
                code: format!("{:04}", i),
                public: 1,
                translation: vec![Translation::placeholder(template.elements.clone())],
                image_wiki: String::new(),
                created_by: user.id.clone(),
                created_at: now,
                updated_at: now,
            })
            .collect();
        let created = self.repo.replace_all(&wiki_type, records).await?;

        info!(
            wiki_type = %wiki_type,
            elements = template.elements.len(),
            created,
            "Provisioned records from template"
        );
        Ok(ProvisionReport {
            wiki_type,
            elements: template.elements.len(),
            created,
        })
    }

    pub async fn get_template(&self, wiki_type: &str) -> WikiResult<WikiTemplate> {
        let wiki_type = require(wiki_type, "type")?;
        self.repo
            .template(wiki_type)
            .await?
            .ok_or_else(|| WikiError::not_found("template not found"))
    }

    pub async fn statistics(
        &self,
        page: i64,
        limit: i64,
        wiki_type: Option<&str>,
        search: Option<&str>,
    ) -> WikiResult<StatisticsPage> {
        validate_paging(page, limit)?;
        let search = validate_search(search)?;
        let wiki_type = wiki_type.map(str::trim).filter(|t| !t.is_empty());

        let (records, total) = self
            .repo
            .list(WikiQuery {
                wiki_type,
                search,
                page,
                limit,
            })
            .await?;
        Ok(statistics::aggregate(&records, page, limit, total))
    }

    pub async fn get_by_code(
        &self,
        code: &str,
        wiki_type: &str,
        language: Option<i32>,
        token: Option<&str>,
    ) -> WikiResult<WikiResponse> {
        let code = require(code, "code")?;
        let wiki_type = require(wiki_type, "type")?;

        let record = self
            .repo
            .get_by_code(wiki_type, code)
            .await?
            .ok_or_else(|| WikiError::not_found("wiki not found"))?;
        self.present_one(record, language, token).await
    }

    pub async fn list(&self, listing: &WikiListing, token: Option<&str>) -> WikiResult<WikiPage> {
        let wiki_type = require(&listing.wiki_type, "type")?;
        validate_paging(listing.page, listing.limit)?;
        let search = validate_search(listing.search.as_deref())?;

        let (mut records, total) = self
            .repo
            .list(WikiQuery {
                wiki_type: Some(wiki_type),
                search,
                page: listing.page,
                limit: listing.limit,
            })
            .await?;
        self.narrow_all(&mut records, listing.language).await?;

        let viewer = self.viewer(token).await;
        let items = present_all(&records, &self.files, &self.media, viewer.as_ref()).await;
        Ok(WikiPage {
            items,
            pagination: Pagination::new(listing.page, listing.limit, total),
        })
    }

    pub async fn get_by_id(
        &self,
        raw_id: &str,
        language: Option<i32>,
        token: Option<&str>,
    ) -> WikiResult<WikiResponse> {
        let id = parse_id(raw_id)?;
        let record = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| WikiError::not_found("wiki not found"))?;
        self.present_one(record, language, token).await
    }

    async fn present_one(
        &self,
        mut record: Wiki,
        language: Option<i32>,
        token: Option<&str>,
    ) -> WikiResult<WikiResponse> {
        self.narrow_all(std::slice::from_mut(&mut record), language)
            .await?;
        let author = self
            .viewer(token)
            .await
            .filter(|user| user.id == record.created_by);
        Ok(present(&record, &self.files, &self.media, author).await)
    }

    /// Apply `request` to one translation of the record and persist it, then
    /// delete media the new element set no longer references.
    pub async fn update(&self, raw_id: &str, request: UpdateWikiRequest) -> WikiResult<UpdateReport> {
        let id = parse_id(raw_id)?;
        let mut record = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| WikiError::not_found("wiki not found"))?;

        if let Some(language) = request.language {
            validate_language(language, &self.settings.supported_languages)?;
        }
        validate_elements(&request.elements)?;

        let index = match selector::update_target(&record.translation, request.language) {
            Some(index) => index,
            None if request.elements.is_empty() => {
                return Err(WikiError::validation(
                    "elements are required when creating a new translation",
                ));
            }
            None => {
                record.translation.push(Translation {
                    language: request.language,
                    ..Translation::default()
                });
                record.translation.len() - 1
            }
        };

        let plan = if request.elements.is_empty() {
            None
        } else {
            Some(reconcile::plan(
                &record.translation[index].elements,
                &request.elements,
            )?)
        };

        if let Some(image_wiki) = request.image_wiki {
            record.image_wiki = image_wiki;
        }
        if let Some(public) = request.public {
            record.public = public;
        }

        let translation = &mut record.translation[index];
        if translation.is_default() && request.language.is_some() {
            debug!(id, language = ?request.language, "Default translation claimed by language");
            translation.language = request.language;
        }
        if let Some(title) = request.title {
            translation.title = Some(title);
        }
        if let Some(keywords) = request.keywords {
            translation.keywords = Some(keywords);
        }
        if let Some(level) = request.level {
            translation.level = Some(level);
        }
        if let Some(unit) = request.unit {
            translation.unit = Some(unit);
        }

        let mut report = UpdateReport {
            id,
            ..UpdateReport::default()
        };
        let orphans = match plan {
            Some(plan) => {
                report.added = plan.count(ChangeKind::Added);
                report.modified = plan.count(ChangeKind::Modified);
                report.removed = plan.count(ChangeKind::Removed);
                translation.elements = plan.elements;
                plan.orphans
            }
            None => Vec::new(),
        };
        let orphans = reconcile::unreferenced(orphans, &record);

        record.updated_at = Utc::now();
        if !self.repo.update(&record).await? {
            return Err(WikiError::not_found("wiki not found"));
        }

        for outcome in reconcile::sweep(&self.files, &orphans).await {
            match &outcome.error {
                None => report.deleted.push(outcome.key),
                Some(error) => {
                    warn!(id, key = %outcome.key, kind = ?outcome.kind, "Failed to delete orphaned media: {}", error);
                    report.failed.push(outcome.key);
                }
            }
        }

        info!(
            id,
            added = report.added,
            modified = report.modified,
            removed = report.removed,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Updated wiki"
        );
        Ok(report)
    }
}
