use crate::model::{Element, Translation, Wiki, WikiId, WikiTemplate};
use crate::repository::{WikiQuery, WikiRepository};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::{debug, info};

/// Rows per bulk `INSERT`, keeping bind parameters well under the
/// PostgreSQL limit of 65535.
const INSERT_CHUNK: usize = 1000;

const WIKI_COLUMNS: &str =
    "id, type, code, public, image_wiki, created_by, created_at, updated_at, translations";

#[derive(Debug, FromRow)]
struct WikiRow {
    id: i64,
    #[sqlx(rename = "type")]
    wiki_type: String,
    code: String,
    public: i32,
    image_wiki: String,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    translations: Json<Vec<Translation>>,
}

impl From<WikiRow> for Wiki {
    fn from(row: WikiRow) -> Self {
        Wiki {
            id: row.id,
            wiki_type: row.wiki_type,
            code: row.code,
            public: row.public,
            translation: row.translations.0,
            image_wiki: row.image_wiki,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TemplateRow {
    #[sqlx(rename = "type")]
    wiki_type: String,
    elements: Json<Vec<Element>>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TemplateRow> for WikiTemplate {
    fn from(row: TemplateRow) -> Self {
        WikiTemplate {
            wiki_type: row.wiki_type,
            elements: row.elements.0,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// PostgreSQL-backed wiki store.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to `database_url` and create the tables if missing.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS wikis (
                id BIGSERIAL PRIMARY KEY,
                type TEXT NOT NULL,
                code TEXT NOT NULL,
                public INTEGER NOT NULL DEFAULT 1,
                image_wiki TEXT NOT NULL DEFAULT '',
                created_by TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                translations JSONB NOT NULL DEFAULT '[]'::jsonb
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create wikis table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS wikis_type_code_idx ON wikis (type, code)")
            .execute(&self.pool)
            .await
            .context("Failed to create wikis index")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS wiki_templates (
                type TEXT PRIMARY KEY,
                elements JSONB NOT NULL DEFAULT '[]'::jsonb,
                created_by TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create wiki_templates table")?;

        info!("Database schema is up to date");
        Ok(())
    }
}

/// Append the `WHERE` clause for `query` to `builder`.
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &WikiQuery<'_>) {
    builder.push(" WHERE TRUE");
    if let Some(wiki_type) = query.wiki_type {
        builder.push(" AND type = ").push_bind(wiki_type.to_string());
    }
    if let Some(search) = query.search.filter(|s| !s.is_empty()) {
        builder
            .push(" AND (code ~* ")
            .push_bind(search.to_string())
            .push(
                " OR EXISTS (SELECT 1 FROM jsonb_array_elements(translations) AS t \
                 WHERE t->>'title' ~* ",
            )
            .push_bind(search.to_string())
            .push("))");
    }
}

fn list_query<'a>(query: &WikiQuery<'_>) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {WIKI_COLUMNS} FROM wikis"));
    push_filters(&mut builder, query);
    builder
        .push(" ORDER BY code ASC, id ASC LIMIT ")
        .push_bind(query.limit)
        .push(" OFFSET ")
        .push_bind(query.offset());
    builder
}

fn count_query<'a>(query: &WikiQuery<'_>) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM wikis");
    push_filters(&mut builder, query);
    builder
}

fn insert_query<'a>(records: &[Wiki]) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(
        "INSERT INTO wikis (type, code, public, image_wiki, created_by, created_at, updated_at, translations) ",
    );
    builder.push_values(records, |mut row, wiki| {
        row.push_bind(wiki.wiki_type.clone())
            .push_bind(wiki.code.clone())
            .push_bind(wiki.public)
            .push_bind(wiki.image_wiki.clone())
            .push_bind(wiki.created_by.clone())
            .push_bind(wiki.created_at)
            .push_bind(wiki.updated_at)
            .push_bind(Json(wiki.translation.clone()));
    });
    builder
}

impl WikiRepository for Database {
    async fn save_template(&self, template: &WikiTemplate) -> Result<()> {
        sqlx::query(
            "INSERT INTO wiki_templates (type, elements, created_by, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (type) DO UPDATE SET
                elements = EXCLUDED.elements,
                created_by = EXCLUDED.created_by,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(&template.wiki_type)
        .bind(Json(&template.elements))
        .bind(&template.created_by)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to save template")?;
        Ok(())
    }

    async fn template(&self, wiki_type: &str) -> Result<Option<WikiTemplate>> {
        let row: Option<TemplateRow> = sqlx::query_as(
            "SELECT type, elements, created_by, created_at, updated_at
             FROM wiki_templates WHERE type = $1",
        )
        .bind(wiki_type)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load template")?;
        Ok(row.map(WikiTemplate::from))
    }

    async fn replace_all(&self, wiki_type: &str, records: Vec<Wiki>) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let removed = sqlx::query("DELETE FROM wikis WHERE type = $1")
            .bind(wiki_type)
            .execute(&mut *tx)
            .await
            .context("Failed to remove existing records")?
            .rows_affected();
        debug!(wiki_type, removed, "Removed existing records");

        let mut inserted = 0;
        for chunk in records.chunks(INSERT_CHUNK) {
            inserted += insert_query(chunk)
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to insert records")?
                .rows_affected();
        }

        tx.commit().await.context("Failed to commit records")?;
        Ok(inserted)
    }

    async fn list(&self, query: WikiQuery<'_>) -> Result<(Vec<Wiki>, i64)> {
        let (total,): (i64,) = count_query(&query)
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count records")?;

        let rows: Vec<WikiRow> = list_query(&query)
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list records")?;

        Ok((rows.into_iter().map(Wiki::from).collect(), total))
    }

    async fn get_by_id(&self, id: WikiId) -> Result<Option<Wiki>> {
        let row: Option<WikiRow> =
            sqlx::query_as(&format!("SELECT {WIKI_COLUMNS} FROM wikis WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load record by id")?;
        Ok(row.map(Wiki::from))
    }

    async fn get_by_code(&self, wiki_type: &str, code: &str) -> Result<Option<Wiki>> {
        let row: Option<WikiRow> = sqlx::query_as(&format!(
            "SELECT {WIKI_COLUMNS} FROM wikis WHERE type = $1 AND code = $2 ORDER BY id LIMIT 1"
        ))
        .bind(wiki_type)
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load record by code")?;
        Ok(row.map(Wiki::from))
    }

    async fn update(&self, record: &Wiki) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE wikis SET
                type = $2, code = $3, public = $4, image_wiki = $5,
                created_by = $6, updated_at = $7, translations = $8
             WHERE id = $1",
        )
        .bind(record.id)
        .bind(&record.wiki_type)
        .bind(&record.code)
        .bind(record.public)
        .bind(&record.image_wiki)
        .bind(&record.created_by)
        .bind(record.updated_at)
        .bind(Json(&record.translation))
        .execute(&self.pool)
        .await
        .context("Failed to update record")?;
        Ok(result.rows_affected() > 0)
    }
}
