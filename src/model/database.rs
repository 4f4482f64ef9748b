use std::{path::Path, str::FromStr};

use futures_util::TryStreamExt;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    types::Json,
    SqliteConnection, SqlitePool,
};
use time::OffsetDateTime;

use crate::error::{ApiError, ContentError};
use crate::model::{child_url_path, network::PageForm, ArticleType, Page, PageBody, SiteTree};
use crate::publication::Timeline;

const SCHEMA: &str = include_str!("../../schema.sql");

pub async fn connect(sqlite_file: &Path) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(sqlite_file)
        .create_if_missing(true)
        .foreign_keys(true);
    SqlitePoolOptions::new().connect_with(options).await
}

/// A private in-memory database. One connection, so every query sees the same data.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

pub async fn bootstrap(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
pub struct DbPage {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub slug: String,
    pub url_path: String,
    pub title: String,
    pub seo_title: Option<String>,
    pub search_description: String,
    pub show_in_menus: bool,
    pub live: bool,
    pub first_published_at: Option<OffsetDateTime>,
    pub last_published_at: Option<OffsetDateTime>,
    pub latest_revision_created_at: Option<OffsetDateTime>,
    pub body: Json<PageBody>,
    pub tags: Option<String>,
    pub article_type_id: Option<i64>,
    pub article_type_name: Option<String>,
    pub article_type_plural_name: Option<String>,
    pub article_type_slug: Option<String>,
    pub article_type_description: Option<String>,
}

const TAG_SEPARATOR: char = '\u{1f}';

const PAGE_SELECT: &str = "
    select p.id, p.parent_id, p.slug, p.url_path, p.title, p.seo_title, p.search_description,
        p.show_in_menus, p.live, p.first_published_at, p.last_published_at,
        p.latest_revision_created_at, p.body,
        (select group_concat(t.name, char(31))
            from page_tags pt join tags t on t.id = pt.tag_id
            where pt.page_id = p.id) as tags,
        aty.id as article_type_id, aty.name as article_type_name,
        aty.plural_name as article_type_plural_name, aty.slug as article_type_slug,
        aty.description as article_type_description
    from pages p
    left join article_types aty on aty.id = p.article_type_id
    order by p.sort_order, p.id";

impl DbPage {
    pub fn into_page(self) -> Page {
        let mut tags: Vec<String> = self
            .tags
            .as_deref()
            .unwrap_or("")
            .split(TAG_SEPARATOR)
            .filter(|tag| !tag.is_empty())
            .map(String::from)
            .collect();
        tags.sort();

        let article_type = match (self.article_type_id, self.article_type_name, self.article_type_slug) {
            (Some(id), Some(name), Some(slug)) => Some(ArticleType {
                id,
                name,
                plural_name: self.article_type_plural_name.unwrap_or_default(),
                slug,
                description: self.article_type_description.unwrap_or_default(),
            }),
            _ => None,
        };

        Page {
            id: self.id,
            parent_id: self.parent_id,
            slug: self.slug,
            url_path: self.url_path,
            title: self.title,
            seo_title: self.seo_title,
            search_description: self.search_description,
            show_in_menus: self.show_in_menus,
            live: self.live,
            timeline: Timeline {
                first_published_at: self.first_published_at,
                last_published_at: self.last_published_at,
                latest_revision_created_at: self.latest_revision_created_at,
            },
            body: self.body.0,
            tags,
            article_type,
        }
    }
}

pub async fn load_tree(pool: &SqlitePool) -> Result<SiteTree, sqlx::Error> {
    let mut pages = Vec::new();
    let mut stream = sqlx::query_as::<_, DbPage>(PAGE_SELECT).fetch(pool);
    while let Some(row) = stream.try_next().await? {
        pages.push(row.into_page());
    }
    Ok(SiteTree::new(pages))
}

#[derive(Debug, sqlx::FromRow)]
pub struct DbRevision {
    pub id: i64,
    pub page_id: i64,
    pub created_at: OffsetDateTime,
    pub form: Json<PageForm>,
}

pub async fn latest_revision(
    pool: &SqlitePool,
    page_id: i64,
) -> Result<Option<DbRevision>, sqlx::Error> {
    sqlx::query_as::<_, DbRevision>(
        "select id, page_id, created_at, form from revisions where page_id = ? order by id desc limit 1",
    )
    .bind(page_id)
    .fetch_optional(pool)
    .await
}

/// A LIKE pattern matching `search` literally anywhere in the column.
fn contains_pattern(search: &str) -> String {
    let mut pattern = String::from("%");
    for c in search.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub async fn article_types(
    pool: &SqlitePool,
    search: Option<&str>,
) -> Result<Vec<ArticleType>, sqlx::Error> {
    let pattern = contains_pattern(search.unwrap_or(""));
    sqlx::query_as::<_, ArticleType>(
        r"select id, name, plural_name, slug, description from article_types
        where name like ?1 escape '\' or slug like ?1 escape '\' order by name",
    )
    .bind(pattern)
    .fetch_all(pool)
    .await
}

pub async fn article_type_by_slug(
    pool: &SqlitePool,
    slug: &str,
) -> Result<Option<ArticleType>, sqlx::Error> {
    sqlx::query_as::<_, ArticleType>(
        "select id, name, plural_name, slug, description from article_types where slug = ?",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
}

pub async fn insert_article_type(
    pool: &SqlitePool,
    name: &str,
    plural_name: &str,
    slug: &str,
    description: &str,
) -> Result<ArticleType, ApiError> {
    let existing: Option<i64> =
        sqlx::query_scalar("select id from article_types where name = ? or slug = ?")
            .bind(name)
            .bind(slug)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Err(ContentError::DuplicateArticleType(name.to_string()).into());
    }

    let article_type = sqlx::query_as::<_, ArticleType>(
        "insert into article_types (name, plural_name, slug, description) values (?, ?, ?, ?)
        returning id, name, plural_name, slug, description",
    )
    .bind(name)
    .bind(plural_name)
    .bind(slug)
    .bind(description)
    .fetch_one(pool)
    .await?;
    Ok(article_type)
}

async fn resolve_article_type(
    conn: &mut SqliteConnection,
    form: &PageForm,
) -> Result<Option<i64>, ApiError> {
    let Some(slug) = form.article_type_slug() else {
        return Ok(None);
    };
    let id: Option<i64> = sqlx::query_scalar("select id from article_types where slug = ?")
        .bind(slug)
        .fetch_optional(&mut *conn)
        .await?;
    match id {
        Some(id) => Ok(Some(id)),
        None => Err(ContentError::UnknownArticleType(slug.to_string()).into()),
    }
}

async fn set_tags(conn: &mut SqliteConnection, page_id: i64, tags: &[String]) -> Result<(), sqlx::Error> {
    sqlx::query("delete from page_tags where page_id = ?")
        .bind(page_id)
        .execute(&mut *conn)
        .await?;
    for tag in tags {
        sqlx::query("insert or ignore into tags (name) values (?)")
            .bind(tag)
            .execute(&mut *conn)
            .await?;
        sqlx::query("insert into page_tags (page_id, tag_id) select ?, id from tags where name = ?")
            .bind(page_id)
            .bind(tag)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn sibling_has_slug(
    conn: &mut SqliteConnection,
    parent_id: Option<i64>,
    slug: &str,
    except: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar(
        "select id from pages where parent_id is ? and slug = ? and id is not ?",
    )
    .bind(parent_id)
    .bind(slug)
    .bind(except)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

async fn insert_revision(
    conn: &mut SqliteConnection,
    page_id: i64,
    form: &PageForm,
    now: OffsetDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("insert into revisions (page_id, created_at, form) values (?, ?, ?)")
        .bind(page_id)
        .bind(now)
        .bind(Json(form))
        .execute(&mut *conn)
        .await?;
    sqlx::query("update pages set latest_revision_created_at = ? where id = ?")
        .bind(now)
        .bind(page_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Writes a form's fields into the page row, moving descendants along if the slug changed.
async fn apply_form(
    conn: &mut SqliteConnection,
    tree: &SiteTree,
    page: &Page,
    form: &PageForm,
) -> Result<(), ApiError> {
    let slug = form.slug();
    if slug != page.slug && sibling_has_slug(conn, page.parent_id, &slug, Some(page.id)).await? {
        return Err(ContentError::DuplicateSlug(slug).into());
    }
    let parent = page.parent_id.and_then(|id| tree.get(id));
    let url_path = child_url_path(parent, &slug);
    let article_type_id = resolve_article_type(conn, form).await?;

    sqlx::query(
        "update pages set slug = ?, title = ?, seo_title = ?, search_description = ?,
            show_in_menus = ?, body = ?, article_type_id = ?
        where id = ?",
    )
    .bind(&slug)
    .bind(form.title.trim())
    .bind(form.seo_title.as_deref().map(str::trim).filter(|title| !title.is_empty()))
    .bind(&form.search_description)
    .bind(form.show_in_menus)
    .bind(Json(&form.body))
    .bind(article_type_id)
    .bind(page.id)
    .execute(&mut *conn)
    .await?;

    if url_path != page.url_path {
        sqlx::query(
            "update pages set url_path = ?1 || substr(url_path, length(?2) + 1)
            where url_path like ?2 || '%'",
        )
        .bind(&url_path)
        .bind(&page.url_path)
        .execute(&mut *conn)
        .await?;
    }

    set_tags(conn, page.id, &form.normalized_tags()).await?;
    Ok(())
}

fn check_kind(page: &Page, form: &PageForm) -> Result<(), ContentError> {
    let (from, to) = (page.kind(), form.body.kind());
    if from != to {
        return Err(ContentError::KindChanged {
            from: from.verbose_name(),
            to: to.verbose_name(),
        });
    }
    Ok(())
}

/// Creates an unpublished page with its first revision. Returns the new id.
pub async fn create_page(
    pool: &SqlitePool,
    tree: &SiteTree,
    parent: Option<&Page>,
    form: &PageForm,
    now: OffsetDateTime,
) -> Result<i64, ApiError> {
    form.validate()?;
    let kind = form.body.kind();
    kind.check_placement(parent.map(Page::kind))?;
    if parent.is_none() && tree.root().is_some() {
        return Err(ContentError::DuplicateRoot.into());
    }

    let mut tx = pool.begin().await?;

    let slug = form.slug();
    let parent_id = parent.map(|parent| parent.id);
    if sibling_has_slug(&mut *tx, parent_id, &slug, None).await? {
        return Err(ContentError::DuplicateSlug(slug).into());
    }
    let article_type_id = resolve_article_type(&mut *tx, form).await?;

    let sort_order: i64 =
        sqlx::query_scalar("select coalesce(max(sort_order), 0) + 1 from pages where parent_id is ?")
            .bind(parent_id)
            .fetch_one(&mut *tx)
            .await?;

    let id: i64 = sqlx::query_scalar(
        "insert into pages (parent_id, slug, url_path, kind, title, seo_title, search_description,
            show_in_menus, live, article_type_id, sort_order, body)
        values (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
        returning id",
    )
    .bind(parent_id)
    .bind(&slug)
    .bind(child_url_path(parent, &slug))
    .bind(kind.as_str())
    .bind(form.title.trim())
    .bind(form.seo_title.as_deref().map(str::trim).filter(|title| !title.is_empty()))
    .bind(&form.search_description)
    .bind(form.show_in_menus)
    .bind(article_type_id)
    .bind(sort_order)
    .bind(Json(&form.body))
    .fetch_one(&mut *tx)
    .await?;

    set_tags(&mut *tx, id, &form.normalized_tags()).await?;
    insert_revision(&mut *tx, id, form, now).await?;

    tx.commit().await?;
    tracing::info!(id, slug = %slug, kind = %kind, "created page");
    Ok(id)
}

/// Stores a new revision. Pages that were never published show it straight away.
pub async fn save_revision(
    pool: &SqlitePool,
    tree: &SiteTree,
    page: &Page,
    form: &PageForm,
    now: OffsetDateTime,
) -> Result<(), ApiError> {
    form.validate()?;
    check_kind(page, form)?;

    let mut tx = pool.begin().await?;
    if page.timeline.first_published_at.is_none() {
        apply_form(&mut *tx, tree, page, form).await?;
    } else {
        resolve_article_type(&mut *tx, form).await?;
    }
    insert_revision(&mut *tx, page.id, form, now).await?;
    tx.commit().await?;

    tracing::info!(id = page.id, "saved revision");
    Ok(())
}

pub async fn publish(
    pool: &SqlitePool,
    tree: &SiteTree,
    page: &Page,
    now: OffsetDateTime,
) -> Result<(), ApiError> {
    let revision = latest_revision(pool, page.id)
        .await?
        .ok_or(ContentError::NoRevision(page.id))?;
    let form = revision.form.0;
    form.validate()?;
    check_kind(page, &form)?;

    let mut tx = pool.begin().await?;
    apply_form(&mut *tx, tree, page, &form).await?;
    sqlx::query(
        "update pages set live = 1, first_published_at = coalesce(first_published_at, ?1),
            last_published_at = ?1
        where id = ?2",
    )
    .bind(now)
    .bind(page.id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(id = page.id, revision = revision.id, "published page");
    Ok(())
}

pub async fn unpublish(pool: &SqlitePool, page: &Page) -> Result<(), sqlx::Error> {
    sqlx::query("update pages set live = 0 where id = ?")
        .bind(page.id)
        .execute(pool)
        .await?;
    tracing::info!(id = page.id, "unpublished page");
    Ok(())
}
