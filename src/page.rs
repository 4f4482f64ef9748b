use serde::Serialize;
use time::OffsetDateTime;

use crate::model::{Page, PageKind};

/// Markup that has already been rendered and escaped.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct Html(pub String);

impl Html {
    pub fn push(&mut self, other: Html) {
        self.0.push_str(&other.0);
    }
}

/// A page as the admin API and templates see it.
#[derive(Serialize, Clone, Debug)]
pub struct PageView {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub kind: PageKind,
    pub slug: String,
    pub url: String,
    pub title: String,
    pub seo_title: Option<String>,
    pub search_description: String,
    pub live: bool,
    pub show_in_menus: bool,
    #[serde(with = "time::serde::iso8601::option")]
    pub first_published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::iso8601::option")]
    pub last_published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::iso8601::option")]
    pub latest_revision_created_at: Option<OffsetDateTime>,
    pub tags: Vec<String>,
    pub article_type: Option<String>,
}

impl From<&Page> for PageView {
    fn from(page: &Page) -> Self {
        PageView {
            id: page.id,
            parent_id: page.parent_id,
            kind: page.kind(),
            slug: page.slug.clone(),
            url: page.url_path.clone(),
            title: page.title.clone(),
            seo_title: page.seo_title.clone(),
            search_description: page.search_description.clone(),
            live: page.live,
            show_in_menus: page.show_in_menus,
            first_published_at: page.timeline.first_published_at,
            last_published_at: page.timeline.last_published_at,
            latest_revision_created_at: page.timeline.latest_revision_created_at,
            tags: page.tags.clone(),
            article_type: page
                .article_type
                .as_ref()
                .map(|article_type| article_type.slug.clone()),
        }
    }
}
