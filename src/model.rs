use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::blocks::{BlockKind, StreamField};
use crate::error::ContentError;
use crate::publication::Timeline;
use crate::richtext::{LinkResolver, RichText};

pub mod database;
pub mod network;

pub const TAGLINE_MAX_LEN: usize = 255;

/// Who is looking at a page. Authenticated viewers see drafts and non-live pages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewer {
    pub authenticated: bool,
}

impl Viewer {
    pub const ANONYMOUS: Viewer = Viewer {
        authenticated: false,
    };
    pub const EDITOR: Viewer = Viewer {
        authenticated: true,
    };
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Home,
    Basic,
    SplitView,
    Article,
    PostGroup,
    PostSeries,
}

impl PageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PageKind::Home => "home",
            PageKind::Basic => "basic",
            PageKind::SplitView => "split_view",
            PageKind::Article => "article",
            PageKind::PostGroup => "post_group",
            PageKind::PostSeries => "post_series",
        }
    }

    pub fn verbose_name(self) -> &'static str {
        match self {
            PageKind::Home => "home page",
            PageKind::Basic => "basic page",
            PageKind::SplitView => "split-view page",
            PageKind::Article => "article",
            PageKind::PostGroup => "post listing",
            PageKind::PostSeries => "post series",
        }
    }

    pub fn template(self) -> &'static str {
        match self {
            PageKind::Home => "home_page.html",
            PageKind::Basic => "basic_page.html",
            PageKind::SplitView => "split_view.html",
            PageKind::Article => "article.html",
            PageKind::PostGroup => "post_listing.html",
            PageKind::PostSeries => "post_series.html",
        }
    }

    pub fn allowed_children(self) -> &'static [PageKind] {
        match self {
            PageKind::Home => &[
                PageKind::Basic,
                PageKind::SplitView,
                PageKind::PostGroup,
                PageKind::Article,
            ],
            PageKind::Basic => &[PageKind::Basic, PageKind::SplitView],
            PageKind::PostGroup => &[PageKind::Article, PageKind::PostSeries],
            PageKind::PostSeries => &[PageKind::Article],
            PageKind::SplitView | PageKind::Article => &[],
        }
    }

    pub fn is_taggable(self) -> bool {
        self == PageKind::Article
    }

    /// Checks where a page of this kind may be created in the tree.
    pub fn check_placement(self, parent: Option<PageKind>) -> Result<(), ContentError> {
        match (self, parent) {
            (PageKind::Home, None) => Ok(()),
            (_, Some(parent)) if !parent.allowed_children().contains(&self) => {
                Err(ContentError::DisallowedChild {
                    parent: parent.verbose_name(),
                    child: self.verbose_name(),
                })
            }
            (_, Some(_)) => Ok(()),
            (_, None) => Err(ContentError::MissingParent(self.verbose_name())),
        }
    }
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind-specific fields of a page, stored as JSON next to the common columns.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageBody {
    Home {
        #[serde(default)]
        top_content: StreamField,
        #[serde(default)]
        bottom_content: StreamField,
    },
    Basic {
        #[serde(default)]
        content: StreamField,
    },
    SplitView {
        #[serde(default)]
        content: StreamField,
    },
    Article {
        #[serde(default)]
        tagline: String,
        #[serde(default)]
        summary: RichText,
        #[serde(default)]
        content: StreamField,
    },
    PostGroup {
        #[serde(default)]
        intro: RichText,
    },
    PostSeries {
        #[serde(default)]
        introduction: StreamField,
    },
}

const HOME_BLOCKS: &[BlockKind] = &[
    BlockKind::RichText,
    BlockKind::WrappedImage,
    BlockKind::IconLinkLists,
];
const BASIC_BLOCKS: &[BlockKind] = &[
    BlockKind::RichText,
    BlockKind::Code,
    BlockKind::Image,
    BlockKind::Section,
];
const SPLIT_VIEW_BLOCKS: &[BlockKind] = &[
    BlockKind::RichText,
    BlockKind::Code,
    BlockKind::WrappedImage,
    BlockKind::IconLinkLists,
];
const ARTICLE_BLOCKS: &[BlockKind] = &[BlockKind::RichText, BlockKind::Code, BlockKind::Image];
const SERIES_BLOCKS: &[BlockKind] = &[BlockKind::RichText, BlockKind::WrappedImage];

impl PageBody {
    pub fn kind(&self) -> PageKind {
        match self {
            PageBody::Home { .. } => PageKind::Home,
            PageBody::Basic { .. } => PageKind::Basic,
            PageBody::SplitView { .. } => PageKind::SplitView,
            PageBody::Article { .. } => PageKind::Article,
            PageBody::PostGroup { .. } => PageKind::PostGroup,
            PageBody::PostSeries { .. } => PageKind::PostSeries,
        }
    }

    /// Every stream on the page with its field name and the blocks it accepts.
    pub fn streams(&self) -> Vec<(&'static str, &StreamField, &'static [BlockKind])> {
        match self {
            PageBody::Home {
                top_content,
                bottom_content,
            } => vec![
                ("top_content", top_content, HOME_BLOCKS),
                ("bottom_content", bottom_content, HOME_BLOCKS),
            ],
            PageBody::Basic { content } => vec![("content", content, BASIC_BLOCKS)],
            PageBody::SplitView { content } => vec![("content", content, SPLIT_VIEW_BLOCKS)],
            PageBody::Article { content, .. } => vec![("content", content, ARTICLE_BLOCKS)],
            PageBody::PostGroup { .. } => Vec::new(),
            PageBody::PostSeries { introduction } => {
                vec![("introduction", introduction, SERIES_BLOCKS)]
            }
        }
    }

    pub fn validate(&self) -> Result<(), ContentError> {
        if let PageBody::Article { tagline, .. } = self {
            if tagline.chars().count() > TAGLINE_MAX_LEN {
                return Err(ContentError::TaglineTooLong {
                    max: TAGLINE_MAX_LEN,
                });
            }
        }

        for (field, stream, allowed) in self.streams() {
            stream.validate(field, allowed)?;
        }

        Ok(())
    }

    /// Searchable text of the body, without markup.
    pub fn plain_text(&self) -> String {
        let mut text = Vec::new();
        match self {
            PageBody::Article {
                tagline, summary, ..
            } => {
                text.push(tagline.clone());
                text.push(summary.plain_text());
            }
            PageBody::PostGroup { intro } => text.push(intro.plain_text()),
            _ => {}
        }
        for (_, stream, _) in self.streams() {
            text.push(stream.plain_text());
        }
        text.retain(|chunk| !chunk.is_empty());
        text.join(" ")
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct ArticleType {
    pub id: i64,
    pub name: String,
    pub plural_name: String,
    pub slug: String,
    pub description: String,
}

impl ArticleType {
    pub fn name_plural(&self) -> String {
        if self.plural_name.is_empty() {
            format!("{}s", self.name)
        } else {
            self.plural_name.clone()
        }
    }

    /// "a guide", "an article"
    pub fn indefinite_article(&self) -> String {
        let name = self.name.to_lowercase();
        let article = match name.chars().next() {
            Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
            _ => "a",
        };
        format!("{} {}", article, name)
    }

    pub fn label(&self) -> ArticleTypeLabel {
        ArticleTypeLabel {
            name: self.name.clone(),
            name_plural: self.name_plural(),
            indefinite_article: self.indefinite_article(),
            slug: self.slug.clone(),
        }
    }
}

impl std::fmt::Display for ArticleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ArticleTypeLabel {
    pub name: String,
    pub name_plural: String,
    pub indefinite_article: String,
    pub slug: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub slug: String,
    pub url_path: String,
    pub title: String,
    pub seo_title: Option<String>,
    pub search_description: String,
    pub show_in_menus: bool,
    pub live: bool,
    pub timeline: Timeline,
    pub body: PageBody,
    pub tags: Vec<String>,
    pub article_type: Option<ArticleType>,
}

impl Page {
    pub fn kind(&self) -> PageKind {
        self.body.kind()
    }

    pub fn display_title(&self) -> &str {
        self.seo_title
            .as_deref()
            .filter(|title| !title.is_empty())
            .unwrap_or(&self.title)
    }

    /// The page as its latest revision would show it.
    pub fn with_form(
        &self,
        form: &network::PageForm,
        article_type: Option<ArticleType>,
    ) -> Page {
        Page {
            title: form.title.clone(),
            seo_title: form.seo_title.clone(),
            search_description: form.search_description.clone(),
            show_in_menus: form.show_in_menus,
            body: form.body.clone(),
            tags: form.normalized_tags(),
            article_type,
            ..self.clone()
        }
    }
}

/// All pages of the site in tree order, with the lookups the views need.
#[derive(Debug, Default)]
pub struct SiteTree {
    pages: Vec<Page>,
    by_id: HashMap<i64, usize>,
}

impl SiteTree {
    pub fn new(pages: Vec<Page>) -> Self {
        let by_id = pages
            .iter()
            .enumerate()
            .map(|(index, page)| (page.id, index))
            .collect();
        SiteTree { pages, by_id }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn get(&self, id: i64) -> Option<&Page> {
        self.by_id.get(&id).map(|&index| &self.pages[index])
    }

    pub fn root(&self) -> Option<&Page> {
        self.pages.iter().find(|page| page.parent_id.is_none())
    }

    pub fn by_path(&self, path: &str) -> Option<&Page> {
        self.pages.iter().find(|page| page.url_path == path)
    }

    pub fn children(&self, id: i64) -> Vec<&Page> {
        self.pages
            .iter()
            .filter(|page| page.parent_id == Some(id))
            .collect()
    }

    pub fn children_of_kind(&self, id: i64, kind: PageKind) -> Vec<&Page> {
        self.children(id)
            .into_iter()
            .filter(|page| page.kind() == kind)
            .collect()
    }

    pub fn of_kind(&self, kind: PageKind) -> Vec<&Page> {
        self.pages
            .iter()
            .filter(|page| page.kind() == kind)
            .collect()
    }
}

impl LinkResolver for SiteTree {
    fn resolve(&self, slug: &str) -> Option<String> {
        self.pages
            .iter()
            .find(|page| page.slug == slug)
            .map(|page| page.url_path.clone())
    }
}

pub fn child_url_path(parent: Option<&Page>, slug: &str) -> String {
    match parent {
        Some(parent) => format!("{}{}/", parent.url_path, slug),
        None => String::from("/"),
    }
}

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}
