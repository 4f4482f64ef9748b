use tera::{Context, Tera};
use time::OffsetDateTime;
use url::Url;

use crate::config::Config;
use crate::menu::site_menu;
use crate::model::{Page, PageBody, SiteTree, Viewer};
use crate::page::PageView;
use crate::publication::{
    child_posts_by_year, page_preview, preview_fields, publication_data, recent_posts,
    series_parts,
};
use crate::richtext::{RenderContext, ValidateError};
use crate::search::SearchResults;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("tags/site_menu.html", include_str!("../templates/tags/site_menu.html")),
    ("includes/publication.html", include_str!("../templates/includes/publication.html")),
    ("includes/tags.html", include_str!("../templates/includes/tags.html")),
    ("includes/page_preview.html", include_str!("../templates/includes/page_preview.html")),
    ("home_page.html", include_str!("../templates/home_page.html")),
    ("basic_page.html", include_str!("../templates/basic_page.html")),
    ("split_view.html", include_str!("../templates/split_view.html")),
    ("article.html", include_str!("../templates/article.html")),
    ("post_listing.html", include_str!("../templates/post_listing.html")),
    ("post_series.html", include_str!("../templates/post_series.html")),
    ("search_results.html", include_str!("../templates/search_results.html")),
];

pub fn templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(TEMPLATES.iter().copied())?;
    tera.autoescape_on(vec![".html"]);
    Ok(tera)
}

/// Site-wide values every template sees.
#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub name: String,
    pub debug: bool,
    pub base_url: Url,
    pub social_image: Option<Url>,
    pub admin_token: Option<String>,
}

impl SiteSettings {
    pub fn from_config(config: &Config) -> Self {
        SiteSettings {
            name: config.site.name.clone(),
            debug: config.site.debug,
            base_url: config.net.proto_host.clone(),
            social_image: config.site.default_social_image.clone(),
            admin_token: config.auth.admin_token.clone(),
        }
    }

    pub fn canonical_url(&self, path: &str) -> String {
        self.base_url
            .join(path)
            .map(String::from)
            .unwrap_or_else(|_| path.to_string())
    }
}

/// Everything needed to turn pages into HTML for one request.
pub struct Renderer<'a> {
    pub tera: &'a Tera,
    pub site: &'a SiteSettings,
    pub tree: &'a SiteTree,
    pub viewer: Viewer,
    pub now: OffsetDateTime,
}

impl Renderer<'_> {
    fn base_context(&self, current: Option<&Page>, path: &str) -> Context {
        let mut context = Context::new();
        context.insert("site_name", &self.site.name);
        context.insert("debug", &self.site.debug);
        context.insert("authenticated", &self.viewer.authenticated);
        context.insert("is_preview", &false);
        context.insert("canonical_url", &self.site.canonical_url(path));
        context.insert(
            "social_image",
            &self.site.social_image.as_ref().map(Url::as_str),
        );
        context.insert("menu", &site_menu(self.tree, self.viewer, current));
        context
    }

    /// The context a page's template renders from.
    pub fn page_context(&self, page: &Page) -> Context {
        let tree = self.tree;
        let mut ctx = RenderContext::new(tree);
        let mut context = self.base_context(Some(page), &page.url_path);
        context.insert("page", &PageView::from(page));
        context.insert(
            "publication",
            &publication_data(tree, page, self.viewer, self.now),
        );
        context.insert(
            "preview",
            &preview_fields(tree, page, self.viewer, self.now, &mut ctx),
        );

        match &page.body {
            PageBody::Home {
                top_content,
                bottom_content,
            } => {
                context.insert("top_content", &top_content.render(&mut ctx));
                context.insert("bottom_content", &bottom_content.render(&mut ctx));
                context.insert("recent_posts", &recent_posts(tree, self.viewer, self.now, &mut ctx));
            }
            PageBody::Basic { content }
            | PageBody::SplitView { content }
            | PageBody::Article { content, .. } => {
                context.insert("content", &content.render(&mut ctx));
            }
            PageBody::PostGroup { intro } => {
                context.insert("intro", &intro.render(&mut ctx));
                context.insert(
                    "posts_by_year",
                    &child_posts_by_year(tree, page, self.viewer, self.now, &mut ctx),
                );
            }
            PageBody::PostSeries { introduction } => {
                context.insert("introduction", &introduction.render(&mut ctx));
                let parts: Vec<_> = series_parts(tree, page, self.viewer, self.now)
                    .into_iter()
                    .map(|part| page_preview(tree, part, self.viewer, self.now, &mut ctx))
                    .collect();
                context.insert("parts", &parts);
            }
        }

        if !ctx.warnings.is_empty() {
            tracing::debug!(page = page.id, warnings = ?ctx.warnings, "rendered with warnings");
        }

        context
    }

    pub fn page(&self, page: &Page) -> Result<String, tera::Error> {
        self.tera
            .render(page.kind().template(), &self.page_context(page))
    }

    /// A page as its latest revision would look, with the preview banner.
    pub fn preview(&self, page: &Page) -> Result<String, tera::Error> {
        let mut context = self.page_context(page);
        context.insert("is_preview", &true);
        self.tera.render(page.kind().template(), &context)
    }

    pub fn search(&self, results: &SearchResults) -> Result<String, tera::Error> {
        let mut context = self.base_context(None, "/search");
        context.insert("query", &results.query);
        context.insert("tags", &results.tags);
        context.insert("page_types", &results.page_types);
        context.insert("pages", &results.pages);
        self.tera.render("search_results.html", &context)
    }
}

/// Warnings the body would produce when rendered into the current site.
pub fn check_body(tree: &SiteTree, body: &PageBody) -> Vec<ValidateError> {
    let mut ctx = RenderContext::new(tree);
    if let PageBody::Article { summary, .. } = body {
        summary.render(&mut ctx);
    }
    if let PageBody::PostGroup { intro } = body {
        intro.render(&mut ctx);
    }
    for (_, stream, _) in body.streams() {
        stream.render(&mut ctx);
    }
    ctx.warnings
}
