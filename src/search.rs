use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::model::{Page, SiteTree, Viewer};
use crate::publication::{live_for_user, page_preview, PagePreview};
use crate::richtext::RenderContext;

const TITLE_WEIGHT: usize = 3;

#[derive(Deserialize, Debug, Default)]
pub struct SearchParams {
    pub query: Option<String>,
    pub tags: Option<String>,
    #[serde(rename = "type")]
    pub page_type: Option<String>,
}

fn split_list(list: Option<&str>) -> Vec<String> {
    list.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

impl SearchParams {
    /// The query, if it has at least one searchable term.
    pub fn query(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|query| !terms(query).is_empty())
    }

    pub fn tags(&self) -> Vec<String> {
        split_list(self.tags.as_deref())
    }

    pub fn page_types(&self) -> Vec<String> {
        split_list(self.page_type.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.query().is_none() && self.tags().is_empty() && self.page_types().is_empty()
    }
}

pub fn terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|term| {
            term.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|term| !term.is_empty())
        .collect()
}

/// Lowercased searchable text of a page.
#[derive(Debug)]
pub struct SearchDocument {
    title: String,
    body: String,
}

impl SearchDocument {
    pub fn for_page(page: &Page) -> Self {
        let mut body = vec![page.search_description.clone(), page.body.plain_text()];
        body.extend(page.tags.iter().cloned());
        if let Some(article_type) = &page.article_type {
            body.push(article_type.name.clone());
        }

        let mut title = page.title.clone();
        if let Some(seo_title) = &page.seo_title {
            title.push(' ');
            title.push_str(seo_title);
        }

        SearchDocument {
            title: title.to_lowercase(),
            body: body.join(" ").to_lowercase(),
        }
    }

    /// Weighted hit count, or `None` unless every term appears somewhere.
    pub fn score(&self, terms: &[String]) -> Option<usize> {
        let mut score = 0;
        for term in terms {
            let in_title = self.title.matches(term.as_str()).count();
            let in_body = self.body.matches(term.as_str()).count();
            if in_title + in_body == 0 {
                return None;
            }
            score += in_title * TITLE_WEIGHT + in_body;
        }
        Some(score)
    }
}

/// Pages carrying every one of the tags. Pages that can't be tagged never match.
pub fn filter_by_tags<'a>(pages: Vec<&'a Page>, tags: &[String]) -> Vec<&'a Page> {
    pages
        .into_iter()
        .filter(|page| page.kind().is_taggable())
        .filter(|page| tags.iter().all(|tag| page.tags.contains(tag)))
        .collect()
}

/// Pages whose article type is any of the given slugs.
pub fn filter_by_type<'a>(pages: Vec<&'a Page>, slugs: &[String]) -> Vec<&'a Page> {
    pages
        .into_iter()
        .filter(|page| {
            page.article_type
                .as_ref()
                .is_some_and(|article_type| slugs.contains(&article_type.slug))
        })
        .collect()
}

#[derive(Serialize, Debug)]
pub struct SearchResults {
    pub query: Option<String>,
    pub tags: Vec<String>,
    pub page_types: Vec<String>,
    pub pages: Vec<PagePreview>,
}

pub fn search(tree: &SiteTree, params: &SearchParams, viewer: Viewer, now: OffsetDateTime) -> SearchResults {
    let mut pages = live_for_user(tree.pages(), viewer);

    let query = params.query();
    if let Some(query) = query {
        let terms = terms(query);
        let mut scored: Vec<(usize, &Page)> = pages
            .into_iter()
            .filter_map(|page| {
                SearchDocument::for_page(page)
                    .score(&terms)
                    .map(|score| (score, page))
            })
            .collect();
        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score.cmp(a_score).then_with(|| {
                b.timeline
                    .effective_date(now)
                    .cmp(&a.timeline.effective_date(now))
            })
        });
        pages = scored.into_iter().map(|(_, page)| page).collect();
    }

    let tags = params.tags();
    if !tags.is_empty() {
        pages = filter_by_tags(pages, &tags);
    }

    let page_types = params.page_types();
    if !page_types.is_empty() {
        pages = filter_by_type(pages, &page_types);
    }

    if params.is_empty() {
        pages.clear();
    }

    tracing::debug!(query = ?query, tags = ?tags, results = pages.len(), "search");

    let mut ctx = RenderContext::new(tree);
    SearchResults {
        query: query.map(String::from),
        tags,
        page_types,
        pages: pages
            .into_iter()
            .map(|page| page_preview(tree, page, viewer, now, &mut ctx))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::blocks::StreamField;
    use crate::model::{ArticleType, PageBody};
    use crate::publication::Timeline;
    use crate::richtext::RichText;

    const NOW: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

    fn page(id: i64, title: &str, body: PageBody, tags: &[&str], live: bool) -> Page {
        Page {
            id,
            parent_id: Some(1),
            slug: slug::slugify(title),
            url_path: format!("/{}/", slug::slugify(title)),
            title: title.to_string(),
            seo_title: None,
            search_description: String::new(),
            show_in_menus: false,
            live,
            timeline: Timeline {
                first_published_at: Some(datetime!(2024-01-01 0:00 UTC)),
                last_published_at: Some(datetime!(2024-01-01 0:00 UTC) + time::Duration::days(id)),
                latest_revision_created_at: None,
            },
            body,
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            article_type: None,
        }
    }

    fn article(summary: &str) -> PageBody {
        PageBody::Article {
            tagline: String::new(),
            summary: RichText::new(summary),
            content: StreamField::default(),
        }
    }

    fn tree() -> SiteTree {
        let mut guide = page(4, "Borrowing guide", article("lifetimes explained"), &["rust"], true);
        guide.article_type = Some(ArticleType {
            id: 1,
            name: String::from("Guide"),
            plural_name: String::new(),
            slug: String::from("guide"),
            description: String::new(),
        });
        SiteTree::new(vec![
            page(2, "Async Rust", article("tokio and futures"), &["rust", "async"], true),
            page(3, "Gardening", article("tomatoes and rust fungus"), &["garden"], true),
            guide,
            page(5, "Secret rust plans", article("draft"), &["rust"], false),
            page(6, "About", PageBody::Basic { content: StreamField::default() }, &[], true),
        ])
    }

    fn ids(results: &SearchResults) -> Vec<i64> {
        results.pages.iter().map(|page| page.id).collect()
    }

    fn params(query: Option<&str>, tags: Option<&str>) -> SearchParams {
        SearchParams {
            query: query.map(String::from),
            tags: tags.map(String::from),
            page_type: None,
        }
    }

    #[test]
    fn nothing_requested_finds_nothing() {
        let results = search(&tree(), &params(Some("  "), Some(" , ")), Viewer::ANONYMOUS, NOW);
        assert!(results.pages.is_empty());
        assert_eq!(results.query, None);
    }

    #[test]
    fn title_hits_rank_first() {
        let results = search(&tree(), &params(Some("Rust"), None), Viewer::ANONYMOUS, NOW);
        assert_eq!(ids(&results), vec![2, 4, 3]);
    }

    #[test]
    fn every_term_must_match() {
        let results = search(&tree(), &params(Some("rust tokio"), None), Viewer::ANONYMOUS, NOW);
        assert_eq!(ids(&results), vec![2]);
    }

    #[test]
    fn editors_find_unpublished_pages() {
        let results = search(&tree(), &params(Some("secret"), None), Viewer::EDITOR, NOW);
        assert_eq!(ids(&results), vec![5]);
        let results = search(&tree(), &params(Some("secret"), None), Viewer::ANONYMOUS, NOW);
        assert!(results.pages.is_empty());
    }

    #[test]
    fn tags_must_all_be_present() {
        let results = search(&tree(), &params(None, Some("rust, async")), Viewer::ANONYMOUS, NOW);
        assert_eq!(ids(&results), vec![2]);
        assert_eq!(results.tags, vec!["rust", "async"]);
    }

    #[test]
    fn tags_narrow_query_results() {
        let results = search(&tree(), &params(Some("rust"), Some("garden")), Viewer::ANONYMOUS, NOW);
        assert_eq!(ids(&results), vec![3]);
    }

    #[test]
    fn article_type_filter() {
        let params = SearchParams {
            query: None,
            tags: None,
            page_type: Some(String::from("guide")),
        };
        let results = search(&tree(), &params, Viewer::ANONYMOUS, NOW);
        assert_eq!(ids(&results), vec![4]);
    }

    #[test]
    fn query_without_terms_finds_nothing() {
        let results = search(&tree(), &params(Some("!!! ?"), None), Viewer::EDITOR, NOW);
        assert!(results.pages.is_empty());
        assert_eq!(results.query, None);

        let results = search(&tree(), &params(Some("--"), Some("garden")), Viewer::ANONYMOUS, NOW);
        assert_eq!(ids(&results), vec![3]);
    }

    #[test]
    fn terms_strip_punctuation() {
        assert_eq!(terms("Hello, world! (rust)"), vec!["hello", "world", "rust"]);
    }
}
