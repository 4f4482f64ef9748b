//! Publication and preview data for pages.
//!
//! Listings never show raw timestamps. Each page gets a small summary of when
//! it went out, whether it has changed meaningfully since, and, for editors,
//! whether there is an unpublished draft waiting.

use indexmap::IndexMap;
use serde::Serialize;
use tera::escape_html;
use time::{Duration, OffsetDateTime};

use crate::model::{ArticleTypeLabel, Page, PageBody, PageKind, SiteTree, Viewer};
use crate::page::Html;
use crate::richtext::RenderContext;

/// Edits within this long of first publication don't count as an update.
pub const UPDATE_GRACE: Duration = Duration::weeks(1);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timeline {
    pub first_published_at: Option<OffsetDateTime>,
    pub last_published_at: Option<OffsetDateTime>,
    pub latest_revision_created_at: Option<OffsetDateTime>,
}

impl Timeline {
    pub fn last_edited(&self) -> Option<OffsetDateTime> {
        self.latest_revision_created_at.or(self.last_published_at)
    }

    /// Ordering key for date-sorted queries. Always defined.
    pub fn effective_date(&self, now: OffsetDateTime) -> OffsetDateTime {
        self.last_published_at
            .or(self.latest_revision_created_at)
            .unwrap_or(now)
    }

    /// Ordering key inside listings.
    pub fn list_date(&self, now: OffsetDateTime) -> OffsetDateTime {
        self.first_published_at
            .or_else(|| self.last_edited())
            .unwrap_or(now)
    }

    pub fn year(&self, now: OffsetDateTime) -> i32 {
        self.list_date(now).year()
    }

    pub fn updated(&self) -> Option<OffsetDateTime> {
        match (self.first_published_at, self.last_published_at) {
            (Some(published), Some(updated)) if updated >= published + UPDATE_GRACE => {
                Some(updated)
            }
            _ => None,
        }
    }

    /// Last edit time, when it is newer than anything published.
    pub fn pending_draft(&self) -> Option<OffsetDateTime> {
        let last_edited = self.last_edited()?;
        match (self.first_published_at, self.last_published_at) {
            (None, _) => Some(last_edited),
            (Some(_), Some(updated)) if last_edited > updated => Some(last_edited),
            _ => None,
        }
    }
}

/// "3 Jan '25"
pub fn short_date(date: OffsetDateTime) -> String {
    let month = date.month().to_string();
    format!(
        "{} {} '{:02}",
        date.day(),
        &month[..3],
        date.year().rem_euclid(100)
    )
}

pub fn draft_url(page_id: i64) -> String {
    format!("/preview/{}/", page_id)
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PublicationData {
    pub live: bool,
    pub url: String,
    pub published: Option<String>,
    pub updated: Option<String>,
    pub year: i32,
    #[serde(with = "time::serde::iso8601")]
    pub list_date: OffsetDateTime,
    pub latest_draft: Option<String>,
    pub draft_url: Option<String>,
}

impl PublicationData {
    /// Publication data from the page's own timeline.
    pub fn for_page(page: &Page, viewer: Viewer, now: OffsetDateTime) -> Self {
        let timeline = &page.timeline;
        let mut data = PublicationData {
            live: page.live,
            url: page.url_path.clone(),
            published: timeline.first_published_at.map(short_date),
            updated: timeline.updated().map(short_date),
            year: timeline.year(now),
            list_date: timeline.list_date(now),
            latest_draft: None,
            draft_url: None,
        };

        if viewer.authenticated {
            if let Some(last_edited) = timeline.pending_draft() {
                data.latest_draft = Some(short_date(last_edited));
                data.draft_url = Some(draft_url(page.id));
            }
        }

        data
    }

    /// A series is listed by its most recent part.
    fn take_dates_from(&mut self, latest: &PublicationData) {
        self.published = latest.published.clone();
        self.updated = latest.updated.clone();
        self.list_date = latest.list_date;
    }
}

pub fn live_for_user<'a>(pages: impl IntoIterator<Item = &'a Page>, viewer: Viewer) -> Vec<&'a Page> {
    pages
        .into_iter()
        .filter(|page| viewer.authenticated || page.live)
        .collect()
}

/// Pages by descending effective date.
pub fn by_date(mut pages: Vec<&Page>, now: OffsetDateTime) -> Vec<&Page> {
    pages.sort_by(|a, b| {
        b.timeline
            .effective_date(now)
            .cmp(&a.timeline.effective_date(now))
    });
    pages
}

/// Visible parts of a series, latest first.
pub fn series_parts<'a>(tree: &'a SiteTree, series: &Page, viewer: Viewer, now: OffsetDateTime) -> Vec<&'a Page> {
    by_date(
        live_for_user(tree.children_of_kind(series.id, PageKind::Article), viewer),
        now,
    )
}

pub fn publication_data(
    tree: &SiteTree,
    page: &Page,
    viewer: Viewer,
    now: OffsetDateTime,
) -> PublicationData {
    let mut data = PublicationData::for_page(page, viewer, now);

    if page.kind() == PageKind::PostSeries {
        // Parts come newest first; on equal list dates the newest one wins.
        let latest = series_parts(tree, page, viewer, now)
            .into_iter()
            .rev()
            .map(|part| PublicationData::for_page(part, viewer, now))
            .max_by_key(|part| part.list_date);
        if let Some(latest) = latest {
            data.take_dates_from(&latest);
        }
    }

    data
}

#[derive(Serialize, Clone, Debug)]
pub struct PreviewFields {
    pub title: String,
    pub summary: Html,
    pub tagline: Option<String>,
    pub page_type: Option<ArticleTypeLabel>,
    pub tags: Option<Vec<String>>,
    pub parts: Option<Vec<PreviewFields>>,
}

/// Summaries render into `ctx` so their heading ids stay unique on the page
/// that lists them.
pub fn preview_fields(
    tree: &SiteTree,
    page: &Page,
    viewer: Viewer,
    now: OffsetDateTime,
    ctx: &mut RenderContext<'_>,
) -> PreviewFields {
    let mut fields = PreviewFields {
        title: page.display_title().to_string(),
        summary: Html(format!("<p>{}</p>", escape_html(&page.search_description))),
        tagline: None,
        page_type: None,
        tags: None,
        parts: None,
    };

    match &page.body {
        PageBody::Article {
            tagline, summary, ..
        } => {
            fields.summary = summary.render(ctx);
            fields.tagline = Some(tagline.clone());
            fields.page_type = page.article_type.as_ref().map(|article_type| article_type.label());
            fields.tags = Some(page.tags.clone());
        }
        PageBody::PostSeries { .. } => {
            fields.parts = Some(
                series_parts(tree, page, viewer, now)
                    .into_iter()
                    .map(|part| preview_fields(tree, part, viewer, now, ctx))
                    .collect(),
            );
        }
        _ => {}
    }

    fields
}

/// Everything a listing needs to show one page.
#[derive(Serialize, Clone, Debug)]
pub struct PagePreview {
    pub id: i64,
    pub kind: PageKind,
    #[serde(flatten)]
    pub fields: PreviewFields,
    #[serde(flatten)]
    pub publication: PublicationData,
}

pub fn page_preview(
    tree: &SiteTree,
    page: &Page,
    viewer: Viewer,
    now: OffsetDateTime,
    ctx: &mut RenderContext<'_>,
) -> PagePreview {
    PagePreview {
        id: page.id,
        kind: page.kind(),
        fields: preview_fields(tree, page, viewer, now, ctx),
        publication: publication_data(tree, page, viewer, now),
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct YearGroup {
    pub year: i32,
    pub posts: Vec<PagePreview>,
}

/// Groups previews by year, newest list date first, and years in the order
/// their newest post appears.
pub fn posts_by_year(mut previews: Vec<PagePreview>) -> Vec<YearGroup> {
    previews.sort_by(|a, b| b.publication.list_date.cmp(&a.publication.list_date));

    let mut groups: IndexMap<i32, Vec<PagePreview>> = IndexMap::new();
    for preview in previews {
        groups
            .entry(preview.publication.year)
            .or_default()
            .push(preview);
    }

    groups
        .into_iter()
        .map(|(year, posts)| YearGroup { year, posts })
        .collect()
}

/// Children of a listing page visible to the viewer, grouped by year.
pub fn child_posts_by_year(
    tree: &SiteTree,
    parent: &Page,
    viewer: Viewer,
    now: OffsetDateTime,
    ctx: &mut RenderContext<'_>,
) -> Vec<YearGroup> {
    let previews = live_for_user(tree.children(parent.id), viewer)
        .into_iter()
        .map(|child| page_preview(tree, child, viewer, now, ctx))
        .collect();
    posts_by_year(previews)
}

/// Every article the viewer may see, newest first.
pub fn recent_posts(
    tree: &SiteTree,
    viewer: Viewer,
    now: OffsetDateTime,
    ctx: &mut RenderContext<'_>,
) -> Vec<PagePreview> {
    by_date(live_for_user(tree.of_kind(PageKind::Article), viewer), now)
        .into_iter()
        .map(|post| page_preview(tree, post, viewer, now, ctx))
        .collect()
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::blocks::StreamField;
    use crate::richtext::RichText;

    const NOW: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

    fn article(id: i64, parent_id: i64, timeline: Timeline, live: bool) -> Page {
        Page {
            id,
            parent_id: Some(parent_id),
            slug: format!("post-{}", id),
            url_path: format!("/blog/post-{}/", id),
            title: format!("Post {}", id),
            seo_title: None,
            search_description: String::from("about <things>"),
            show_in_menus: false,
            live,
            timeline,
            body: PageBody::Article {
                tagline: String::from("tag"),
                summary: RichText::new("A *summary*"),
                content: StreamField::default(),
            },
            tags: vec![String::from("rust")],
            article_type: None,
        }
    }

    fn published(first: OffsetDateTime, last: OffsetDateTime) -> Timeline {
        Timeline {
            first_published_at: Some(first),
            last_published_at: Some(last),
            latest_revision_created_at: Some(last),
        }
    }

    fn group(id: i64, body: PageBody) -> Page {
        Page {
            id,
            parent_id: Some(1),
            slug: String::from("blog"),
            url_path: String::from("/blog/"),
            title: String::from("Blog"),
            seo_title: Some(String::from("The Blog")),
            search_description: String::new(),
            show_in_menus: true,
            live: true,
            timeline: published(datetime!(2020-01-01 0:00 UTC), datetime!(2020-01-01 0:00 UTC)),
            body,
            tags: Vec::new(),
            article_type: None,
        }
    }

    #[test]
    fn short_date_format() {
        assert_eq!(short_date(datetime!(2025-01-03 10:00 UTC)), "3 Jan '25");
        assert_eq!(short_date(datetime!(2009-11-21 0:00 UTC)), "21 Nov '09");
    }

    #[test]
    fn effective_date_coalesces() {
        let mut timeline = Timeline::default();
        assert_eq!(timeline.effective_date(NOW), NOW);
        timeline.latest_revision_created_at = Some(datetime!(2024-02-02 0:00 UTC));
        assert_eq!(timeline.effective_date(NOW), datetime!(2024-02-02 0:00 UTC));
        timeline.last_published_at = Some(datetime!(2023-03-03 0:00 UTC));
        assert_eq!(timeline.effective_date(NOW), datetime!(2023-03-03 0:00 UTC));
    }

    #[test]
    fn year_falls_back_to_last_edit_then_now() {
        let mut timeline = Timeline::default();
        assert_eq!(timeline.year(NOW), 2025);
        timeline.latest_revision_created_at = Some(datetime!(2022-05-05 0:00 UTC));
        assert_eq!(timeline.year(NOW), 2022);
        timeline.first_published_at = Some(datetime!(2021-05-05 0:00 UTC));
        assert_eq!(timeline.year(NOW), 2021);
    }

    #[test]
    fn updated_needs_a_week() {
        let first = datetime!(2025-01-01 0:00 UTC);
        let page = article(2, 1, published(first, first + Duration::days(6)), true);
        let data = PublicationData::for_page(&page, Viewer::ANONYMOUS, NOW);
        assert_eq!(data.published.as_deref(), Some("1 Jan '25"));
        assert_eq!(data.updated, None);

        let page = article(2, 1, published(first, first + Duration::weeks(1)), true);
        let data = PublicationData::for_page(&page, Viewer::ANONYMOUS, NOW);
        assert_eq!(data.updated.as_deref(), Some("8 Jan '25"));
    }

    #[test]
    fn drafts_only_for_editors_with_newer_revision() {
        let first = datetime!(2025-01-01 0:00 UTC);
        let mut timeline = published(first, first);
        timeline.latest_revision_created_at = Some(datetime!(2025-02-10 0:00 UTC));
        let page = article(7, 1, timeline, true);

        let anonymous = PublicationData::for_page(&page, Viewer::ANONYMOUS, NOW);
        assert_eq!(anonymous.latest_draft, None);
        assert_eq!(anonymous.draft_url, None);

        let editor = PublicationData::for_page(&page, Viewer::EDITOR, NOW);
        assert_eq!(editor.latest_draft.as_deref(), Some("10 Feb '25"));
        assert_eq!(editor.draft_url.as_deref(), Some("/preview/7/"));

        let clean = article(7, 1, published(first, first), true);
        let editor = PublicationData::for_page(&clean, Viewer::EDITOR, NOW);
        assert_eq!(editor.latest_draft, None);
    }

    #[test]
    fn never_published_page_is_a_draft() {
        let timeline = Timeline {
            latest_revision_created_at: Some(datetime!(2024-12-24 0:00 UTC)),
            ..Timeline::default()
        };
        let page = article(3, 1, timeline, false);
        let data = PublicationData::for_page(&page, Viewer::EDITOR, NOW);
        assert_eq!(data.published, None);
        assert_eq!(data.year, 2024);
        assert_eq!(data.list_date, datetime!(2024-12-24 0:00 UTC));
        assert_eq!(data.latest_draft.as_deref(), Some("24 Dec '24"));
    }

    #[test]
    fn posts_group_by_year_newest_first() {
        let blog = group(10, PageBody::PostGroup { intro: RichText::default() });
        let a = article(11, 10, published(datetime!(2023-05-01 0:00 UTC), datetime!(2023-05-01 0:00 UTC)), true);
        let b = article(12, 10, published(datetime!(2024-01-01 0:00 UTC), datetime!(2024-01-01 0:00 UTC)), true);
        let c = article(13, 10, published(datetime!(2024-09-01 0:00 UTC), datetime!(2024-09-01 0:00 UTC)), true);
        let hidden = article(14, 10, Timeline::default(), false);
        let tree = SiteTree::new(vec![blog, a, b, c, hidden]);
        let blog = tree.get(10).unwrap();

        let groups = child_posts_by_year(&tree, blog, Viewer::ANONYMOUS, NOW, &mut RenderContext::new(&tree));
        let shape: Vec<(i32, Vec<i64>)> = groups
            .iter()
            .map(|group| (group.year, group.posts.iter().map(|post| post.id).collect()))
            .collect();
        assert_eq!(shape, vec![(2024, vec![13, 12]), (2023, vec![11])]);

        let groups = child_posts_by_year(&tree, blog, Viewer::EDITOR, NOW, &mut RenderContext::new(&tree));
        assert_eq!(groups[0].year, 2025);
        assert_eq!(groups[0].posts[0].id, 14);
    }

    #[test]
    fn series_takes_dates_from_latest_part() {
        let series = Page {
            id: 20,
            parent_id: Some(10),
            slug: String::from("series"),
            url_path: String::from("/blog/series/"),
            timeline: published(datetime!(2022-01-01 0:00 UTC), datetime!(2022-01-01 0:00 UTC)),
            ..group(20, PageBody::PostSeries { introduction: StreamField::default() })
        };
        let old = article(21, 20, published(datetime!(2023-01-01 0:00 UTC), datetime!(2023-01-01 0:00 UTC)), true);
        let new = article(22, 20, published(datetime!(2024-03-04 0:00 UTC), datetime!(2024-04-04 0:00 UTC)), true);
        let draft = article(23, 20, Timeline { latest_revision_created_at: Some(datetime!(2025-05-05 0:00 UTC)), ..Timeline::default() }, false);
        let tree = SiteTree::new(vec![series, old, new, draft]);
        let series = tree.get(20).unwrap();

        let data = publication_data(&tree, series, Viewer::ANONYMOUS, NOW);
        assert_eq!(data.published.as_deref(), Some("4 Mar '24"));
        assert_eq!(data.updated.as_deref(), Some("4 Apr '24"));
        assert_eq!(data.list_date, datetime!(2024-03-04 0:00 UTC));
        assert_eq!(data.year, 2022);

        let fields = preview_fields(&tree, series, Viewer::ANONYMOUS, NOW, &mut RenderContext::new(&tree));
        let parts: Vec<String> = fields.parts.unwrap().into_iter().map(|part| part.title).collect();
        assert_eq!(parts, vec!["Post 22", "Post 21"]);
    }

    #[test]
    fn preview_fields_by_kind() {
        let blog = group(10, PageBody::PostGroup { intro: RichText::default() });
        let tree = SiteTree::new(vec![blog]);
        let fields = preview_fields(&tree, tree.get(10).unwrap(), Viewer::ANONYMOUS, NOW, &mut RenderContext::new(&tree));
        assert_eq!(fields.title, "The Blog");
        assert!(fields.tagline.is_none());

        let post = article(2, 10, Timeline::default(), true);
        let fields = preview_fields(&tree, &post, Viewer::ANONYMOUS, NOW, &mut RenderContext::new(&tree));
        assert_eq!(fields.title, "Post 2");
        assert!(fields.summary.0.contains("<em>summary</em>"));
        assert_eq!(fields.tags, Some(vec![String::from("rust")]));
    }

    #[test]
    fn base_summary_is_escaped() {
        let mut page = group(10, PageBody::PostGroup { intro: RichText::default() });
        page.search_description = String::from("a <b> c");
        let tree = SiteTree::new(Vec::new());
        let fields = preview_fields(&tree, &page, Viewer::ANONYMOUS, NOW, &mut RenderContext::new(&tree));
        assert_eq!(fields.summary.0, "<p>a &lt;b&gt; c</p>");
    }

    #[test]
    fn recent_posts_order_by_effective_date() {
        let a = article(2, 1, published(datetime!(2020-01-01 0:00 UTC), datetime!(2024-06-01 0:00 UTC)), true);
        let b = article(3, 1, published(datetime!(2023-01-01 0:00 UTC), datetime!(2023-01-01 0:00 UTC)), true);
        let tree = SiteTree::new(vec![a, b]);
        let ids: Vec<i64> = recent_posts(&tree, Viewer::ANONYMOUS, NOW, &mut RenderContext::new(&tree))
            .iter()
            .map(|post| post.id)
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }

    fn series(id: i64, parent_id: i64, timeline: Timeline) -> Page {
        Page {
            id,
            parent_id: Some(parent_id),
            slug: format!("series-{}", id),
            url_path: format!("/blog/series-{}/", id),
            title: format!("Series {}", id),
            seo_title: None,
            timeline,
            ..group(id, PageBody::PostSeries { introduction: StreamField::default() })
        }
    }

    #[test]
    fn series_tie_goes_to_most_recently_published_part() {
        let first = datetime!(2024-01-01 0:00 UTC);
        let series = series(20, 10, published(first, first));
        let plain = article(21, 20, published(first, first), true);
        let republished = article(22, 20, published(first, datetime!(2024-02-01 0:00 UTC)), true);
        let tree = SiteTree::new(vec![series, plain, republished]);

        let data = publication_data(&tree, tree.get(20).unwrap(), Viewer::ANONYMOUS, NOW);
        assert_eq!(data.published.as_deref(), Some("1 Jan '24"));
        assert_eq!(data.updated.as_deref(), Some("1 Feb '24"));
    }

    #[test]
    fn series_without_visible_parts_keeps_its_own_dates() {
        let own = published(datetime!(2022-01-01 0:00 UTC), datetime!(2022-03-01 0:00 UTC));
        let series = series(20, 10, own);
        let hidden = article(21, 20, published(datetime!(2024-05-05 0:00 UTC), datetime!(2024-05-05 0:00 UTC)), false);
        let tree = SiteTree::new(vec![series, hidden]);

        let data = publication_data(&tree, tree.get(20).unwrap(), Viewer::ANONYMOUS, NOW);
        assert_eq!(data.published.as_deref(), Some("1 Jan '22"));
        assert_eq!(data.updated.as_deref(), Some("1 Mar '22"));
        assert_eq!(data.list_date, datetime!(2022-01-01 0:00 UTC));

        let editor = publication_data(&tree, tree.get(20).unwrap(), Viewer::EDITOR, NOW);
        assert_eq!(editor.published.as_deref(), Some("5 May '24"));
    }

    #[test]
    fn listing_mixes_series_and_articles() {
        let blog = group(10, PageBody::PostGroup { intro: RichText::default() });
        let post = article(11, 10, published(datetime!(2024-06-01 0:00 UTC), datetime!(2024-06-01 0:00 UTC)), true);
        let old_series = series(12, 10, published(datetime!(2021-01-01 0:00 UTC), datetime!(2021-01-01 0:00 UTC)));
        let part = article(13, 12, published(datetime!(2024-08-01 0:00 UTC), datetime!(2024-08-01 0:00 UTC)), true);
        let older = article(14, 10, published(datetime!(2023-02-01 0:00 UTC), datetime!(2023-02-01 0:00 UTC)), true);
        let tree = SiteTree::new(vec![blog, post, old_series, part, older]);

        let groups = child_posts_by_year(
            &tree,
            tree.get(10).unwrap(),
            Viewer::ANONYMOUS,
            NOW,
            &mut RenderContext::new(&tree),
        );
        let shape: Vec<(i32, Vec<(i64, PageKind)>)> = groups
            .iter()
            .map(|group| {
                (
                    group.year,
                    group.posts.iter().map(|post| (post.id, post.kind)).collect(),
                )
            })
            .collect();
        assert_eq!(
            shape,
            vec![
                (2021, vec![(12, PageKind::PostSeries)]),
                (2024, vec![(11, PageKind::Article)]),
                (2023, vec![(14, PageKind::Article)]),
            ]
        );
        let parts = groups[0].posts[0].fields.parts.as_ref().unwrap();
        assert_eq!(parts[0].title, "Post 13");
    }

    #[test]
    fn summaries_share_heading_ids() {
        let mut a = article(2, 1, published(datetime!(2024-01-01 0:00 UTC), datetime!(2024-01-01 0:00 UTC)), true);
        let mut b = article(3, 1, published(datetime!(2023-01-01 0:00 UTC), datetime!(2023-01-01 0:00 UTC)), true);
        for page in [&mut a, &mut b] {
            if let PageBody::Article { summary, .. } = &mut page.body {
                *summary = RichText::new("## Notes");
            }
        }
        let tree = SiteTree::new(vec![a, b]);
        let mut ctx = RenderContext::new(&tree);
        ctx.heading_ids.allocate("Notes");

        let posts = recent_posts(&tree, Viewer::ANONYMOUS, NOW, &mut ctx);
        assert!(posts[0].fields.summary.0.contains(r#"id="notes-1""#));
        assert!(posts[1].fields.summary.0.contains(r#"id="notes-2""#));
    }
}
