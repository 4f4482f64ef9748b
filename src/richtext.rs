//! Markdown rich text.
//!
//! Links written as `[text](@slug)` point at other pages and are resolved at
//! render time. Footnote definitions are pulled out of the flow and rendered
//! after the body in reference order. Headings without an explicit id get one
//! derived from their text, unique across everything rendered with the same
//! [`RenderContext`].

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use pulldown_cmark::{BrokenLink, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};

use crate::page::Html;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct RichText(pub String);

/// Problems found while rendering that don't stop the page from being saved.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ValidateError {
    UnknownFootnote(String),
    UnreferencedFootnote(String),
    UnknownLink(String),
}

pub trait LinkResolver {
    /// Site-relative URL of the page with this slug.
    fn resolve(&self, slug: &str) -> Option<String>;
}

impl LinkResolver for HashMap<String, String> {
    fn resolve(&self, slug: &str) -> Option<String> {
        self.get(slug).cloned()
    }
}

const EMPTY_HEADING_ID: &str = "section";

#[derive(Debug, Default)]
pub struct HeadingIds {
    seen: HashSet<String>,
}

impl HeadingIds {
    pub fn allocate(&mut self, text: &str) -> String {
        let mut slug = text.trim().to_lowercase().replace(' ', "-");
        if slug.is_empty() {
            slug = String::from(EMPTY_HEADING_ID);
        }
        let mut id = slug.clone();
        let mut count = 1;
        while self.seen.contains(&id) {
            id = format!("{}-{}", slug, count);
            count += 1;
        }
        self.seen.insert(id.clone());
        id
    }
}

pub struct RenderContext<'a> {
    pub links: &'a dyn LinkResolver,
    pub heading_ids: HeadingIds,
    pub warnings: Vec<ValidateError>,
}

impl<'a> RenderContext<'a> {
    pub fn new(links: &'a dyn LinkResolver) -> Self {
        RenderContext {
            links,
            heading_ids: HeadingIds::default(),
            warnings: Vec::new(),
        }
    }

    /// `@slug` becomes the page's URL, anything else is left alone.
    pub fn resolve_href(&mut self, href: &str) -> String {
        match href.strip_prefix('@') {
            Some(slug) => match self.links.resolve(slug) {
                Some(url) => url,
                None => {
                    self.warnings
                        .push(ValidateError::UnknownLink(slug.to_string()));
                    String::from("#")
                }
            },
            None => href.to_string(),
        }
    }
}

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES
}

fn broken_link<'input>(link: BrokenLink<'input>) -> Option<(CowStr<'input>, CowStr<'input>)> {
    Some((link.reference, CowStr::Borrowed("")))
}

impl RichText {
    pub fn new(markdown: impl Into<String>) -> Self {
        RichText(markdown.into())
    }

    pub fn render(&self, ctx: &mut RenderContext<'_>) -> Html {
        let mut footnote_references = IndexSet::new();
        let mut in_footnotes: Vec<(String, Vec<Event<'_>>)> = Vec::new();
        let mut footnote_events = IndexMap::new();

        let mut events = Vec::new();
        for event in Parser::new_with_broken_link_callback(&self.0, options(), Some(broken_link)) {
            let event = match event {
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    let dest_url = if matches!(
                        link_type,
                        LinkType::CollapsedUnknown
                            | LinkType::ReferenceUnknown
                            | LinkType::ShortcutUnknown
                    ) {
                        ctx.warnings
                            .push(ValidateError::UnknownLink(dest_url.to_string()));
                        CowStr::Borrowed("#")
                    } else {
                        CowStr::from(ctx.resolve_href(&dest_url))
                    };

                    Event::Start(Tag::Link {
                        link_type,
                        dest_url,
                        title,
                        id,
                    })
                }

                Event::FootnoteReference(ref name) => {
                    footnote_references.insert(name.to_string());
                    event
                }

                Event::Start(Tag::FootnoteDefinition(ref name)) => {
                    in_footnotes.push((name.to_string(), vec![event]));
                    continue;
                }

                Event::End(TagEnd::FootnoteDefinition) => {
                    if let Some((name, mut footnote)) = in_footnotes.pop() {
                        footnote.push(event);
                        footnote_events.insert(name, footnote);
                    }
                    continue;
                }

                event => event,
            };

            match in_footnotes.last_mut() {
                Some((_, footnote)) => footnote.push(event),
                None => events.push(event),
            }
        }

        assign_heading_ids(&mut events, &mut ctx.heading_ids);

        let mut trailer = Vec::new();
        for reference in footnote_references {
            match footnote_events.shift_remove(&reference) {
                Some(footnote) => trailer.extend(footnote),
                None => ctx
                    .warnings
                    .push(ValidateError::UnknownFootnote(reference)),
            }
        }
        for (name, footnote) in footnote_events {
            ctx.warnings
                .push(ValidateError::UnreferencedFootnote(name));
            trailer.extend(footnote);
        }
        if !trailer.is_empty() {
            events.push(Event::Html(CowStr::Borrowed("<section class=\"footnotes\">\n")));
            events.extend(trailer);
            events.push(Event::Html(CowStr::Borrowed("</section>\n")));
        }

        let mut html = String::new();
        pulldown_cmark::html::push_html(&mut html, events.into_iter());
        Html(html)
    }

    /// First markup the restricted section editor doesn't offer, if any.
    pub fn disallowed_section_feature(&self) -> Option<&'static str> {
        Parser::new_ext(&self.0, options()).find_map(|event| match event {
            Event::Start(Tag::Heading { .. }) => Some("heading"),
            Event::Start(Tag::CodeBlock(_)) | Event::Code(_) => Some("code"),
            Event::Start(Tag::Image { .. }) => Some("image"),
            Event::Start(Tag::Table(_)) => Some("table"),
            Event::Start(Tag::BlockQuote(_)) => Some("block quote"),
            Event::Start(Tag::FootnoteDefinition(_)) | Event::FootnoteReference(_) => {
                Some("footnote")
            }
            Event::Html(_) | Event::InlineHtml(_) => Some("raw HTML"),
            _ => None,
        })
    }

    pub fn plain_text(&self) -> String {
        let mut text = String::new();
        for event in Parser::new_ext(&self.0, options()) {
            match event {
                Event::Text(chunk) | Event::Code(chunk) => text.push_str(&chunk),
                Event::SoftBreak | Event::HardBreak | Event::End(_) => text.push(' '),
                _ => {}
            }
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn assign_heading_ids(events: &mut [Event<'_>], ids: &mut HeadingIds) {
    for start in 0..events.len() {
        if !matches!(events[start], Event::Start(Tag::Heading { id: None, .. })) {
            continue;
        }

        let mut text = String::new();
        for event in &events[start + 1..] {
            match event {
                Event::End(TagEnd::Heading(_)) => break,
                Event::Text(chunk) | Event::Code(chunk) => text.push_str(chunk),
                _ => {}
            }
        }

        if let Event::Start(Tag::Heading { id, .. }) = &mut events[start] {
            *id = Some(CowStr::from(ids.allocate(&text)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links() -> HashMap<String, String> {
        HashMap::from([(String::from("about"), String::from("/about/"))])
    }

    fn render(markdown: &str) -> (String, Vec<ValidateError>) {
        let links = links();
        let mut ctx = RenderContext::new(&links);
        let html = RichText::new(markdown).render(&mut ctx);
        (html.0, ctx.warnings)
    }

    #[test]
    fn page_links_resolve() {
        let (html, warnings) = render("see [about](@about)");
        assert!(html.contains(r#"href="/about/""#));
        assert!(warnings.is_empty());
    }

    #[test]
    fn unknown_page_link_warns() {
        let (html, warnings) = render("see [nothing](@missing)");
        assert!(html.contains(r##"href="#""##));
        assert_eq!(warnings, vec![ValidateError::UnknownLink("missing".into())]);
    }

    #[test]
    fn unknown_reference_link_warns() {
        let (_, warnings) = render("see [the docs][docs]");
        assert_eq!(warnings, vec![ValidateError::UnknownLink("docs".into())]);
    }

    #[test]
    fn headings_get_unique_ids() {
        let (html, _) = render("# Intro\n\ntext\n\n## Intro\n\n### Two Words");
        assert!(html.contains(r#"<h1 id="intro">"#));
        assert!(html.contains(r#"<h2 id="intro-1">"#));
        assert!(html.contains(r#"<h3 id="two-words">"#));
    }

    #[test]
    fn headings_without_text_get_an_id() {
        let (html, _) = render("# ![](/logo.png)\n\n## ![](/other.png)");
        assert!(html.contains(r#"<h1 id="section">"#));
        assert!(html.contains(r#"<h2 id="section-1">"#));
        assert!(!html.contains("id=\"\""));
    }

    #[test]
    fn explicit_heading_ids_are_kept() {
        let (html, _) = render("# Intro {#start}");
        assert!(html.contains(r#"id="start""#));
    }

    #[test]
    fn heading_ids_are_shared_across_renders() {
        let links = links();
        let mut ctx = RenderContext::new(&links);
        RichText::new("# Notes").render(&mut ctx);
        let second = RichText::new("# Notes").render(&mut ctx);
        assert!(second.0.contains(r#"id="notes-1""#));
    }

    #[test]
    fn footnotes_move_after_body() {
        let (html, warnings) = render("Body text[^n].\n\n[^n]: The note.\n\nMore body.");
        assert!(warnings.is_empty());
        let note = html.find("The note.").unwrap();
        let more = html.find("More body.").unwrap();
        assert!(more < note);
        assert!(html.contains(r#"<section class="footnotes">"#));
    }

    #[test]
    fn section_features() {
        assert_eq!(
            RichText::new("**bold** [link](https://x.org)\n\n- one\n- two").disallowed_section_feature(),
            None
        );
        assert_eq!(
            RichText::new("# heading").disallowed_section_feature(),
            Some("heading")
        );
        assert_eq!(
            RichText::new("```\ncode\n```").disallowed_section_feature(),
            Some("code")
        );
    }

    #[test]
    fn plain_text_drops_markup() {
        assert_eq!(
            RichText::new("Some *emphasis* and `code`").plain_text(),
            "Some emphasis and code"
        );
    }
}
