use serde::{Deserialize, Serialize};

use crate::error::ContentError;
use crate::model::PageBody;
use crate::page::PageView;
use crate::richtext::ValidateError;

/// The editable fields of a page. Stored verbatim as a revision.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PageForm {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub seo_title: Option<String>,
    #[serde(default)]
    pub search_description: String,
    #[serde(default)]
    pub show_in_menus: bool,
    pub body: PageBody,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub article_type: Option<String>,
}

impl PageForm {
    pub fn slug(&self) -> String {
        match self.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slug::slugify(slug),
            _ => slug::slugify(&self.title),
        }
    }

    /// Trimmed, deduplicated and sorted; empty for kinds that don't take tags.
    pub fn normalized_tags(&self) -> Vec<String> {
        if !self.body.kind().is_taggable() {
            return Vec::new();
        }
        let mut tags: Vec<String> = self
            .tags
            .iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    pub fn article_type_slug(&self) -> Option<&str> {
        match self.body.kind() {
            crate::model::PageKind::Article => self
                .article_type
                .as_deref()
                .map(str::trim)
                .filter(|slug| !slug.is_empty()),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ContentError> {
        if self.title.trim().is_empty() {
            return Err(ContentError::Empty("title"));
        }
        if self.slug().is_empty() {
            return Err(ContentError::Empty("slug"));
        }
        self.body.validate()
    }
}

#[derive(Deserialize, Debug)]
pub struct NewPage {
    pub parent_id: Option<i64>,
    #[serde(flatten)]
    pub form: PageForm,
}

#[derive(Deserialize, Debug)]
pub struct ArticleTypeForm {
    pub name: String,
    #[serde(default)]
    pub plural_name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

impl ArticleTypeForm {
    pub fn slug(&self) -> String {
        if self.slug.trim().is_empty() {
            slug::slugify(&self.name)
        } else {
            slug::slugify(&self.slug)
        }
    }
}

#[derive(Serialize, Debug)]
pub struct PublishResponse<'page> {
    pub page: &'page PageView,
    pub errors: Vec<ValidateError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(json: &str) -> PageForm {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn slug_defaults_to_title() {
        let form = form(r#"{"title": "Hello, World!", "body": {"kind": "basic"}}"#);
        assert_eq!(form.slug(), "hello-world");
    }

    #[test]
    fn explicit_slug_is_slugified() {
        let form = form(r#"{"title": "x", "slug": "My Slug", "body": {"kind": "basic"}}"#);
        assert_eq!(form.slug(), "my-slug");
    }

    #[test]
    fn tags_only_on_articles() {
        let article = form(
            r#"{"title": "a", "body": {"kind": "article"}, "tags": [" rust ", "web", "rust", ""]}"#,
        );
        assert_eq!(article.normalized_tags(), vec!["rust", "web"]);

        let basic = form(r#"{"title": "a", "body": {"kind": "basic"}, "tags": ["rust"]}"#);
        assert!(basic.normalized_tags().is_empty());
    }

    #[test]
    fn blank_title_is_rejected() {
        let form = form(r#"{"title": "  ", "body": {"kind": "basic"}}"#);
        assert!(matches!(form.validate(), Err(ContentError::Empty("title"))));
    }
}
