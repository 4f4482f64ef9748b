//! Structured content blocks.
//!
//! A [`StreamField`] is an ordered list of blocks, stored as JSON in the shape
//! `[{"type": "rich_text", "value": ...}, ...]`. Which block types a stream
//! accepts depends on the page field it belongs to.

use serde::{Deserialize, Serialize};
use tera::escape_html;

use crate::error::ContentError;
use crate::page::Html;
use crate::richtext::{RenderContext, RichText};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    RichText,
    Code,
    Image,
    WrappedImage,
    IconLinkLists,
    Section,
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BlockKind::RichText => "rich_text",
            BlockKind::Code => "code",
            BlockKind::Image => "image",
            BlockKind::WrappedImage => "wrapped_image",
            BlockKind::IconLinkLists => "icon_link_lists",
            BlockKind::Section => "section",
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Block {
    RichText(RichText),
    Code(CodeBlock),
    Image(ImageBlock),
    WrappedImage(WrappedImageBlock),
    IconLinkLists(Vec<IconLinkList>),
    Section(SectionBlock),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CodeBlock {
    #[serde(default)]
    pub language: String,
    pub code: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageBlock {
    pub src: String,
    #[serde(default)]
    pub alt: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Right,
    #[default]
    Center,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WrappedImageBlock {
    #[serde(flatten)]
    pub image: ImageBlock,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub alignment: Alignment,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IconLink {
    pub label: String,
    pub href: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IconLinkList {
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub links: Vec<IconLink>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SectionBlock {
    pub heading: String,
    pub level: u8,
    #[serde(default)]
    pub content: StreamField,
}

const SECTION_BLOCKS: &[BlockKind] = &[BlockKind::RichText, BlockKind::Image];

impl Block {
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::RichText(_) => BlockKind::RichText,
            Block::Code(_) => BlockKind::Code,
            Block::Image(_) => BlockKind::Image,
            Block::WrappedImage(_) => BlockKind::WrappedImage,
            Block::IconLinkLists(_) => BlockKind::IconLinkLists,
            Block::Section(_) => BlockKind::Section,
        }
    }

    fn validate(&self) -> Result<(), ContentError> {
        match self {
            Block::Code(code) if code.code.trim().is_empty() => Err(ContentError::Empty("code")),
            Block::Image(image) | Block::WrappedImage(WrappedImageBlock { image, .. })
                if image.src.trim().is_empty() =>
            {
                Err(ContentError::Empty("image source"))
            }
            Block::Section(section) => {
                if !(1..=6).contains(&section.level) {
                    return Err(ContentError::HeadingLevel(section.level));
                }
                if section.heading.trim().is_empty() {
                    return Err(ContentError::Empty("section heading"));
                }
                section.content.validate("section", SECTION_BLOCKS)?;
                for block in &section.content.0 {
                    if let Block::RichText(text) = block {
                        if let Some(feature) = text.disallowed_section_feature() {
                            return Err(ContentError::DisallowedFeature { feature });
                        }
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn render(&self, ctx: &mut RenderContext<'_>) -> Html {
        match self {
            Block::RichText(text) => {
                let inner = text.render(ctx);
                Html(format!("<div class=\"block-rich-text\">\n{}</div>\n", inner.0))
            }

            Block::Code(code) => {
                let class = if code.language.is_empty() {
                    String::new()
                } else {
                    format!(" class=\"language-{}\"", escape_html(&code.language))
                };
                Html(format!(
                    "<pre class=\"block-code\"><code{}>{}</code></pre>\n",
                    class,
                    escape_html(&code.code)
                ))
            }

            Block::Image(image) => Html(format!("{}\n", image_tag(image))),

            Block::WrappedImage(wrapped) => {
                let caption = wrapped
                    .caption
                    .as_deref()
                    .filter(|caption| !caption.is_empty())
                    .map(|caption| format!("<figcaption>{}</figcaption>", escape_html(caption)))
                    .unwrap_or_default();
                let alignment = match wrapped.alignment {
                    Alignment::Left => "left",
                    Alignment::Right => "right",
                    Alignment::Center => "center",
                };
                Html(format!(
                    "<figure class=\"wrapped-image align-{}\">{}{}</figure>\n",
                    alignment,
                    image_tag(&wrapped.image),
                    caption
                ))
            }

            Block::IconLinkLists(lists) => {
                let mut html = String::from("<div class=\"icon-link-lists\">\n");
                for list in lists {
                    html.push_str("<div class=\"icon-link-list\">\n");
                    if !list.heading.is_empty() {
                        let id = ctx.heading_ids.allocate(&list.heading);
                        html.push_str(&format!(
                            "<h3 id=\"{}\">{}</h3>\n",
                            escape_html(&id),
                            escape_html(&list.heading)
                        ));
                    }
                    html.push_str("<ul>\n");
                    for link in &list.links {
                        let href = ctx.resolve_href(&link.href);
                        html.push_str(&format!(
                            "<li><a href=\"{}\"><span class=\"icon icon-{}\"></span>{}</a></li>\n",
                            escape_html(&href),
                            escape_html(&link.icon),
                            escape_html(&link.label)
                        ));
                    }
                    html.push_str("</ul>\n</div>\n");
                }
                html.push_str("</div>\n");
                Html(html)
            }

            Block::Section(section) => {
                let id = ctx.heading_ids.allocate(&section.heading);
                let content = section.content.render(ctx);
                Html(format!(
                    "<section class=\"block-section\">\n<h{level} id=\"{}\">{}</h{level}>\n{}</section>\n",
                    escape_html(&id),
                    escape_html(&section.heading),
                    content.0,
                    level = section.level,
                ))
            }
        }
    }

    fn plain_text(&self) -> String {
        match self {
            Block::RichText(text) => text.plain_text(),
            Block::Code(code) => code.code.clone(),
            Block::Image(image) => image.alt.clone(),
            Block::WrappedImage(wrapped) => {
                let mut text = wrapped.image.alt.clone();
                if let Some(caption) = &wrapped.caption {
                    text.push(' ');
                    text.push_str(caption);
                }
                text
            }
            Block::IconLinkLists(lists) => lists
                .iter()
                .flat_map(|list| {
                    std::iter::once(list.heading.clone())
                        .chain(list.links.iter().map(|link| link.label.clone()))
                })
                .collect::<Vec<_>>()
                .join(" "),
            Block::Section(section) => {
                format!("{} {}", section.heading, section.content.plain_text())
            }
        }
    }
}

fn image_tag(image: &ImageBlock) -> String {
    format!(
        "<img src=\"{}\" alt=\"{}\">",
        escape_html(&image.src),
        escape_html(&image.alt)
    )
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct StreamField(pub Vec<Block>);

impl StreamField {
    pub fn validate(&self, field: &'static str, allowed: &[BlockKind]) -> Result<(), ContentError> {
        for block in &self.0 {
            let kind = block.kind();
            if !allowed.contains(&kind) {
                return Err(ContentError::DisallowedBlock { field, kind });
            }
            block.validate()?;
        }
        Ok(())
    }

    pub fn render(&self, ctx: &mut RenderContext<'_>) -> Html {
        let mut html = Html::default();
        for block in &self.0 {
            html.push(block.render(ctx));
        }
        html
    }

    pub fn plain_text(&self) -> String {
        self.0
            .iter()
            .map(Block::plain_text)
            .filter(|text| !text.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
