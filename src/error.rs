use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::blocks::BlockKind;

/// Content that can't be stored: bad blocks, bad tree placement, unknown references.
#[derive(thiserror::Error, Debug)]
pub enum ContentError {
    #[error("`{kind}` blocks are not allowed in `{field}`")]
    DisallowedBlock { field: &'static str, kind: BlockKind },

    #[error("heading level {0} is outside 1..=6")]
    HeadingLevel(u8),

    #[error("{feature} is not allowed in section text")]
    DisallowedFeature { feature: &'static str },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("tagline is longer than {max} characters")]
    TaglineTooLong { max: usize },

    #[error("a {child} cannot be created under a {parent}")]
    DisallowedChild {
        parent: &'static str,
        child: &'static str,
    },

    #[error("a {0} needs a parent page")]
    MissingParent(&'static str),

    #[error("the site already has a home page")]
    DuplicateRoot,

    #[error("slug `{0}` is already used by a sibling page")]
    DuplicateSlug(String),

    #[error("a page can't change from {from} to {to}")]
    KindChanged {
        from: &'static str,
        to: &'static str,
    },

    #[error("unknown article type `{0}`")]
    UnknownArticleType(String),

    #[error("article type `{0}` already exists")]
    DuplicateArticleType(String),

    #[error("page {0} has no revisions")]
    NoRevision(i64),
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("no page with id {0}")]
    PageNotFound(i64),

    #[error("authentication required")]
    Unauthorized,

    #[error("{0}")]
    InvalidJson(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Errors from the HTML side of the site.
#[derive(thiserror::Error, Debug)]
pub enum SiteError {
    #[error("page not found")]
    NotFound,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Template(#[from] tera::Error),
}

impl IntoResponse for SiteError {
    fn into_response(self) -> Response {
        match self {
            SiteError::NotFound => (
                StatusCode::NOT_FOUND,
                Html("<!doctype html><title>Not found</title><h1>Not found</h1>"),
            )
                .into_response(),

            err => {
                tracing::error!(error = ?err, "failed to render page");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html("<!doctype html><title>Server error</title><h1>Server error</h1>"),
                )
                    .into_response()
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error("usage: folio <config.toml>")]
    Usage,

    #[error("couldn't read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("templates: {0}")]
    Template(#[from] tera::Error),
}
