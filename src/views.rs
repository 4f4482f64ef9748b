use std::{convert::Infallible, path::Path as FsPath, sync::Arc};

use axum::{
    extract::{FromRequestParts, Path, Request, State},
    http::{header, request::Parts, HeaderMap, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use subtle::ConstantTimeEq;
use tera::Tera;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::compat::{MyForm, MyJson, MyQuery};
use crate::error::{ApiError, ContentError, SiteError};
use crate::middleware::{real_ip, ClientIp};
use crate::model::{
    database,
    network::{ArticleTypeForm, NewPage, PageForm, PublishResponse},
    now, ArticleType, Page, SiteTree, Viewer,
};
use crate::page::PageView;
use crate::render::{check_body, Renderer, SiteSettings};
use crate::search::{search as run_search, SearchParams};

/// Cookie that carries the admin token for browsers.
pub const TOKEN_COOKIE: &str = "folio_token";

/// Children of a page with this slug are listed newest first in the explorer.
const BLOG_SLUG: &str = "blog";

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub templates: Arc<Tera>,
    pub site: Arc<SiteSettings>,
}

impl AppState {
    pub fn new(pool: SqlitePool, templates: Tera, site: SiteSettings) -> Self {
        AppState {
            pool,
            templates: Arc::new(templates),
            site: Arc::new(site),
        }
    }

    fn renderer<'a>(&'a self, tree: &'a SiteTree, viewer: Viewer) -> Renderer<'a> {
        Renderer {
            tera: &self.templates,
            site: &self.site,
            tree,
            viewer,
            now: now(),
        }
    }
}

fn presented_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    bearer.or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .filter_map(|cookie| cookie.trim().split_once('='))
            .find(|(name, _)| *name == TOKEN_COOKIE)
            .map(|(_, value)| value)
    })
}

pub fn viewer_from_headers(headers: &HeaderMap, admin_token: Option<&str>) -> Viewer {
    let authenticated = match (presented_token(headers), admin_token) {
        (Some(presented), Some(expected)) if !expected.is_empty() => {
            presented.as_bytes().ct_eq(expected.as_bytes()).into()
        }
        _ => false,
    };
    Viewer { authenticated }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(viewer_from_headers(
            &parts.headers,
            state.site.admin_token.as_deref(),
        ))
    }
}

/// An authenticated viewer, or a 401 for the admin API.
pub struct Admin;

#[axum::async_trait]
impl FromRequestParts<AppState> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let viewer = viewer_from_headers(&parts.headers, state.site.admin_token.as_deref());
        if viewer.authenticated {
            Ok(Admin)
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

fn visible(page: &Page, viewer: Viewer) -> bool {
    viewer.authenticated || page.live
}

async fn home(State(state): State<AppState>, viewer: Viewer) -> Result<Html<String>, SiteError> {
    let tree = database::load_tree(&state.pool).await?;
    let root = tree
        .root()
        .filter(|root| visible(root, viewer))
        .ok_or(SiteError::NotFound)?;
    Ok(Html(state.renderer(&tree, viewer).page(root)?))
}

async fn serve_page(
    State(state): State<AppState>,
    viewer: Viewer,
    method: Method,
    uri: Uri,
) -> Result<Response, SiteError> {
    if method != Method::GET && method != Method::HEAD {
        return Err(SiteError::NotFound);
    }

    let path = uri.path();
    if !path.ends_with('/') {
        let mut location = format!("{}/", path);
        if let Some(query) = uri.query() {
            location.push('?');
            location.push_str(query);
        }
        return Ok(Redirect::permanent(&location).into_response());
    }

    let tree = database::load_tree(&state.pool).await?;
    let page = tree
        .by_path(path)
        .filter(|page| visible(page, viewer))
        .ok_or(SiteError::NotFound)?;
    Ok(Html(state.renderer(&tree, viewer).page(page)?).into_response())
}

async fn search(
    State(state): State<AppState>,
    viewer: Viewer,
    MyQuery(params): MyQuery<SearchParams>,
) -> Result<Html<String>, SiteError> {
    let tree = database::load_tree(&state.pool).await?;
    let renderer = state.renderer(&tree, viewer);
    let results = run_search(&tree, &params, viewer, renderer.now);
    Ok(Html(renderer.search(&results)?))
}

async fn preview(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> Result<Html<String>, SiteError> {
    if !viewer.authenticated {
        return Err(SiteError::NotFound);
    }

    let tree = database::load_tree(&state.pool).await?;
    let page = tree.get(id).ok_or(SiteError::NotFound)?;
    let draft = match database::latest_revision(&state.pool, id).await? {
        Some(revision) => {
            let form = revision.form.0;
            let article_type = match form.article_type_slug() {
                Some(slug) => database::article_type_by_slug(&state.pool, slug).await?,
                None => None,
            };
            page.with_form(&form, article_type)
        }
        None => page.clone(),
    };

    Ok(Html(state.renderer(&tree, viewer).preview(&draft)?))
}

#[derive(Deserialize, Debug, Default)]
struct ExplorerQuery {
    parent: Option<i64>,
}

async fn explorer(
    State(state): State<AppState>,
    _: Admin,
    MyQuery(query): MyQuery<ExplorerQuery>,
) -> Result<MyJson<Vec<PageView>>, ApiError> {
    let tree = database::load_tree(&state.pool).await?;
    let pages = match query.parent {
        Some(id) => {
            let parent = tree.get(id).ok_or(ApiError::PageNotFound(id))?;
            let mut children = tree.children(id);
            if parent.slug == BLOG_SLUG {
                children.sort_by(|a, b| {
                    b.timeline
                        .first_published_at
                        .cmp(&a.timeline.first_published_at)
                });
            }
            children
        }
        None => tree.root().into_iter().collect(),
    };
    Ok(MyJson(pages.into_iter().map(PageView::from).collect()))
}

/// The admin API's answer for any change to a page: the page as stored, plus
/// whatever the renderer would complain about.
async fn page_response(
    pool: &SqlitePool,
    id: i64,
    form: Option<&PageForm>,
    status: StatusCode,
) -> Result<Response, ApiError> {
    let tree = database::load_tree(pool).await?;
    let page = tree.get(id).ok_or(ApiError::PageNotFound(id))?;
    let view = PageView::from(page);
    let errors = check_body(&tree, form.map_or(&page.body, |form| &form.body));
    Ok((status, MyJson(PublishResponse { page: &view, errors })).into_response())
}

async fn create_page(
    State(state): State<AppState>,
    _: Admin,
    MyJson(new_page): MyJson<NewPage>,
) -> Result<Response, ApiError> {
    let tree = database::load_tree(&state.pool).await?;
    let parent = match new_page.parent_id {
        Some(id) => Some(tree.get(id).ok_or(ApiError::PageNotFound(id))?),
        None => None,
    };
    let id = database::create_page(&state.pool, &tree, parent, &new_page.form, now()).await?;
    page_response(&state.pool, id, Some(&new_page.form), StatusCode::CREATED).await
}

async fn save_revision(
    State(state): State<AppState>,
    _: Admin,
    Path(id): Path<i64>,
    MyJson(form): MyJson<PageForm>,
) -> Result<Response, ApiError> {
    let tree = database::load_tree(&state.pool).await?;
    let page = tree.get(id).ok_or(ApiError::PageNotFound(id))?;
    database::save_revision(&state.pool, &tree, page, &form, now()).await?;
    page_response(&state.pool, id, Some(&form), StatusCode::OK).await
}

async fn publish(
    State(state): State<AppState>,
    _: Admin,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let tree = database::load_tree(&state.pool).await?;
    let page = tree.get(id).ok_or(ApiError::PageNotFound(id))?;
    database::publish(&state.pool, &tree, page, now()).await?;
    page_response(&state.pool, id, None, StatusCode::OK).await
}

async fn unpublish(
    State(state): State<AppState>,
    _: Admin,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let tree = database::load_tree(&state.pool).await?;
    let page = tree.get(id).ok_or(ApiError::PageNotFound(id))?;
    database::unpublish(&state.pool, page).await?;
    page_response(&state.pool, id, None, StatusCode::OK).await
}

#[derive(Deserialize, Debug, Default)]
struct ArticleTypeQuery {
    q: Option<String>,
}

async fn list_article_types(
    State(state): State<AppState>,
    _: Admin,
    MyQuery(query): MyQuery<ArticleTypeQuery>,
) -> Result<MyJson<Vec<ArticleType>>, ApiError> {
    let types = database::article_types(&state.pool, query.q.as_deref()).await?;
    Ok(MyJson(types))
}

async fn create_article_type(
    State(state): State<AppState>,
    _: Admin,
    MyForm(form): MyForm<ArticleTypeForm>,
) -> Result<(StatusCode, MyJson<ArticleType>), ApiError> {
    let name = form.name.trim();
    if name.is_empty() {
        return Err(ContentError::Empty("name").into());
    }
    let slug = form.slug();
    if slug.is_empty() {
        return Err(ContentError::Empty("slug").into());
    }

    let article_type = database::insert_article_type(
        &state.pool,
        name,
        form.plural_name.trim(),
        &slug,
        form.description.trim(),
    )
    .await?;
    tracing::info!(slug = %article_type.slug, "created article type");
    Ok((StatusCode::CREATED, MyJson(article_type)))
}

fn admin_api() -> Router<AppState> {
    Router::new()
        .route("/pages", get(explorer).post(create_page))
        .route("/pages/:id/revisions", post(save_revision))
        .route("/pages/:id/publish", post(publish))
        .route("/pages/:id/unpublish", post(unpublish))
        .route(
            "/article-types",
            get(list_article_types).post(create_article_type),
        )
}

pub fn router(state: AppState, static_dir: Option<&FsPath>) -> Router {
    let mut router = Router::new()
        .route("/", get(home))
        .route("/search", get(search))
        .route("/preview/:id/", get(preview))
        .nest("/admin/api", admin_api())
        .fallback(serve_page);

    if let Some(dir) = static_dir {
        router = router.nest_service("/static", ServeDir::new(dir));
    }

    router
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let client_ip = request
                    .extensions()
                    .get::<ClientIp>()
                    .map(|ClientIp(ip)| ip.to_string());
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    client_ip = client_ip.as_deref().unwrap_or("-"),
                )
            }),
        )
        .layer(axum::middleware::from_fn(real_ip))
}
