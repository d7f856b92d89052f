use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use folio_types::{AppImageRecord, AppRecord, BlogPostRecord, ProjectRecord, SiteStatsRecord};
use serde::{Deserialize, Serialize};

use crate::{
    application::{
        error::{AppError, HttpError},
        filters::{filter_posts, filter_projects, filter_public_apps},
        view::{ViewBody, ViewState, placeholders},
    },
    domain::forms::ContactForm,
};

use super::{AppState, page_response, settle};

pub fn build_public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/apps", get(apps))
        .route("/apps/{slug}", get(app_details))
        .route("/projects", get(projects))
        .route("/blog", get(blog))
        .route("/blog/{slug}", get(blog_post))
        .route("/about", get(about))
        .route("/contact", get(contact_page).post(submit_contact))
        .route("/privacy-policy", get(privacy_policy))
        .route("/terms", get(terms))
        .route("/disclaimer", get(disclaimer))
        .fallback(not_found)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct SearchQuery {
    pub q: String,
}

#[derive(Serialize)]
struct HomePage<'a> {
    featured_apps: ViewBody<'a, Vec<AppRecord>>,
    stats: ViewBody<'a, SiteStatsRecord>,
}

async fn home(State(state): State<AppState>) -> Result<Response, AppError> {
    let (featured, stats) = tokio::join!(
        settle(state.queries.featured_apps()),
        settle(state.queries.site_stats()),
    );
    let featured = ViewState::from_list(&featured?);
    let stats = ViewState::from_single(&stats?);

    let body = HomePage {
        featured_apps: featured.body(placeholders::NO_APPS),
        stats: stats.body(placeholders::STATS_NOT_FOUND),
    };
    Ok(page_response("infra::http::public::home", &featured, body))
}

#[derive(Serialize)]
pub(super) struct ListPage<'a, T> {
    pub query: &'a str,
    #[serde(flatten)]
    pub view: ViewBody<'a, Vec<T>>,
}

async fn apps(
    State(state): State<AppState>,
    Query(search): Query<SearchQuery>,
) -> Result<Response, AppError> {
    let loaded = settle(state.queries.apps()).await?;
    let view =
        ViewState::from_list(&loaded).narrow(|rows| filter_public_apps(rows, &search.q));

    let body = ListPage {
        query: &search.q,
        view: view.body(placeholders::NO_APPS.for_search(&search.q)),
    };
    Ok(page_response("infra::http::public::apps", &view, body))
}

#[derive(Serialize)]
struct AppDetailsPage<'a> {
    app: ViewBody<'a, AppRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<ViewBody<'a, Vec<AppImageRecord>>>,
}

async fn app_details(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let app = ViewState::from_single(&settle(state.queries.app(&slug)).await?);

    let images = match app.ready() {
        Some(record) => Some(ViewState::from_list(
            &settle(state.queries.app_images(Some(record.id))).await?,
        )),
        None => None,
    };

    let body = AppDetailsPage {
        app: app.body(placeholders::APP_NOT_FOUND),
        images: images
            .as_ref()
            .map(|view| view.body(placeholders::NO_SCREENSHOTS)),
    };
    Ok(page_response("infra::http::public::app_details", &app, body))
}

async fn projects(
    State(state): State<AppState>,
    Query(search): Query<SearchQuery>,
) -> Result<Response, AppError> {
    let loaded = settle(state.queries.projects()).await?;
    let view: ViewState<Vec<ProjectRecord>> =
        ViewState::from_list(&loaded).narrow(|rows| filter_projects(rows, &search.q));

    let body = ListPage {
        query: &search.q,
        view: view.body(placeholders::NO_PROJECTS.for_search(&search.q)),
    };
    Ok(page_response("infra::http::public::projects", &view, body))
}

async fn blog(
    State(state): State<AppState>,
    Query(search): Query<SearchQuery>,
) -> Result<Response, AppError> {
    let loaded = settle(state.queries.blog_posts()).await?;
    let view: ViewState<Vec<BlogPostRecord>> =
        ViewState::from_list(&loaded).narrow(|rows| filter_posts(rows, &search.q));

    let body = ListPage {
        query: &search.q,
        view: view.body(placeholders::NO_POSTS.for_search(&search.q)),
    };
    Ok(page_response("infra::http::public::blog", &view, body))
}

async fn blog_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let view = ViewState::from_single(&settle(state.queries.blog_post(&slug)).await?);
    let body = view.body(placeholders::POST_NOT_FOUND);
    Ok(page_response("infra::http::public::blog_post", &view, body))
}

#[derive(Debug, Clone, Copy, Serialize)]
struct StaticPage {
    page: &'static str,
    title: &'static str,
}

impl IntoResponse for StaticPage {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

async fn about() -> StaticPage {
    StaticPage {
        page: "about",
        title: "About Me",
    }
}

async fn contact_page() -> StaticPage {
    StaticPage {
        page: "contact",
        title: "Contact",
    }
}

async fn privacy_policy() -> StaticPage {
    StaticPage {
        page: "privacy-policy",
        title: "Privacy Policy",
    }
}

async fn terms() -> StaticPage {
    StaticPage {
        page: "terms",
        title: "Terms of Service",
    }
}

async fn disclaimer() -> StaticPage {
    StaticPage {
        page: "disclaimer",
        title: "Disclaimer",
    }
}

#[derive(Serialize)]
struct Received {
    status: &'static str,
}

async fn submit_contact(
    State(state): State<AppState>,
    Json(form): Json<ContactForm>,
) -> Result<Response, AppError> {
    state.commands.submit_contact(&form).await?;
    Ok((StatusCode::CREATED, Json(Received { status: "received" })).into_response())
}

async fn not_found() -> HttpError {
    HttpError::new(
        "infra::http::public::not_found",
        StatusCode::NOT_FOUND,
        "Page not found",
        "no route matched",
    )
}
