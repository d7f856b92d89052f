use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use folio_types::{
    AppImageRecord, AppRecord, BlogPostRecord, ContactMessageRecord, DashboardCounts,
    ProjectRecord, SiteStatsRecord,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    application::{
        GuardDecision,
        error::AppError,
        filters::{filter_admin_apps, filter_posts, filter_projects},
        queries::parse_record_id,
        view::{Placeholder, ViewBody, ViewState, placeholders},
    },
    domain::{
        error::DomainError,
        forms::{AppForm, BlogPostForm, ProjectForm, SiteStatsForm},
    },
    presentation::routes::{RecordParam, login_path},
    query::{QueryError, QueryHandle},
    remote::Session,
};

use super::{
    AppState,
    middleware::require_session,
    page_response,
    public::{ListPage, SearchQuery},
    settle, view_status,
};

const UPLOAD_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_UPLOAD_CONTENT_TYPE: &str = "application/octet-stream";

pub fn build_admin_router(state: AppState) -> Router<AppState> {
    let gated = Router::new()
        .route("/", get(dashboard))
        .route("/logout", post(sign_out))
        .route("/apps", get(apps))
        .route(
            "/apps/{id}",
            get(app_editor).post(save_app).delete(delete_app),
        )
        .route("/projects", get(projects))
        .route(
            "/projects/{id}",
            get(project_editor).post(save_project).delete(delete_project),
        )
        .route("/blog", get(posts))
        .route(
            "/blog/{id}",
            get(post_editor).post(save_post).delete(delete_post),
        )
        .route("/stats", get(site_stats).post(save_site_stats))
        .route("/messages", get(messages))
        .route("/messages/{id}", axum::routing::delete(delete_message))
        .route("/messages/{id}/read", post(mark_message_read))
        .route(
            "/uploads/{bucket}",
            post(upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT_BYTES)),
        )
        .route_layer(middleware::from_fn_with_state(state, require_session));

    Router::new()
        .route("/login", get(login_page).post(sign_in))
        .merge(gated)
}

#[derive(Serialize)]
struct LoginPage<'a> {
    page: &'static str,
    signed_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

async fn login_page(State(state): State<AppState>) -> Response {
    let decision = state.guard.check();
    let email = match &decision {
        GuardDecision::Allow(session) => session.email.clone(),
        GuardDecision::RedirectToLogin => None,
    };
    Json(LoginPage {
        page: "login",
        signed_in: decision.is_allowed(),
        email: email.as_deref(),
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct SignedIn<'a> {
    status: &'static str,
    email: Option<&'a str>,
    redirect: &'a str,
}

async fn sign_in(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Response, AppError> {
    let session = state
        .guard
        .sign_in(&credentials.email, &credentials.password)
        .await?;
    Ok(Json(SignedIn {
        status: "signed_in",
        email: session.email.as_deref(),
        redirect: &state.admin_prefix,
    })
    .into_response())
}

async fn sign_out(State(state): State<AppState>) -> Result<Response, AppError> {
    state.guard.sign_out().await?;
    Ok(Redirect::to(&login_path(&state.admin_prefix)).into_response())
}

#[derive(Serialize)]
struct DashboardPage<'a> {
    signed_in_as: Option<&'a str>,
    counts: ViewBody<'a, DashboardCounts>,
}

async fn dashboard(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    let counts = ViewState::from_state(&settle(state.queries.admin_stats()).await?);
    let body = DashboardPage {
        signed_in_as: session.email.as_deref(),
        counts: counts.body(placeholders::STATS_NOT_FOUND),
    };
    Ok(page_response("infra::http::admin::dashboard", &counts, body))
}

async fn apps(
    State(state): State<AppState>,
    Query(search): Query<SearchQuery>,
) -> Result<Response, AppError> {
    let loaded = settle(state.queries.admin_apps()).await?;
    let view = ViewState::from_list(&loaded).narrow(|rows| filter_admin_apps(rows, &search.q));
    let body = ListPage {
        query: &search.q,
        view: view.body(placeholders::NO_APPS_ADMIN.for_search(&search.q)),
    };
    Ok(page_response("infra::http::admin::apps", &view, body))
}

async fn projects(
    State(state): State<AppState>,
    Query(search): Query<SearchQuery>,
) -> Result<Response, AppError> {
    let loaded = settle(state.queries.admin_projects()).await?;
    let view: ViewState<Vec<ProjectRecord>> =
        ViewState::from_list(&loaded).narrow(|rows| filter_projects(rows, &search.q));
    let body = ListPage {
        query: &search.q,
        view: view.body(placeholders::NO_PROJECTS_ADMIN.for_search(&search.q)),
    };
    Ok(page_response("infra::http::admin::projects", &view, body))
}

async fn posts(
    State(state): State<AppState>,
    Query(search): Query<SearchQuery>,
) -> Result<Response, AppError> {
    let loaded = settle(state.queries.admin_blog_posts()).await?;
    let view: ViewState<Vec<BlogPostRecord>> =
        ViewState::from_list(&loaded).narrow(|rows| filter_posts(rows, &search.q));
    let body = ListPage {
        query: &search.q,
        view: view.body(placeholders::NO_POSTS_ADMIN.for_search(&search.q)),
    };
    Ok(page_response("infra::http::admin::posts", &view, body))
}

async fn messages(State(state): State<AppState>) -> Result<Response, AppError> {
    let loaded = settle(state.queries.admin_messages()).await?;
    let view: ViewState<Vec<ContactMessageRecord>> = ViewState::from_list(&loaded);
    let unread = view
        .ready()
        .map(|rows| rows.iter().filter(|message| !message.is_read).count())
        .unwrap_or_default();
    let body = MessagesPage {
        unread,
        messages: view.body(placeholders::NO_MESSAGES),
    };
    Ok(page_response("infra::http::admin::messages", &view, body))
}

#[derive(Serialize)]
struct MessagesPage<'a> {
    unread: usize,
    messages: ViewBody<'a, Vec<ContactMessageRecord>>,
}

#[derive(Serialize)]
struct EditorPage<'a, T> {
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<ViewBody<'a, T>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<ViewBody<'a, Vec<AppImageRecord>>>,
}

/// Editor for a record route: empty form for the sentinel, lookup otherwise.
async fn editor<T, F>(
    source: &'static str,
    id: &str,
    placeholder: Placeholder,
    subscribe: F,
) -> Result<Response, AppError>
where
    T: Clone + Serialize + Send + Sync + 'static,
    F: FnOnce(&str) -> Result<QueryHandle<Option<T>>, QueryError>,
{
    if RecordParam::parse(id) == RecordParam::New {
        let body: EditorPage<'_, T> = EditorPage {
            mode: "create",
            record: None,
            images: None,
        };
        return Ok(Json(body).into_response());
    }

    // A malformed id subscribes disabled and would never settle into a result.
    let view = if parse_record_id(id).is_some() {
        ViewState::from_single(&settle(subscribe(id)).await?)
    } else {
        ViewState::NotFound
    };
    let body = EditorPage {
        mode: "edit",
        record: Some(view.body(placeholder)),
        images: None,
    };
    Ok(page_response(source, &view, body))
}

async fn app_editor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    if parse_record_id(&id).is_none() {
        return editor::<AppRecord, _>(
            "infra::http::admin::app_editor",
            &id,
            placeholders::APP_NOT_FOUND,
            |id| state.queries.admin_app(id),
        )
        .await;
    }

    let (app, images) = tokio::join!(
        settle(state.queries.admin_app(&id)),
        settle(state.queries.admin_app_images(&id)),
    );
    let app: ViewState<AppRecord> = ViewState::from_single(&app?);
    let images = ViewState::from_list(&images?);
    let body = EditorPage {
        mode: "edit",
        record: Some(app.body(placeholders::APP_NOT_FOUND)),
        images: Some(images.body(placeholders::NO_SCREENSHOTS)),
    };
    Ok(page_response("infra::http::admin::app_editor", &app, body))
}

async fn project_editor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    editor::<ProjectRecord, _>(
        "infra::http::admin::project_editor",
        &id,
        placeholders::PROJECT_NOT_FOUND,
        |id| state.queries.admin_project(id),
    )
    .await
}

async fn post_editor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    editor::<BlogPostRecord, _>(
        "infra::http::admin::post_editor",
        &id,
        placeholders::POST_NOT_FOUND,
        |id| state.queries.admin_blog_post(id),
    )
    .await
}

async fn site_stats(State(state): State<AppState>) -> Result<Response, AppError> {
    let view: ViewState<SiteStatsRecord> =
        ViewState::from_single(&settle(state.queries.admin_site_stats()).await?);
    let body = view.body(placeholders::STATS_NOT_FOUND);
    // A missing stats row is an empty form, not a missing page.
    let status = match &view {
        ViewState::NotFound => StatusCode::OK,
        other => view_status(other),
    };
    Ok((status, Json(body)).into_response())
}

fn saved<T: Serialize>(id: &str, record: T) -> Response {
    let status = if RecordParam::parse(id) == RecordParam::New {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(record)).into_response()
}

async fn save_app(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(form): Json<AppForm>,
) -> Result<Response, AppError> {
    let app = state.commands.save_app(&id, &form).await?;
    Ok(saved(&id, app))
}

async fn delete_app(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.commands.delete_app(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(form): Json<ProjectForm>,
) -> Result<Response, AppError> {
    let project = state.commands.save_project(&id, &form).await?;
    Ok(saved(&id, project))
}

async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.commands.delete_project(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(form): Json<BlogPostForm>,
) -> Result<Response, AppError> {
    let post = state.commands.save_blog_post(&id, &form).await?;
    Ok(saved(&id, post))
}

async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.commands.delete_blog_post(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_site_stats(
    State(state): State<AppState>,
    Json(form): Json<SiteStatsForm>,
) -> Result<Response, AppError> {
    let stats = state.commands.save_site_stats(&form).await?;
    Ok(Json(stats).into_response())
}

async fn mark_message_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let message = state.commands.mark_message_read(&id).await?;
    Ok(Json(message).into_response())
}

async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.commands.delete_message(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct Uploaded {
    url: String,
}

struct UploadPayload {
    file_name: String,
    content_type: String,
    bytes: Bytes,
}

/// Read the `file` part of an upload form. A `name` text part overrides the
/// file name the browser sent.
async fn read_upload_payload(multipart: &mut Multipart) -> Result<UploadPayload, AppError> {
    let mut name_override: Option<String> = None;
    let mut file: Option<UploadPayload> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                warn!(
                    target = "folio::http::admin::upload",
                    status = err.status().as_u16(),
                    error = %err,
                    "Failed to read multipart payload"
                );
                return Err(DomainError::validation(format!("invalid upload form: {err}")).into());
            }
        };

        match field.name() {
            Some("name") => {
                let value = field.text().await.map_err(|err| {
                    DomainError::validation(format!("invalid upload form: {err}"))
                })?;
                let value = value.trim();
                if !value.is_empty() {
                    name_override = Some(value.to_string());
                }
            }
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_default();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| DEFAULT_UPLOAD_CONTENT_TYPE.to_string());
                let bytes = field.bytes().await.map_err(|err| {
                    DomainError::validation(format!("failed to read upload: {err}"))
                })?;
                file = Some(UploadPayload {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            _ => {}
        }
    }

    let mut payload = file.ok_or_else(|| DomainError::validation("missing file"))?;
    if let Some(name) = name_override {
        payload.file_name = name;
    }
    Ok(payload)
}

async fn upload(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let payload = read_upload_payload(&mut multipart).await?;
    let size = payload.bytes.len();
    let url = state
        .commands
        .upload(
            &bucket,
            &payload.file_name,
            payload.bytes,
            &payload.content_type,
        )
        .await?;
    info!(
        target = "folio::http::admin::upload",
        bucket = %bucket,
        bytes = size,
        "Stored upload"
    );
    Ok((StatusCode::CREATED, Json(Uploaded { url })).into_response())
}
