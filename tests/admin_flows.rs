use std::sync::Arc;
use std::time::Duration;

use folio::application::error::AppError;
use folio::application::view::{ViewState, placeholders};
use folio::application::{AuthGuard, Commands, GuardDecision, Queries};
use folio::domain::error::DomainError;
use folio::domain::forms::{AppForm, BlogPostForm, ContactForm, ImageForm, SiteStatsForm};
use folio::query::{QueryCache, QueryCacheConfig, QueryStatus};
use folio::remote::{Collection, MemoryBackend, Remote, RemoteError};
use serde_json::json;

const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "secret";

struct Fixture {
    backend: Arc<MemoryBackend>,
    queries: Queries,
    commands: Commands,
    guard: AuthGuard,
}

fn create_fixture(backend: MemoryBackend) -> Fixture {
    let backend = Arc::new(backend.with_admin(ADMIN_EMAIL, ADMIN_PASSWORD));
    let remote = Remote::from_backend(Arc::clone(&backend));
    let cache = QueryCache::init(QueryCacheConfig::with_gc_idle(Duration::from_secs(300)))
        .expect("runtime is running");
    Fixture {
        queries: Queries::new(cache.clone(), Arc::clone(&remote.data)),
        guard: AuthGuard::new(Arc::clone(&remote.auth)),
        commands: Commands::new(cache, remote),
        backend,
    }
}

async fn signed_in(backend: MemoryBackend) -> Fixture {
    let fixture = create_fixture(backend);
    fixture
        .guard
        .sign_in(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .expect("sign in");
    fixture
}

fn app_form(name: &str) -> AppForm {
    AppForm {
        name: name.to_string(),
        short_description: format!("{name} for your desktop"),
        ..AppForm::default()
    }
}

#[tokio::test]
async fn empty_app_list_renders_placeholder() {
    let fixture = create_fixture(MemoryBackend::new());

    let mut apps = fixture.queries.apps().expect("subscribe");
    let state = apps.settled().await;
    assert_eq!(state.status, QueryStatus::Success);

    let view = ViewState::from_list(&state);
    assert_eq!(view, ViewState::Empty);
    let body = serde_json::to_value(view.body(placeholders::NO_APPS)).expect("json");
    assert_eq!(body["state"], "empty");
    assert_eq!(body["placeholder"]["title"], "No Apps Found");
}

#[tokio::test]
async fn missing_slug_is_not_found() {
    let fixture = create_fixture(MemoryBackend::new());
    fixture.backend.seed(
        Collection::Apps,
        vec![json!({ "name": "Clock", "slug": "clock" })],
    );

    let mut missing = fixture.queries.app("missing-slug").expect("subscribe");
    let state = missing.settled().await;
    assert_eq!(state.status, QueryStatus::Success);
    assert_eq!(state.data.as_deref(), Some(&None));

    let view = ViewState::from_single(&state);
    assert_eq!(view, ViewState::NotFound);
    assert_eq!(
        view.body(placeholders::APP_NOT_FOUND)
            .placeholder
            .map(|placeholder| placeholder.title),
        Some("App Not Found")
    );

    let mut found = fixture.queries.app("clock").expect("subscribe");
    let view = ViewState::from_single(&found.settled().await);
    assert_eq!(view.ready().map(|app| app.name.as_str()), Some("Clock"));
}

#[tokio::test(start_paused = true)]
async fn creating_an_app_refreshes_mounted_lists() {
    let fixture = signed_in(MemoryBackend::new().with_latency(Duration::from_millis(20))).await;

    let mut admin_apps = fixture.queries.admin_apps().expect("subscribe");
    let mut public_apps = fixture.queries.apps().expect("subscribe");
    assert_eq!(admin_apps.settled().await.data.as_deref(), Some(&Vec::new()));
    assert_eq!(public_apps.settled().await.data.as_deref(), Some(&Vec::new()));

    let created = fixture
        .commands
        .save_app("new", &app_form("Pocket Clock"))
        .await
        .expect("save app");
    assert_eq!(created.slug, "pocket-clock");
    assert_eq!(created.version.as_deref(), Some("1.0.0"));

    for handle in [&admin_apps, &public_apps] {
        let state = handle.state();
        assert_eq!(state.status, QueryStatus::Loading);
        assert_eq!(state.data.as_deref(), Some(&Vec::new()));
    }

    for handle in [&mut admin_apps, &mut public_apps] {
        let state = handle.settled().await;
        assert_eq!(state.status, QueryStatus::Success);
        let rows = state.data.expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, created.id);
    }
}

#[tokio::test]
async fn saving_an_app_replaces_its_images_in_order() {
    let fixture = signed_in(MemoryBackend::new()).await;

    let mut form = app_form("Notes");
    form.images = vec![
        ImageForm {
            image_url: "https://cdn.example.com/a.png".to_string(),
            alt_text: "Main window".to_string(),
        },
        ImageForm {
            image_url: "https://cdn.example.com/b.png".to_string(),
            alt_text: String::new(),
        },
    ];
    let app = fixture
        .commands
        .save_app("new", &form)
        .await
        .expect("create");

    form.slug = app.slug.clone();
    form.images.reverse();
    form.images.truncate(1);
    fixture
        .commands
        .save_app(&app.id.to_string(), &form)
        .await
        .expect("update");

    let mut images = fixture
        .queries
        .app_images(Some(app.id))
        .expect("subscribe");
    let rows = images.settled().await.data.expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].image_url, "https://cdn.example.com/b.png");
    assert_eq!(rows[0].sort_order, 0);
    assert_eq!(rows[0].alt_text, None);

    fixture
        .commands
        .delete_app(&app.id.to_string())
        .await
        .expect("delete");
    assert!(fixture.backend.rows(Collection::Apps).is_empty());
    assert!(fixture.backend.rows(Collection::AppImages).is_empty());
}

#[tokio::test]
async fn invalid_forms_never_reach_the_backend() {
    let fixture = signed_in(MemoryBackend::new()).await;

    let err = fixture
        .commands
        .save_app("new", &app_form("   "))
        .await
        .expect_err("blank name");
    assert!(matches!(
        err,
        AppError::Domain(DomainError::Validation { .. })
    ));

    let err = fixture
        .commands
        .submit_contact(&ContactForm {
            name: "Visitor".to_string(),
            email: "not-an-address".to_string(),
            message: "Hello".to_string(),
        })
        .await
        .expect_err("bad email");
    assert!(matches!(
        err,
        AppError::Domain(DomainError::Validation { .. })
    ));

    assert!(fixture.backend.rows(Collection::Apps).is_empty());
    assert!(fixture.backend.rows(Collection::ContactMessages).is_empty());
}

#[tokio::test]
async fn unknown_record_ids_are_not_found() {
    let fixture = signed_in(MemoryBackend::new()).await;

    let err = fixture
        .commands
        .save_app("not-a-uuid", &app_form("Clock"))
        .await
        .expect_err("malformed id");
    assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);

    let mut form = app_form("Clock");
    form.slug = "clock".to_string();
    let err = fixture
        .commands
        .save_app(&uuid::Uuid::new_v4().to_string(), &form)
        .await
        .expect_err("no such row");
    assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn published_post_without_date_is_stamped() {
    let fixture = signed_in(MemoryBackend::new()).await;

    let post = fixture
        .commands
        .save_blog_post(
            "new",
            &BlogPostForm {
                title: "Shipping 2.0".to_string(),
                is_published: true,
                ..BlogPostForm::default()
            },
        )
        .await
        .expect("save post");
    assert_eq!(post.slug, "shipping-2-0");
    assert!(post.published_at.is_some());

    let mut public = fixture.queries.blog_post("shipping-2-0").expect("subscribe");
    let view = ViewState::from_single(&public.settled().await);
    assert_eq!(
        view.ready().map(|post| post.title.as_str()),
        Some("Shipping 2.0")
    );
}

#[tokio::test]
async fn site_stats_are_updated_in_place() {
    let fixture = signed_in(MemoryBackend::new()).await;

    let first = fixture
        .commands
        .save_site_stats(&SiteStatsForm {
            apps_count: 3,
            ..SiteStatsForm::default()
        })
        .await
        .expect("insert stats");
    let second = fixture
        .commands
        .save_site_stats(&SiteStatsForm {
            apps_count: 4,
            downloads_count: 1200,
            ..SiteStatsForm::default()
        })
        .await
        .expect("update stats");

    assert_eq!(first.id, second.id);
    assert_eq!(fixture.backend.rows(Collection::SiteStats).len(), 1);

    let mut stats = fixture.queries.site_stats().expect("subscribe");
    let row = ViewState::from_single(&stats.settled().await);
    assert_eq!(row.ready().map(|stats| stats.downloads_count), Some(1200));
}

#[tokio::test]
async fn contact_messages_flow_to_the_admin_inbox() {
    let fixture = create_fixture(MemoryBackend::new());

    fixture
        .commands
        .submit_contact(&ContactForm {
            name: "Visitor".to_string(),
            email: "visitor@example.com".to_string(),
            message: "Love the clock app".to_string(),
        })
        .await
        .expect("anonymous submission");

    let mut anonymous = fixture.queries.admin_messages().expect("subscribe");
    let denied = anonymous.settled().await;
    assert_eq!(denied.status, QueryStatus::Error);
    assert!(matches!(
        denied.error_as::<RemoteError>(),
        Some(RemoteError::Auth { .. })
    ));
    drop(anonymous);

    fixture
        .guard
        .sign_in(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .expect("sign in");
    let mut inbox = fixture.queries.admin_messages().expect("subscribe");
    let rows = inbox.settled().await.data.expect("rows");
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].is_read);

    let read = fixture
        .commands
        .mark_message_read(&rows[0].id.to_string())
        .await
        .expect("mark read");
    assert!(read.is_read);

    let refreshed = inbox.settled().await.data.expect("rows");
    assert!(refreshed[0].is_read);
}

#[tokio::test(start_paused = true)]
async fn sign_out_redirects_while_fetches_are_in_flight() {
    let fixture = signed_in(MemoryBackend::new().with_latency(Duration::from_secs(5))).await;
    let mut watch = fixture.guard.watch();

    let messages = fixture.queries.admin_messages().expect("subscribe");
    assert!(messages.state().is_loading());

    fixture.guard.sign_out().await.expect("sign out");
    assert_eq!(watch.signed_out().await, Some(()));
    assert_eq!(fixture.guard.check(), GuardDecision::RedirectToLogin);
    drop(messages);
}

#[tokio::test]
async fn uploads_return_public_urls() {
    let fixture = signed_in(MemoryBackend::new()).await;

    let url = fixture
        .commands
        .upload(
            "app-images",
            "Main Window.png",
            bytes::Bytes::from_static(b"\x89PNG"),
            "image/png",
        )
        .await
        .expect("upload");
    assert!(url.contains("/app-images/"));
    assert!(url.ends_with("-Main-Window.png"));

    let err = fixture
        .commands
        .upload(
            "app-images",
            "empty.png",
            bytes::Bytes::new(),
            "image/png",
        )
        .await
        .expect_err("empty upload");
    assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
}
