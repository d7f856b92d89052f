//! Query catalog: one key and fetch function per page read.
//!
//! Keys are built here and nowhere else, so the invalidation plans in
//! [`super::invalidation`] and the subscriptions below always agree.

use std::future::Future;
use std::sync::Arc;

use folio_types::{
    AppImageRecord, AppRecord, BlogPostRecord, Collection, ContactMessageRecord, DashboardCounts,
    ProjectRecord, SiteStatsRecord,
};
use uuid::Uuid;

use crate::query::{QueryCache, QueryError, QueryHandle, QueryKey, QueryOptions};
use crate::remote::{
    DataClient, Filter, Order, RemoteError, Select, decode_maybe_single, decode_rows,
};

/// Route parameter that opens an empty creation form instead of a lookup.
pub const NEW_SENTINEL: &str = "new";

pub const FEATURED_APPS_LIMIT: u32 = 3;

pub mod keys {
    use crate::query::QueryKey;

    pub const APPS: &str = "apps";
    pub const FEATURED_APPS: &str = "featured-apps";
    pub const APP: &str = "app";
    pub const APP_IMAGES: &str = "app-images";
    pub const PROJECTS: &str = "projects";
    pub const BLOG_POSTS: &str = "blog-posts";
    pub const BLOG_POST: &str = "blog-post";
    pub const SITE_STATS: &str = "site-stats";
    pub const ADMIN_STATS: &str = "admin-stats";
    pub const ADMIN_APPS: &str = "admin-apps";
    pub const ADMIN_PROJECTS: &str = "admin-projects";
    pub const ADMIN_BLOG_POSTS: &str = "admin-blog-posts";
    pub const ADMIN_MESSAGES: &str = "admin-messages";
    pub const ADMIN_APP: &str = "admin-app";
    pub const ADMIN_APP_IMAGES: &str = "admin-app-images";
    pub const ADMIN_PROJECT: &str = "admin-project";
    pub const ADMIN_BLOG_POST: &str = "admin-blog-post";
    pub const ADMIN_SITE_STATS: &str = "admin-site-stats";

    pub fn apps() -> QueryKey {
        QueryKey::root(APPS)
    }

    pub fn featured_apps() -> QueryKey {
        QueryKey::root(FEATURED_APPS)
    }

    pub fn app(slug: &str) -> QueryKey {
        QueryKey::root(APP).with(slug)
    }

    pub fn app_images(app_id: &str) -> QueryKey {
        QueryKey::root(APP_IMAGES).with(app_id)
    }

    pub fn projects() -> QueryKey {
        QueryKey::root(PROJECTS)
    }

    pub fn blog_posts() -> QueryKey {
        QueryKey::root(BLOG_POSTS)
    }

    pub fn blog_post(slug: &str) -> QueryKey {
        QueryKey::root(BLOG_POST).with(slug)
    }

    pub fn site_stats() -> QueryKey {
        QueryKey::root(SITE_STATS)
    }

    pub fn admin_stats() -> QueryKey {
        QueryKey::root(ADMIN_STATS)
    }

    pub fn admin_apps() -> QueryKey {
        QueryKey::root(ADMIN_APPS)
    }

    pub fn admin_projects() -> QueryKey {
        QueryKey::root(ADMIN_PROJECTS)
    }

    pub fn admin_blog_posts() -> QueryKey {
        QueryKey::root(ADMIN_BLOG_POSTS)
    }

    pub fn admin_messages() -> QueryKey {
        QueryKey::root(ADMIN_MESSAGES)
    }

    pub fn admin_app(id: &str) -> QueryKey {
        QueryKey::root(ADMIN_APP).with(id)
    }

    pub fn admin_app_images(id: &str) -> QueryKey {
        QueryKey::root(ADMIN_APP_IMAGES).with(id)
    }

    pub fn admin_project(id: &str) -> QueryKey {
        QueryKey::root(ADMIN_PROJECT).with(id)
    }

    pub fn admin_blog_post(id: &str) -> QueryKey {
        QueryKey::root(ADMIN_BLOG_POST).with(id)
    }

    pub fn admin_site_stats() -> QueryKey {
        QueryKey::root(ADMIN_SITE_STATS)
    }
}

/// Subscribes page reads to the cache, fetching through the data client.
#[derive(Clone)]
pub struct Queries {
    cache: QueryCache,
    data: Arc<dyn DataClient>,
}

impl Queries {
    pub fn new(cache: QueryCache, data: Arc<dyn DataClient>) -> Self {
        Self { cache, data }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn watch<T, F, Fut>(
        &self,
        key: QueryKey,
        options: QueryOptions,
        fetch: F,
    ) -> Result<QueryHandle<T>, QueryError>
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<dyn DataClient>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        let data = Arc::clone(&self.data);
        self.cache
            .subscribe(key, move || fetch(Arc::clone(&data)), options)
    }

    pub fn apps(&self) -> Result<QueryHandle<Vec<AppRecord>>, QueryError> {
        self.watch(keys::apps(), QueryOptions::default(), fetch_apps)
    }

    pub fn featured_apps(&self) -> Result<QueryHandle<Vec<AppRecord>>, QueryError> {
        self.watch(
            keys::featured_apps(),
            QueryOptions::default(),
            fetch_featured_apps,
        )
    }

    pub fn app(&self, slug: &str) -> Result<QueryHandle<Option<AppRecord>>, QueryError> {
        let slug = slug.to_string();
        self.watch(keys::app(&slug), QueryOptions::default(), move |data| {
            fetch_app_by_slug(data, slug.clone())
        })
    }

    /// Disabled until the owning app's id is known.
    pub fn app_images(
        &self,
        app_id: Option<Uuid>,
    ) -> Result<QueryHandle<Vec<AppImageRecord>>, QueryError> {
        let id = app_id.map(|id| id.to_string()).unwrap_or_default();
        let options = QueryOptions::enabled_if(app_id.is_some());
        let lookup = app_id;
        self.watch(keys::app_images(&id), options, move |data| {
            fetch_app_images(data, lookup)
        })
    }

    pub fn projects(&self) -> Result<QueryHandle<Vec<ProjectRecord>>, QueryError> {
        self.watch(keys::projects(), QueryOptions::default(), fetch_projects)
    }

    pub fn blog_posts(&self) -> Result<QueryHandle<Vec<BlogPostRecord>>, QueryError> {
        self.watch(
            keys::blog_posts(),
            QueryOptions::default(),
            fetch_published_posts,
        )
    }

    pub fn blog_post(&self, slug: &str) -> Result<QueryHandle<Option<BlogPostRecord>>, QueryError> {
        let slug = slug.to_string();
        self.watch(keys::blog_post(&slug), QueryOptions::default(), move |data| {
            fetch_published_post_by_slug(data, slug.clone())
        })
    }

    pub fn site_stats(&self) -> Result<QueryHandle<Option<SiteStatsRecord>>, QueryError> {
        self.watch(keys::site_stats(), QueryOptions::default(), fetch_site_stats)
    }

    pub fn admin_stats(&self) -> Result<QueryHandle<DashboardCounts>, QueryError> {
        self.watch(
            keys::admin_stats(),
            QueryOptions::default(),
            fetch_dashboard_counts,
        )
    }

    pub fn admin_apps(&self) -> Result<QueryHandle<Vec<AppRecord>>, QueryError> {
        self.watch(keys::admin_apps(), QueryOptions::default(), fetch_apps)
    }

    pub fn admin_projects(&self) -> Result<QueryHandle<Vec<ProjectRecord>>, QueryError> {
        self.watch(
            keys::admin_projects(),
            QueryOptions::default(),
            fetch_projects,
        )
    }

    pub fn admin_blog_posts(&self) -> Result<QueryHandle<Vec<BlogPostRecord>>, QueryError> {
        self.watch(
            keys::admin_blog_posts(),
            QueryOptions::default(),
            fetch_all_posts,
        )
    }

    pub fn admin_messages(&self) -> Result<QueryHandle<Vec<ContactMessageRecord>>, QueryError> {
        self.watch(
            keys::admin_messages(),
            QueryOptions::default(),
            fetch_messages,
        )
    }

    /// `id` is a route parameter; the creation sentinel subscribes disabled.
    pub fn admin_app(&self, id: &str) -> Result<QueryHandle<Option<AppRecord>>, QueryError> {
        let lookup = parse_record_id(id);
        self.watch(
            keys::admin_app(id),
            QueryOptions::enabled_if(lookup.is_some()),
            move |data| fetch_by_id::<AppRecord>(data, Collection::Apps, lookup),
        )
    }

    pub fn admin_app_images(
        &self,
        id: &str,
    ) -> Result<QueryHandle<Vec<AppImageRecord>>, QueryError> {
        let lookup = parse_record_id(id);
        self.watch(
            keys::admin_app_images(id),
            QueryOptions::enabled_if(lookup.is_some()),
            move |data| fetch_app_images(data, lookup),
        )
    }

    pub fn admin_project(&self, id: &str) -> Result<QueryHandle<Option<ProjectRecord>>, QueryError> {
        let lookup = parse_record_id(id);
        self.watch(
            keys::admin_project(id),
            QueryOptions::enabled_if(lookup.is_some()),
            move |data| fetch_by_id::<ProjectRecord>(data, Collection::Projects, lookup),
        )
    }

    pub fn admin_blog_post(
        &self,
        id: &str,
    ) -> Result<QueryHandle<Option<BlogPostRecord>>, QueryError> {
        let lookup = parse_record_id(id);
        self.watch(
            keys::admin_blog_post(id),
            QueryOptions::enabled_if(lookup.is_some()),
            move |data| fetch_by_id::<BlogPostRecord>(data, Collection::BlogPosts, lookup),
        )
    }

    pub fn admin_site_stats(&self) -> Result<QueryHandle<Option<SiteStatsRecord>>, QueryError> {
        self.watch(
            keys::admin_site_stats(),
            QueryOptions::default(),
            fetch_site_stats,
        )
    }
}

/// Record id from a route parameter; `None` for the creation sentinel or a malformed id.
pub fn parse_record_id(id: &str) -> Option<Uuid> {
    if id == NEW_SENTINEL {
        return None;
    }
    Uuid::parse_str(id).ok()
}

async fn fetch_apps(data: Arc<dyn DataClient>) -> Result<Vec<AppRecord>, RemoteError> {
    let rows = data
        .select(
            Collection::Apps,
            &Select::all().order(Order::desc("created_at")),
        )
        .await?;
    decode_rows(rows)
}

async fn fetch_featured_apps(data: Arc<dyn DataClient>) -> Result<Vec<AppRecord>, RemoteError> {
    let rows = data
        .select(
            Collection::Apps,
            &Select::all()
                .filter("is_featured", true)
                .limit(FEATURED_APPS_LIMIT),
        )
        .await?;
    decode_rows(rows)
}

async fn fetch_app_by_slug(
    data: Arc<dyn DataClient>,
    slug: String,
) -> Result<Option<AppRecord>, RemoteError> {
    let rows = data
        .select(Collection::Apps, &Select::all().filter("slug", slug).limit(1))
        .await?;
    decode_maybe_single(rows)
}

async fn fetch_app_images(
    data: Arc<dyn DataClient>,
    app_id: Option<Uuid>,
) -> Result<Vec<AppImageRecord>, RemoteError> {
    let Some(app_id) = app_id else {
        return Ok(Vec::new());
    };
    let rows = data
        .select(
            Collection::AppImages,
            &Select::all()
                .filter("app_id", app_id.to_string())
                .order(Order::asc("sort_order")),
        )
        .await?;
    decode_rows(rows)
}

async fn fetch_projects(data: Arc<dyn DataClient>) -> Result<Vec<ProjectRecord>, RemoteError> {
    let rows = data
        .select(
            Collection::Projects,
            &Select::all().order(Order::desc("created_at")),
        )
        .await?;
    decode_rows(rows)
}

async fn fetch_published_posts(
    data: Arc<dyn DataClient>,
) -> Result<Vec<BlogPostRecord>, RemoteError> {
    let rows = data
        .select(
            Collection::BlogPosts,
            &Select::all()
                .filter("is_published", true)
                .order(Order::desc("published_at")),
        )
        .await?;
    decode_rows(rows)
}

async fn fetch_published_post_by_slug(
    data: Arc<dyn DataClient>,
    slug: String,
) -> Result<Option<BlogPostRecord>, RemoteError> {
    let rows = data
        .select(
            Collection::BlogPosts,
            &Select::all()
                .filter("slug", slug)
                .filter("is_published", true)
                .limit(1),
        )
        .await?;
    decode_maybe_single(rows)
}

async fn fetch_all_posts(data: Arc<dyn DataClient>) -> Result<Vec<BlogPostRecord>, RemoteError> {
    let rows = data
        .select(
            Collection::BlogPosts,
            &Select::all().order(Order::desc("created_at")),
        )
        .await?;
    decode_rows(rows)
}

async fn fetch_messages(
    data: Arc<dyn DataClient>,
) -> Result<Vec<ContactMessageRecord>, RemoteError> {
    let rows = data
        .select(
            Collection::ContactMessages,
            &Select::all().order(Order::desc("created_at")),
        )
        .await?;
    decode_rows(rows)
}

async fn fetch_site_stats(
    data: Arc<dyn DataClient>,
) -> Result<Option<SiteStatsRecord>, RemoteError> {
    let rows = data
        .select(Collection::SiteStats, &Select::all().limit(1))
        .await?;
    decode_maybe_single(rows)
}

async fn fetch_by_id<T>(
    data: Arc<dyn DataClient>,
    collection: Collection,
    id: Option<Uuid>,
) -> Result<Option<T>, RemoteError>
where
    T: serde::de::DeserializeOwned,
{
    let Some(id) = id else {
        return Ok(None);
    };
    let rows = data
        .select(collection, &Select::all().filter("id", id.to_string()).limit(1))
        .await?;
    decode_maybe_single(rows)
}

/// Dashboard aggregate; the five reads run concurrently.
async fn fetch_dashboard_counts(
    data: Arc<dyn DataClient>,
) -> Result<DashboardCounts, RemoteError> {
    let unread = [Filter::eq("is_read", false)];
    let (apps, projects, posts, unread_messages, stats) = tokio::try_join!(
        data.count(Collection::Apps, &[]),
        data.count(Collection::Projects, &[]),
        data.count(Collection::BlogPosts, &[]),
        data.count(Collection::ContactMessages, &unread),
        fetch_site_stats(Arc::clone(&data)),
    )?;

    Ok(DashboardCounts {
        apps,
        projects,
        posts,
        unread_messages,
        downloads: stats.map_or(0, |stats| stats.downloads_count),
    })
}
