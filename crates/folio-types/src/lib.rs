//! Typed rows and write payloads for the collections behind the portfolio site.
//!
//! Rows are decoded from the JSON objects returned by the hosted data backend.
//! Columns the backend may leave empty are `Option`s; list columns tolerate
//! `null` and decode it as an empty list.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Named collections (tables) exposed by the data backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Apps,
    AppImages,
    Projects,
    BlogPosts,
    ContactMessages,
    SiteStats,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Apps,
        Collection::AppImages,
        Collection::Projects,
        Collection::BlogPosts,
        Collection::ContactMessages,
        Collection::SiteStats,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Apps => "apps",
            Collection::AppImages => "app_images",
            Collection::Projects => "projects",
            Collection::BlogPosts => "blog_posts",
            Collection::ContactMessages => "contact_messages",
            Collection::SiteStats => "site_stats",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRecord {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub features: Vec<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_featured: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppImageRecord {
    pub id: Uuid,
    pub app_id: Uuid,
    pub image_url: String,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sort_order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub live_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPostRecord {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_published: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactMessageRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The single row of public site counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteStatsRecord {
    pub id: Uuid,
    #[serde(default, deserialize_with = "null_as_default")]
    pub apps_count: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub projects_count: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub downloads_count: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub users_count: i64,
}

/// Aggregate shown on the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardCounts {
    pub apps: u64,
    pub projects: u64,
    pub posts: u64,
    pub unread_messages: u64,
    pub downloads: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppInput {
    pub name: String,
    pub slug: String,
    pub title: Option<String>,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    pub download_url: Option<String>,
    pub logo_url: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppImageInput {
    pub app_id: Uuid,
    pub image_url: String,
    pub alt_text: Option<String>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInput {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    pub github_url: Option<String>,
    pub live_url: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlogPostInput {
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStatsInput {
    pub apps_count: i64,
    pub projects_count: i64,
    pub downloads_count: i64,
    pub users_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactMessageInput {
    pub name: String,
    pub email: String,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn app_row_tolerates_null_lists_and_missing_optionals() {
        let row = json!({
            "id": "6a1f2c3e-9a43-4d1e-8a0b-1f2e3d4c5b6a",
            "name": "Pixel Notes",
            "slug": "pixel-notes",
            "features": null,
            "is_featured": null,
            "created_at": "2024-05-01T10:00:00.123456+00:00"
        });

        let app: AppRecord = serde_json::from_value(row).expect("app row decodes");
        assert!(app.features.is_empty());
        assert!(!app.is_featured);
        assert_eq!(app.title, None);
        assert_eq!(app.created_at.year(), 2024);
    }

    #[test]
    fn blog_post_published_at_is_optional() {
        let row = json!({
            "id": "6a1f2c3e-9a43-4d1e-8a0b-1f2e3d4c5b6b",
            "title": "Hello",
            "slug": "hello",
            "is_published": false,
            "published_at": null,
            "created_at": "2024-05-01T10:00:00Z"
        });

        let post: BlogPostRecord = serde_json::from_value(row).expect("post row decodes");
        assert_eq!(post.published_at, None);
    }

    #[test]
    fn collection_names_match_backend_tables() {
        let names: Vec<_> = Collection::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(
            names,
            [
                "apps",
                "app_images",
                "projects",
                "blog_posts",
                "contact_messages",
                "site_stats"
            ]
        );
    }
}
