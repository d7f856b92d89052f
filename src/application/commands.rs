//! Admin writes and the public contact form.
//!
//! Forms are validated before anything reaches the backend. Each write runs
//! once through [`QueryCache::mutate`] and, on success, invalidates the plan
//! of its [`WriteEvent`].

use std::future::Future;

use bytes::Bytes;
use folio_types::{
    AppImageInput, AppRecord, BlogPostRecord, Collection, ContactMessageRecord, ProjectRecord,
    SiteStatsRecord,
};
use serde::Serialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::forms::{
    AppForm, BlogPostForm, ContactForm, FormMode, ImageForm, ProjectForm, SiteStatsForm,
};
use crate::query::QueryCache;
use crate::remote::{Filter, Remote, Select, decode_maybe_single};

use super::error::AppError;
use super::invalidation::{WriteEvent, plan};
use super::queries::NEW_SENTINEL;

/// Where a save lands: a new row, or the row with this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTarget {
    Create,
    Update(Uuid),
}

impl SaveTarget {
    /// Interpret a route parameter; anything but the sentinel must be a uuid.
    pub fn parse(id: &str, entity: &'static str) -> Result<Self, DomainError> {
        if id == NEW_SENTINEL {
            return Ok(Self::Create);
        }
        Uuid::parse_str(id)
            .map(Self::Update)
            .map_err(|_| DomainError::not_found(entity))
    }

    pub fn mode(self) -> FormMode {
        match self {
            SaveTarget::Create => FormMode::Create,
            SaveTarget::Update(_) => FormMode::Edit,
        }
    }
}

fn parse_id(id: &str, entity: &'static str) -> Result<Uuid, DomainError> {
    Uuid::parse_str(id).map_err(|_| DomainError::not_found(entity))
}

fn to_row<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode row: {err}")))
}

/// Keep a file name readable in a storage path.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|ch| ch == '-' || ch == '.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[derive(Clone)]
pub struct Commands {
    cache: QueryCache,
    remote: Remote,
}

impl Commands {
    pub fn new(cache: QueryCache, remote: Remote) -> Self {
        Self { cache, remote }
    }

    async fn run<T, F, Fut>(&self, event: WriteEvent, write: F) -> Result<T, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let keys = plan(event);
        debug!(event = %event, invalidates = keys.len(), "Running admin write");
        let outcome = self.cache.mutate(write, &keys).await;
        if outcome.is_ok() {
            info!(event = %event, "Admin write committed");
        }
        outcome
    }

    async fn insert_one<T>(&self, collection: Collection, row: Value) -> Result<T, AppError>
    where
        T: serde::de::DeserializeOwned,
    {
        let rows = self.remote.data.insert(collection, vec![row]).await?;
        decode_maybe_single(rows)?
            .ok_or_else(|| AppError::unexpected(format!("insert into {collection} returned no row")))
    }

    async fn update_one<T>(
        &self,
        collection: Collection,
        id: Uuid,
        patch: Value,
        entity: &'static str,
    ) -> Result<T, AppError>
    where
        T: serde::de::DeserializeOwned,
    {
        let rows = self
            .remote
            .data
            .update(collection, &[Filter::eq("id", id.to_string())], patch)
            .await?;
        decode_maybe_single(rows)?.ok_or_else(|| DomainError::not_found(entity).into())
    }

    async fn replace_images(&self, app_id: Uuid, images: &[ImageForm]) -> Result<(), AppError> {
        let owner = [Filter::eq("app_id", app_id.to_string())];
        self.remote
            .data
            .delete(Collection::AppImages, &owner)
            .await?;
        if images.is_empty() {
            return Ok(());
        }

        let rows = images
            .iter()
            .zip(0_i32..)
            .map(|(image, sort_order)| {
                to_row(&AppImageInput {
                    app_id,
                    image_url: image.image_url.clone(),
                    alt_text: (!image.alt_text.is_empty()).then(|| image.alt_text.clone()),
                    sort_order,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.remote.data.insert(Collection::AppImages, rows).await?;
        Ok(())
    }

    /// Create or update an app, replacing its image set in list order.
    pub async fn save_app(&self, id: &str, form: &AppForm) -> Result<AppRecord, AppError> {
        let target = SaveTarget::parse(id, "app")?;
        let (input, images) = form.validate(target.mode())?;
        let row = to_row(&input)?;

        self.run(WriteEvent::AppWritten, || async move {
            let app: AppRecord = match target {
                SaveTarget::Create => self.insert_one(Collection::Apps, row).await?,
                SaveTarget::Update(id) => self.update_one(Collection::Apps, id, row, "app").await?,
            };
            self.replace_images(app.id, &images).await?;
            Ok(app)
        })
        .await
    }

    pub async fn delete_app(&self, id: &str) -> Result<(), AppError> {
        let id = parse_id(id, "app")?;
        self.run(WriteEvent::AppWritten, || async move {
            self.remote
                .data
                .delete(
                    Collection::AppImages,
                    &[Filter::eq("app_id", id.to_string())],
                )
                .await?;
            self.remote
                .data
                .delete(Collection::Apps, &[Filter::eq("id", id.to_string())])
                .await?;
            Ok(())
        })
        .await
    }

    pub async fn save_project(
        &self,
        id: &str,
        form: &ProjectForm,
    ) -> Result<ProjectRecord, AppError> {
        let target = SaveTarget::parse(id, "project")?;
        let row = to_row(&form.validate(target.mode())?)?;

        self.run(WriteEvent::ProjectWritten, || async move {
            match target {
                SaveTarget::Create => self.insert_one(Collection::Projects, row).await,
                SaveTarget::Update(id) => {
                    self.update_one(Collection::Projects, id, row, "project")
                        .await
                }
            }
        })
        .await
    }

    pub async fn delete_project(&self, id: &str) -> Result<(), AppError> {
        let id = parse_id(id, "project")?;
        self.run(WriteEvent::ProjectWritten, || async move {
            self.remote
                .data
                .delete(Collection::Projects, &[Filter::eq("id", id.to_string())])
                .await?;
            Ok(())
        })
        .await
    }

    /// Publishing a post without a publication time stamps it with the current time.
    pub async fn save_blog_post(
        &self,
        id: &str,
        form: &BlogPostForm,
    ) -> Result<BlogPostRecord, AppError> {
        let target = SaveTarget::parse(id, "blog post")?;
        let row = to_row(&form.validate(target.mode(), OffsetDateTime::now_utc())?)?;

        self.run(WriteEvent::BlogPostWritten, || async move {
            match target {
                SaveTarget::Create => self.insert_one(Collection::BlogPosts, row).await,
                SaveTarget::Update(id) => {
                    self.update_one(Collection::BlogPosts, id, row, "blog post")
                        .await
                }
            }
        })
        .await
    }

    pub async fn delete_blog_post(&self, id: &str) -> Result<(), AppError> {
        let id = parse_id(id, "blog post")?;
        self.run(WriteEvent::BlogPostWritten, || async move {
            self.remote
                .data
                .delete(Collection::BlogPosts, &[Filter::eq("id", id.to_string())])
                .await?;
            Ok(())
        })
        .await
    }

    /// Update the single stats row, inserting it when the table is empty.
    pub async fn save_site_stats(&self, form: &SiteStatsForm) -> Result<SiteStatsRecord, AppError> {
        let row = to_row(&form.validate()?)?;

        self.run(WriteEvent::SiteStatsWritten, || async move {
            let existing: Option<SiteStatsRecord> = decode_maybe_single(
                self.remote
                    .data
                    .select(Collection::SiteStats, &Select::all().limit(1))
                    .await?,
            )?;
            match existing {
                Some(current) => {
                    self.update_one(Collection::SiteStats, current.id, row, "site stats")
                        .await
                }
                None => self.insert_one(Collection::SiteStats, row).await,
            }
        })
        .await
    }

    pub async fn mark_message_read(&self, id: &str) -> Result<ContactMessageRecord, AppError> {
        let id = parse_id(id, "message")?;
        self.run(WriteEvent::MessageWritten, || async move {
            self.update_one(
                Collection::ContactMessages,
                id,
                json!({ "is_read": true }),
                "message",
            )
            .await
        })
        .await
    }

    pub async fn delete_message(&self, id: &str) -> Result<(), AppError> {
        let id = parse_id(id, "message")?;
        self.run(WriteEvent::MessageWritten, || async move {
            self.remote
                .data
                .delete(
                    Collection::ContactMessages,
                    &[Filter::eq("id", id.to_string())],
                )
                .await?;
            Ok(())
        })
        .await
    }

    /// Public contact form; allowed without a session.
    pub async fn submit_contact(&self, form: &ContactForm) -> Result<(), AppError> {
        let row = to_row(&form.validate()?)?;
        self.run(WriteEvent::ContactSubmitted, || async move {
            self.remote
                .data
                .insert(Collection::ContactMessages, vec![row])
                .await?;
            Ok(())
        })
        .await
    }

    /// Store an image and return its public URL.
    pub async fn upload(
        &self,
        bucket: &str,
        file_name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, AppError> {
        if bucket.is_empty()
            || !bucket
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'))
        {
            return Err(DomainError::validation(format!("invalid bucket `{bucket}`")).into());
        }
        if bytes.is_empty() {
            return Err(DomainError::validation("upload is empty").into());
        }

        let path = format!("{}-{}", Uuid::new_v4(), sanitize_file_name(file_name));
        self.run(WriteEvent::Uploaded, || async move {
            let url = self
                .remote
                .storage
                .upload(bucket, &path, bytes, content_type)
                .await
                .map_err(AppError::from)?;
            Ok::<_, AppError>(url)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_target_parses_sentinel_and_ids() {
        assert_eq!(
            SaveTarget::parse(NEW_SENTINEL, "app").expect("sentinel"),
            SaveTarget::Create
        );
        let id = Uuid::new_v4();
        assert_eq!(
            SaveTarget::parse(&id.to_string(), "app").expect("uuid"),
            SaveTarget::Update(id)
        );
        assert_eq!(
            SaveTarget::parse("pixel-notes", "app").expect_err("not an id"),
            DomainError::not_found("app")
        );
    }

    #[test]
    fn file_names_are_sanitised() {
        assert_eq!(sanitize_file_name("My Screenshot (1).png"), "My-Screenshot--1-.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "etc-passwd");
        assert_eq!(sanitize_file_name("  "), "upload");
    }
}
