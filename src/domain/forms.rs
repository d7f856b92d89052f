//! Admin and contact form payloads and their validation.
//!
//! Forms arrive as submitted by the browser: blank strings for unset fields,
//! list entries with stray whitespace. Validation turns them into the write
//! payloads of `folio_types`, or fails locally before any network call.

use serde::Deserialize;
use time::OffsetDateTime;

use folio_types::{
    AppInput, BlogPostInput, ContactMessageInput, ProjectInput, SiteStatsInput,
};

use super::error::DomainError;
use super::slug::{SlugError, derive_slug};

pub const DEFAULT_APP_VERSION: &str = "1.0.0";

/// Screenshot attached to an app; position in the list is its sort order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImageForm {
    pub image_url: String,
    pub alt_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppForm {
    pub name: String,
    pub slug: String,
    pub title: String,
    pub short_description: String,
    pub description: String,
    pub instructions: String,
    pub features: Vec<String>,
    pub download_url: String,
    pub logo_url: String,
    pub version: String,
    pub is_featured: bool,
    pub images: Vec<ImageForm>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProjectForm {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub tech_stack: Vec<String>,
    pub github_url: String,
    pub live_url: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BlogPostForm {
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub cover_image_url: String,
    pub is_published: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SiteStatsForm {
    pub apps_count: i64,
    pub projects_count: i64,
    pub downloads_count: i64,
    pub users_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// Whether a form creates a new row or edits an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit,
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn required(value: &str, field: &str) -> Result<String, DomainError> {
    optional(value).ok_or_else(|| DomainError::validation(format!("{field} is required")))
}

/// Trim entries and drop the empty ones, keeping order.
pub fn clean_list(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Use the submitted slug, or derive one from `source` when creating.
fn resolve_slug(slug: &str, source: &str, mode: FormMode) -> Result<String, DomainError> {
    if let Some(slug) = optional(slug) {
        return Ok(slug);
    }
    match mode {
        FormMode::Create => derive_slug(source).map_err(|err| match err {
            SlugError::EmptyInput => DomainError::validation("slug is required"),
            other => DomainError::validation(other.to_string()),
        }),
        FormMode::Edit => Err(DomainError::validation("slug is required")),
    }
}

impl AppForm {
    pub fn validate(&self, mode: FormMode) -> Result<(AppInput, Vec<ImageForm>), DomainError> {
        let name = required(&self.name, "name")?;
        let slug = resolve_slug(&self.slug, &name, mode)?;

        let images = self
            .images
            .iter()
            .filter_map(|image| {
                optional(&image.image_url).map(|image_url| ImageForm {
                    image_url,
                    alt_text: image.alt_text.trim().to_string(),
                })
            })
            .collect();

        let input = AppInput {
            name,
            slug,
            title: optional(&self.title),
            short_description: optional(&self.short_description),
            description: optional(&self.description),
            instructions: optional(&self.instructions),
            features: clean_list(&self.features),
            download_url: optional(&self.download_url),
            logo_url: optional(&self.logo_url),
            version: Some(
                optional(&self.version).unwrap_or_else(|| DEFAULT_APP_VERSION.to_string()),
            ),
            is_featured: self.is_featured,
        };
        Ok((input, images))
    }
}

impl ProjectForm {
    pub fn validate(&self, mode: FormMode) -> Result<ProjectInput, DomainError> {
        let name = required(&self.name, "name")?;
        let slug = resolve_slug(&self.slug, &name, mode)?;
        Ok(ProjectInput {
            name,
            slug,
            description: optional(&self.description),
            tech_stack: clean_list(&self.tech_stack),
            github_url: optional(&self.github_url),
            live_url: optional(&self.live_url),
            image_url: optional(&self.image_url),
        })
    }
}

impl BlogPostForm {
    /// A published post without a publication time is stamped with `now`.
    pub fn validate(
        &self,
        mode: FormMode,
        now: OffsetDateTime,
    ) -> Result<BlogPostInput, DomainError> {
        let title = required(&self.title, "title")?;
        let slug = resolve_slug(&self.slug, &title, mode)?;
        let published_at = match (self.is_published, self.published_at) {
            (true, None) => Some(now),
            (_, existing) => existing,
        };
        Ok(BlogPostInput {
            title,
            slug,
            excerpt: optional(&self.excerpt),
            content: optional(&self.content),
            cover_image_url: optional(&self.cover_image_url),
            is_published: self.is_published,
            published_at,
        })
    }
}

impl SiteStatsForm {
    pub fn validate(&self) -> Result<SiteStatsInput, DomainError> {
        let counts = [
            ("apps_count", self.apps_count),
            ("projects_count", self.projects_count),
            ("downloads_count", self.downloads_count),
            ("users_count", self.users_count),
        ];
        if let Some((field, _)) = counts.iter().find(|(_, value)| *value < 0) {
            return Err(DomainError::validation(format!(
                "{field} cannot be negative"
            )));
        }
        Ok(SiteStatsInput {
            apps_count: self.apps_count,
            projects_count: self.projects_count,
            downloads_count: self.downloads_count,
            users_count: self.users_count,
        })
    }
}

impl ContactForm {
    pub fn validate(&self) -> Result<ContactMessageInput, DomainError> {
        let name = required(&self.name, "name")?;
        let email = required(&self.email, "email")?;
        if !email.contains('@') {
            return Err(DomainError::validation("email must contain `@`"));
        }
        let message = required(&self.message, "message")?;
        Ok(ContactMessageInput {
            name,
            email,
            message,
            is_read: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn app_form_derives_slug_and_cleans_lists() {
        let form = AppForm {
            name: "  Pixel Notes ".to_string(),
            features: vec![" Sync ".to_string(), "   ".to_string(), "Export".to_string()],
            images: vec![
                ImageForm {
                    image_url: "a.png".to_string(),
                    alt_text: " first ".to_string(),
                },
                ImageForm::default(),
            ],
            ..AppForm::default()
        };

        let (input, images) = form.validate(FormMode::Create).expect("valid form");
        assert_eq!(input.name, "Pixel Notes");
        assert_eq!(input.slug, "pixel-notes");
        assert_eq!(input.features, ["Sync", "Export"]);
        assert_eq!(input.version.as_deref(), Some(DEFAULT_APP_VERSION));
        assert_eq!(input.title, None);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].alt_text, "first");
    }

    #[test]
    fn editing_requires_an_explicit_slug() {
        let form = AppForm {
            name: "Pixel Notes".to_string(),
            ..AppForm::default()
        };
        assert_eq!(
            form.validate(FormMode::Edit).expect_err("slug missing"),
            DomainError::validation("slug is required")
        );
    }

    #[test]
    fn missing_name_is_a_validation_error() {
        let err = ProjectForm::default()
            .validate(FormMode::Create)
            .expect_err("name missing");
        assert_eq!(err, DomainError::validation("name is required"));
    }

    #[test]
    fn publishing_stamps_missing_publication_time() {
        let now = datetime!(2024-06-01 12:00 UTC);
        let form = BlogPostForm {
            title: "Hello World".to_string(),
            is_published: true,
            ..BlogPostForm::default()
        };

        let input = form.validate(FormMode::Create, now).expect("valid post");
        assert_eq!(input.slug, "hello-world");
        assert_eq!(input.published_at, Some(now));

        let earlier = datetime!(2023-01-01 0:00 UTC);
        let kept = BlogPostForm {
            published_at: Some(earlier),
            ..form.clone()
        }
        .validate(FormMode::Create, now)
        .expect("valid post");
        assert_eq!(kept.published_at, Some(earlier));

        let draft = BlogPostForm {
            is_published: false,
            ..form
        }
        .validate(FormMode::Create, now)
        .expect("valid draft");
        assert_eq!(draft.published_at, None);
    }

    #[test]
    fn contact_email_needs_at_sign() {
        let form = ContactForm {
            name: "Ada".to_string(),
            email: "ada.example.com".to_string(),
            message: "Hello".to_string(),
        };
        assert!(matches!(
            form.validate(),
            Err(DomainError::Validation { .. })
        ));
    }

    #[test]
    fn negative_counts_are_rejected() {
        let form = SiteStatsForm {
            downloads_count: -1,
            ..SiteStatsForm::default()
        };
        assert_eq!(
            form.validate().expect_err("negative"),
            DomainError::validation("downloads_count cannot be negative")
        );
    }
}
