//! Slugs for apps, projects and blog posts.
//!
//! A slug is lowercase ASCII words joined by single hyphens, as produced by
//! the `slug` crate.

use slug::slugify;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
}

/// Derive a slug from human-readable text such as an app name.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// `true` when `slug` is already in canonical form.
pub fn is_canonical(slug: &str) -> bool {
    !slug.is_empty() && slugify(slug) == slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_hyphenated_lowercase_slug() {
        assert_eq!(
            derive_slug("  Pixel Notes: Pro Edition! ").expect("slug"),
            "pixel-notes-pro-edition"
        );
    }

    #[test]
    fn rejects_blank_and_symbol_only_input() {
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
        assert!(matches!(
            derive_slug("!!!"),
            Err(SlugError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn canonical_check() {
        assert!(is_canonical("pixel-notes"));
        assert!(!is_canonical("Pixel Notes"));
        assert!(!is_canonical(""));
    }
}
