//! Search boxes over lists that are already loaded.

use folio_types::{AppRecord, BlogPostRecord, ProjectRecord};

fn needle(query: &str) -> Option<String> {
    let trimmed = query.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn filter_by<'a, T>(
    items: &'a [T],
    query: &str,
    matches: impl Fn(&T, &str) -> bool,
) -> Vec<&'a T> {
    match needle(query) {
        Some(needle) => items.iter().filter(|item| matches(item, &needle)).collect(),
        None => items.iter().collect(),
    }
}

/// Public catalog: name or short description.
pub fn filter_public_apps<'a>(apps: &'a [AppRecord], query: &str) -> Vec<&'a AppRecord> {
    filter_by(apps, query, |app, needle| {
        contains(&app.name, needle)
            || app
                .short_description
                .as_deref()
                .is_some_and(|text| contains(text, needle))
    })
}

pub fn filter_admin_apps<'a>(apps: &'a [AppRecord], query: &str) -> Vec<&'a AppRecord> {
    filter_by(apps, query, |app, needle| contains(&app.name, needle))
}

pub fn filter_projects<'a>(projects: &'a [ProjectRecord], query: &str) -> Vec<&'a ProjectRecord> {
    filter_by(projects, query, |project, needle| {
        contains(&project.name, needle)
    })
}

pub fn filter_posts<'a>(posts: &'a [BlogPostRecord], query: &str) -> Vec<&'a BlogPostRecord> {
    filter_by(posts, query, |post, needle| contains(&post.title, needle))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;

    fn create_app(name: &str, short: Option<&str>) -> AppRecord {
        AppRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: name.to_lowercase().replace(' ', "-"),
            title: None,
            short_description: short.map(str::to_string),
            description: None,
            instructions: None,
            features: Vec::new(),
            download_url: None,
            logo_url: None,
            version: None,
            is_featured: false,
            created_at: datetime!(2024-05-01 10:00 UTC),
        }
    }

    #[test]
    fn public_search_covers_short_description() {
        let apps = vec![
            create_app("Pixel Notes", Some("A tiny markdown editor")),
            create_app("Tide Clock", None),
        ];

        let hits = filter_public_apps(&apps, "MARKDOWN");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Pixel Notes");

        assert!(filter_admin_apps(&apps, "markdown").is_empty());
        assert_eq!(filter_admin_apps(&apps, "tide")[0].name, "Tide Clock");
    }

    #[test]
    fn blank_query_returns_everything_in_order() {
        let apps = vec![create_app("B", None), create_app("A", None)];
        let all = filter_public_apps(&apps, "   ");
        assert_eq!(
            all.iter().map(|app| app.name.as_str()).collect::<Vec<_>>(),
            ["B", "A"]
        );
    }
}
