//! URL paths of the site and the admin console.
//!
//! The admin section lives under a configurable prefix (default `/admin`).
//! Record routes take either an id or the `new` sentinel.

use std::fmt;

use crate::application::queries::NEW_SENTINEL;

pub const DEFAULT_ADMIN_PREFIX: &str = "/admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordParam {
    New,
    Existing(String),
}

impl RecordParam {
    pub fn parse(segment: &str) -> Self {
        if segment == NEW_SENTINEL {
            RecordParam::New
        } else {
            RecordParam::Existing(segment.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RecordParam::New => NEW_SENTINEL,
            RecordParam::Existing(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Apps,
    AppDetails { slug: String },
    Projects,
    Blog,
    BlogPost { slug: String },
    About,
    Contact,
    PrivacyPolicy,
    Terms,
    Disclaimer,
    Admin(AdminRoute),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminRoute {
    Login,
    Dashboard,
    Apps,
    AppEditor(RecordParam),
    Projects,
    ProjectEditor(RecordParam),
    Blog,
    BlogEditor(RecordParam),
    Stats,
    Messages,
}

impl AdminRoute {
    fn resolve(segments: &[&str]) -> Option<Self> {
        let route = match segments {
            [] => AdminRoute::Dashboard,
            ["login"] => AdminRoute::Login,
            ["apps"] => AdminRoute::Apps,
            ["apps", id] => AdminRoute::AppEditor(RecordParam::parse(id)),
            ["projects"] => AdminRoute::Projects,
            ["projects", id] => AdminRoute::ProjectEditor(RecordParam::parse(id)),
            ["blog"] => AdminRoute::Blog,
            ["blog", id] => AdminRoute::BlogEditor(RecordParam::parse(id)),
            ["stats"] => AdminRoute::Stats,
            ["messages"] => AdminRoute::Messages,
            _ => return None,
        };
        Some(route)
    }

    fn suffix(&self) -> String {
        match self {
            AdminRoute::Login => "/login".to_string(),
            AdminRoute::Dashboard => String::new(),
            AdminRoute::Apps => "/apps".to_string(),
            AdminRoute::AppEditor(id) => format!("/apps/{}", id.as_str()),
            AdminRoute::Projects => "/projects".to_string(),
            AdminRoute::ProjectEditor(id) => format!("/projects/{}", id.as_str()),
            AdminRoute::Blog => "/blog".to_string(),
            AdminRoute::BlogEditor(id) => format!("/blog/{}", id.as_str()),
            AdminRoute::Stats => "/stats".to_string(),
            AdminRoute::Messages => "/messages".to_string(),
        }
    }
}

/// Normalise a configured prefix to `/segment[/segment]` without a trailing slash.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        DEFAULT_ADMIN_PREFIX.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn segments(path: &str) -> Vec<&str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

impl Route {
    pub fn resolve(path: &str, admin_prefix: &str) -> Route {
        let prefix = normalize_prefix(admin_prefix);
        let prefix_segments = segments(&prefix);
        let path_segments = segments(path);

        if let Some(rest) = path_segments.strip_prefix(prefix_segments.as_slice()) {
            return AdminRoute::resolve(rest)
                .map(Route::Admin)
                .unwrap_or(Route::NotFound);
        }

        match path_segments.as_slice() {
            [] => Route::Home,
            ["apps"] => Route::Apps,
            ["apps", slug] => Route::AppDetails {
                slug: slug.to_string(),
            },
            ["projects"] => Route::Projects,
            ["blog"] => Route::Blog,
            ["blog", slug] => Route::BlogPost {
                slug: slug.to_string(),
            },
            ["about"] => Route::About,
            ["contact"] => Route::Contact,
            ["privacy-policy"] => Route::PrivacyPolicy,
            ["terms"] => Route::Terms,
            ["disclaimer"] => Route::Disclaimer,
            _ => Route::NotFound,
        }
    }

    /// Admin routes other than the login page need a session.
    pub fn requires_session(&self) -> bool {
        matches!(self, Route::Admin(route) if *route != AdminRoute::Login)
    }

    /// Path of this route, or `None` for the catch-all.
    pub fn path(&self, admin_prefix: &str) -> Option<String> {
        let path = match self {
            Route::Home => "/".to_string(),
            Route::Apps => "/apps".to_string(),
            Route::AppDetails { slug } => format!("/apps/{slug}"),
            Route::Projects => "/projects".to_string(),
            Route::Blog => "/blog".to_string(),
            Route::BlogPost { slug } => format!("/blog/{slug}"),
            Route::About => "/about".to_string(),
            Route::Contact => "/contact".to_string(),
            Route::PrivacyPolicy => "/privacy-policy".to_string(),
            Route::Terms => "/terms".to_string(),
            Route::Disclaimer => "/disclaimer".to_string(),
            Route::Admin(route) => format!("{}{}", normalize_prefix(admin_prefix), route.suffix()),
            Route::NotFound => return None,
        };
        Some(path)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path(DEFAULT_ADMIN_PREFIX) {
            Some(path) => f.write_str(&path),
            None => f.write_str("<not found>"),
        }
    }
}

/// Login page under `admin_prefix`.
pub fn login_path(admin_prefix: &str) -> String {
    format!("{}/login", normalize_prefix(admin_prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_routes_resolve() {
        assert_eq!(Route::resolve("/", "/admin"), Route::Home);
        assert_eq!(
            Route::resolve("/apps/pixel-notes?ref=home", "/admin"),
            Route::AppDetails {
                slug: "pixel-notes".to_string()
            }
        );
        assert_eq!(Route::resolve("/privacy-policy/", "/admin"), Route::PrivacyPolicy);
        assert_eq!(Route::resolve("/apps/a/b", "/admin"), Route::NotFound);
    }

    #[test]
    fn admin_routes_honour_prefix_and_sentinel() {
        assert_eq!(
            Route::resolve("/console/apps/new", "console/"),
            Route::Admin(AdminRoute::AppEditor(RecordParam::New))
        );
        assert_eq!(
            Route::resolve("/console", "/console"),
            Route::Admin(AdminRoute::Dashboard)
        );
        assert_eq!(Route::resolve("/admin/apps", "/console"), Route::NotFound);
        assert_eq!(Route::resolve("/console/unknown", "/console"), Route::NotFound);
    }

    #[test]
    fn only_login_is_open() {
        assert!(!Route::resolve("/admin/login", "/admin").requires_session());
        assert!(Route::resolve("/admin/messages", "/admin").requires_session());
        assert!(!Route::resolve("/blog", "/admin").requires_session());
    }

    #[test]
    fn paths_round_trip_through_resolve() {
        let route = Route::Admin(AdminRoute::BlogEditor(RecordParam::Existing(
            "6a1f2c3e".to_string(),
        )));
        let path = route.path("/admin").expect("path");
        assert_eq!(path, "/admin/blog/6a1f2c3e");
        assert_eq!(Route::resolve(&path, "/admin"), route);
        assert_eq!(login_path("admin"), "/admin/login");
    }
}
