//! Write events and the query keys each one makes stale.
//!
//! Every admin command names the event it produces; the plan for that event
//! is the ordered list of key prefixes handed to `QueryCache::mutate`.

use std::fmt;

use crate::query::QueryKey;

use super::queries::keys;

/// A successful write, by the data it touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEvent {
    /// An app (and its image set) was created, updated or deleted.
    AppWritten,
    ProjectWritten,
    BlogPostWritten,
    SiteStatsWritten,
    /// A message was marked read or deleted by the admin.
    MessageWritten,
    /// A visitor submitted the public contact form.
    ContactSubmitted,
    /// A file was uploaded; no query reads storage listings.
    Uploaded,
}

impl WriteEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteEvent::AppWritten => "app_written",
            WriteEvent::ProjectWritten => "project_written",
            WriteEvent::BlogPostWritten => "blog_post_written",
            WriteEvent::SiteStatsWritten => "site_stats_written",
            WriteEvent::MessageWritten => "message_written",
            WriteEvent::ContactSubmitted => "contact_submitted",
            WriteEvent::Uploaded => "uploaded",
        }
    }
}

impl fmt::Display for WriteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys and key prefixes invalidated after `event`, in invalidation order.
pub fn plan(event: WriteEvent) -> Vec<QueryKey> {
    let roots: &[&str] = match event {
        WriteEvent::AppWritten => &[
            keys::ADMIN_APPS,
            keys::APPS,
            keys::FEATURED_APPS,
            keys::APP,
            keys::APP_IMAGES,
            keys::ADMIN_APP,
            keys::ADMIN_APP_IMAGES,
            keys::ADMIN_STATS,
        ],
        WriteEvent::ProjectWritten => &[
            keys::ADMIN_PROJECTS,
            keys::PROJECTS,
            keys::ADMIN_PROJECT,
            keys::ADMIN_STATS,
        ],
        WriteEvent::BlogPostWritten => &[
            keys::ADMIN_BLOG_POSTS,
            keys::BLOG_POSTS,
            keys::BLOG_POST,
            keys::ADMIN_BLOG_POST,
            keys::ADMIN_STATS,
        ],
        WriteEvent::SiteStatsWritten => &[
            keys::ADMIN_SITE_STATS,
            keys::SITE_STATS,
            keys::ADMIN_STATS,
        ],
        WriteEvent::MessageWritten | WriteEvent::ContactSubmitted => {
            &[keys::ADMIN_MESSAGES, keys::ADMIN_STATS]
        }
        WriteEvent::Uploaded => &[],
    };
    roots.iter().map(|root| QueryKey::root(root)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots(event: WriteEvent) -> Vec<String> {
        plan(event)
            .iter()
            .map(|key| key.family().to_string())
            .collect()
    }

    #[test]
    fn app_writes_refresh_public_and_admin_reads() {
        let plan = plan(WriteEvent::AppWritten);
        assert!(plan.iter().any(|key| key == &keys::apps()));
        assert!(plan.iter().any(|key| key == &keys::admin_apps()));
        assert!(
            plan.iter()
                .any(|key| key.is_prefix_of(&keys::app("pixel-notes")))
        );
        assert!(
            plan.iter()
                .any(|key| key.is_prefix_of(&keys::admin_app_images("any-id")))
        );
        assert!(!plan.iter().any(|key| key.is_prefix_of(&keys::projects())));
    }

    #[test]
    fn every_write_refreshes_the_dashboard_except_uploads() {
        for event in [
            WriteEvent::AppWritten,
            WriteEvent::ProjectWritten,
            WriteEvent::BlogPostWritten,
            WriteEvent::SiteStatsWritten,
            WriteEvent::MessageWritten,
            WriteEvent::ContactSubmitted,
        ] {
            assert!(
                roots(event).iter().any(|root| root == keys::ADMIN_STATS),
                "{event} should refresh the dashboard"
            );
        }
        assert!(plan(WriteEvent::Uploaded).is_empty());
    }

    #[test]
    fn messages_plan_is_ordered() {
        assert_eq!(
            roots(WriteEvent::ContactSubmitted),
            [keys::ADMIN_MESSAGES, keys::ADMIN_STATS]
        );
    }
}
