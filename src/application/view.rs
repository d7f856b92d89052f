//! View models derived from query state.
//!
//! An empty list and a missing row are ordinary outcomes with their own
//! placeholder text; only a failed fetch is an error, and it keeps whatever
//! data the page showed before.

use std::sync::Arc;

use serde::Serialize;

use crate::query::{QueryState, QueryStatus};

/// Headline and hint shown instead of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placeholder {
    pub title: &'static str,
    pub hint: &'static str,
}

impl Placeholder {
    /// Same headline, with the hint shown when a search matched nothing.
    pub fn for_search(self, query: &str) -> Self {
        if query.trim().is_empty() {
            self
        } else {
            Self {
                hint: placeholders::NO_SEARCH_RESULTS,
                ..self
            }
        }
    }
}

pub mod placeholders {
    use super::Placeholder;

    pub const NO_APPS: Placeholder = Placeholder {
        title: "No Apps Found",
        hint: "Apps will appear here once added.",
    };
    pub const NO_APPS_ADMIN: Placeholder = Placeholder {
        title: "No Apps Found",
        hint: "Get started by adding your first app",
    };
    pub const NO_PROJECTS: Placeholder = Placeholder {
        title: "No Projects Yet",
        hint: "Projects will appear here once added.",
    };
    pub const NO_PROJECTS_ADMIN: Placeholder = Placeholder {
        title: "No Projects Found",
        hint: "Get started by adding your first project",
    };
    pub const NO_POSTS: Placeholder = Placeholder {
        title: "No Posts Yet",
        hint: "Blog posts will appear here once published.",
    };
    pub const NO_POSTS_ADMIN: Placeholder = Placeholder {
        title: "No Posts Found",
        hint: "Get started by writing your first post",
    };
    pub const NO_SCREENSHOTS: Placeholder = Placeholder {
        title: "No Screenshots",
        hint: "Screenshots will appear here once added.",
    };
    pub const NO_MESSAGES: Placeholder = Placeholder {
        title: "No Messages",
        hint: "Messages from the contact form will appear here.",
    };
    pub const NO_SEARCH_RESULTS: &str = "Try a different search term";
    pub const APP_NOT_FOUND: Placeholder = Placeholder {
        title: "App Not Found",
        hint: "The app you're looking for doesn't exist.",
    };
    pub const POST_NOT_FOUND: Placeholder = Placeholder {
        title: "Post Not Found",
        hint: "The blog post you're looking for doesn't exist.",
    };
    pub const PROJECT_NOT_FOUND: Placeholder = Placeholder {
        title: "Project Not Found",
        hint: "The project you're looking for doesn't exist.",
    };
    pub const STATS_NOT_FOUND: Placeholder = Placeholder {
        title: "No Statistics",
        hint: "Site statistics have not been recorded yet.",
    };
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    /// Loading with nothing to show yet.
    Loading,
    Empty,
    NotFound,
    Ready(Arc<T>),
    Failed {
        message: String,
        stale: Option<Arc<T>>,
    },
}

impl<T> ViewState<T> {
    /// Derive from a query whose payload is shown as is.
    pub fn from_state(state: &QueryState<T>) -> Self {
        Self::derive(state, |data| Ok(Arc::clone(data)))
    }

    fn derive(
        state: &QueryState<T>,
        classify: impl Fn(&Arc<T>) -> Result<Arc<T>, ViewState<T>>,
    ) -> Self {
        match state.status {
            QueryStatus::Error => ViewState::Failed {
                message: state
                    .error_message()
                    .unwrap_or_else(|| "request failed".to_string()),
                stale: state.data.clone(),
            },
            QueryStatus::Success | QueryStatus::Loading | QueryStatus::Idle => {
                match state.data.as_ref() {
                    Some(data) => classify(data).map_or_else(|view| view, ViewState::Ready),
                    None if state.status == QueryStatus::Success => ViewState::NotFound,
                    None => ViewState::Loading,
                }
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            ViewState::Ready(data) => Some(&**data),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl Fn(&T) -> U) -> ViewState<U> {
        match self {
            ViewState::Loading => ViewState::Loading,
            ViewState::Empty => ViewState::Empty,
            ViewState::NotFound => ViewState::NotFound,
            ViewState::Ready(data) => ViewState::Ready(Arc::new(f(&data))),
            ViewState::Failed { message, stale } => ViewState::Failed {
                message,
                stale: stale.map(|data| Arc::new(f(&data))),
            },
        }
    }

    /// JSON shape returned by the HTTP surface.
    pub fn body(&self, placeholder: Placeholder) -> ViewBody<'_, T> {
        let (state, data, message, placeholder) = match self {
            ViewState::Loading => ("loading", None, None, None),
            ViewState::Empty => ("empty", None, None, Some(placeholder)),
            ViewState::NotFound => ("not_found", None, None, Some(placeholder)),
            ViewState::Ready(data) => ("ready", Some(data.as_ref()), None, None),
            ViewState::Failed { message, stale } => {
                ("error", stale.as_deref(), Some(message.as_str()), None)
            }
        };
        ViewBody {
            state,
            data,
            message,
            placeholder,
        }
    }
}

impl<T> ViewState<Vec<T>> {
    /// Lists: a successful empty result is `Empty`.
    pub fn from_list(state: &QueryState<Vec<T>>) -> Self {
        Self::derive(state, |rows| {
            if rows.is_empty() {
                Err(ViewState::Empty)
            } else {
                Ok(Arc::clone(rows))
            }
        })
    }
}

impl<T: Clone> ViewState<Vec<T>> {
    /// Narrow loaded rows; nothing left over reads as `Empty`.
    pub fn narrow(self, keep: impl Fn(&[T]) -> Vec<&T>) -> Self {
        match self.map(|rows| keep(rows).into_iter().cloned().collect::<Vec<_>>()) {
            ViewState::Ready(rows) if rows.is_empty() => ViewState::Empty,
            view => view,
        }
    }
}

impl<T: Clone> ViewState<T> {
    /// Maybe-single lookups: a successful `None` is `NotFound`.
    pub fn from_single(state: &QueryState<Option<T>>) -> Self {
        match ViewState::from_state(state) {
            ViewState::Loading => ViewState::Loading,
            ViewState::Empty | ViewState::NotFound => ViewState::NotFound,
            ViewState::Ready(row) => match row.as_ref() {
                Some(row) => ViewState::Ready(Arc::new(row.clone())),
                None => ViewState::NotFound,
            },
            ViewState::Failed { message, stale } => ViewState::Failed {
                message,
                stale: stale.and_then(|row| row.as_ref().clone().map(Arc::new)),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ViewBody<'a, T> {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<Placeholder>,
}

#[cfg(test)]
mod tests {
    use std::io;

    use serde_json::json;

    use super::*;
    use crate::query::FetchError;

    fn create_state<T>(status: QueryStatus, data: Option<T>) -> QueryState<T> {
        QueryState {
            status,
            data: data.map(Arc::new),
            error: None,
            is_stale: false,
            updated_at: None,
        }
    }

    #[test]
    fn empty_list_is_not_an_error() {
        let state = create_state(QueryStatus::Success, Some(Vec::<u32>::new()));
        let view = ViewState::from_list(&state);
        assert_eq!(view, ViewState::Empty);

        let body = serde_json::to_value(view.body(placeholders::NO_APPS)).expect("json");
        assert_eq!(body["state"], "empty");
        assert_eq!(body["placeholder"]["title"], "No Apps Found");
    }

    #[test]
    fn missing_row_is_not_found() {
        let state = create_state(QueryStatus::Success, Some(None::<String>));
        let view = ViewState::from_single(&state);
        assert_eq!(view, ViewState::NotFound);
        let body = serde_json::to_value(view.body(placeholders::APP_NOT_FOUND)).expect("json");
        assert_eq!(body["placeholder"]["title"], "App Not Found");
    }

    #[test]
    fn narrowing_to_nothing_is_empty() {
        let state = create_state(QueryStatus::Success, Some(vec!["alpha", "beta"]));
        let view = ViewState::from_list(&state);

        let kept = view
            .clone()
            .narrow(|rows| rows.iter().filter(|row| row.starts_with('b')).collect());
        assert_eq!(kept.ready(), Some(&vec!["beta"]));

        let none = view.narrow(|_| Vec::new());
        assert_eq!(none, ViewState::Empty);
        assert_eq!(
            placeholders::NO_APPS.for_search("zzz").hint,
            placeholders::NO_SEARCH_RESULTS
        );
    }

    #[test]
    fn loading_with_previous_data_still_renders_it() {
        let state = create_state(QueryStatus::Loading, Some(vec![1, 2]));
        assert_eq!(ViewState::from_list(&state).ready(), Some(&vec![1, 2]));

        let empty: QueryState<Vec<u32>> = create_state(QueryStatus::Loading, None);
        assert!(ViewState::from_list(&empty).is_loading());
    }

    #[test]
    fn failure_keeps_last_known_rows() {
        let mut state = create_state(QueryStatus::Error, Some(vec!["kept"]));
        let error: FetchError = Arc::new(io::Error::other("connection reset"));
        state.error = Some(error);

        let view = ViewState::from_list(&state);
        let body = serde_json::to_value(view.body(placeholders::NO_APPS)).expect("json");
        assert_eq!(
            body,
            json!({ "state": "error", "data": ["kept"], "message": "connection reset" })
        );
    }
}
