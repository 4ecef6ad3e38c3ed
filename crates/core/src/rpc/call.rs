//! Description of one `execute_kw` object call.

use serde::Serialize;
use serde_json::{json, Map, Value};

/// One object call: `model.method(*args, **kwargs)` on the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcCall {
    pub model: String,
    pub method: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl RpcCall {
    pub fn new(model: impl Into<String>, method: impl Into<String>) -> Self {
        Self { model: model.into(), method: method.into(), args: Vec::new(), kwargs: Map::new() }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }

    /// `search_read(domain, fields=..., limit=..., offset=..., order=...)`
    pub fn search_read(model: impl Into<String>, domain: Value, fields: &[&str], options: &SearchOptions) -> Self {
        let mut call = Self::new(model, "search_read").with_args(vec![domain]).with_kwarg("fields", json!(fields));
        if let Some(limit) = options.limit {
            call = call.with_kwarg("limit", json!(limit));
        }
        if options.offset > 0 {
            call = call.with_kwarg("offset", json!(options.offset));
        }
        if let Some(order) = &options.order {
            call = call.with_kwarg("order", json!(order));
        }
        call
    }

    /// `search_count(domain)`
    pub fn search_count(model: impl Into<String>, domain: Value) -> Self {
        Self::new(model, "search_count").with_args(vec![domain])
    }

    /// `model.method`, used as the timeout label and in logs.
    pub fn label(&self) -> String {
        format!("{}.{}", self.model, self.method)
    }
}

/// Paging and ordering for `search_read`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub offset: usize,
    pub order: Option<String>,
}

impl SearchOptions {
    pub fn page(limit: usize, offset: usize) -> Self {
        Self { limit: Some(limit), offset, order: None }
    }

    pub fn ordered(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }
}

/// Progress of a paged batch fetch, sent after every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    /// Records received so far
    pub fetched: usize,
    /// Records matching the domain when the fetch started
    pub total: usize,
    /// One-based number of the page just received
    pub page: usize,
}

impl BatchProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.fetched as f64 * 100.0 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_read_builds_kwargs() {
        let call = RpcCall::search_read(
            "crm.stage",
            json!([]),
            &["id", "name"],
            &SearchOptions::page(100, 200).ordered("sequence asc"),
        );

        assert_eq!(call.label(), "crm.stage.search_read");
        assert_eq!(call.args, vec![json!([])]);
        assert_eq!(call.kwargs["fields"], json!(["id", "name"]));
        assert_eq!(call.kwargs["limit"], json!(100));
        assert_eq!(call.kwargs["offset"], json!(200));
        assert_eq!(call.kwargs["order"], json!("sequence asc"));
    }

    #[test]
    fn test_first_page_omits_offset() {
        let call = RpcCall::search_read("res.users", json!([]), &["id"], &SearchOptions::default());
        assert!(!call.kwargs.contains_key("offset"));
        assert!(!call.kwargs.contains_key("limit"));
    }

    #[test]
    fn test_progress_percent() {
        assert!((BatchProgress { fetched: 250, total: 1000, page: 1 }.percent() - 25.0).abs() < f64::EPSILON);
        assert!((BatchProgress { fetched: 0, total: 0, page: 1 }.percent() - 100.0).abs() < f64::EPSILON);
    }
}
