//! Per-call request context shared between the model server and the handlers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use http::StatusCode;

/// What a model server exposes about the batch currently being handled.
///
/// The transformer only reads request properties and writes response metadata back; it
/// never keeps a context beyond the call it was passed to.
pub trait RequestContext {
    /// Model directory announced by the server at worker startup, if any.
    fn model_dir(&self) -> Option<&Path>;

    fn request_ids(&self) -> Vec<String>;

    /// Headers of the request at `index`. Missing indices yield an empty map.
    fn request_properties(&self, index: usize) -> HashMap<String, String>;

    fn set_response_content_type(&mut self, index: usize, content_type: &str);

    fn set_response_status(&mut self, status: StatusCode, phrase: &str);
}

/// One element of a request batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestRecord {
    pub body: Vec<u8>,
}

impl RequestRecord {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        RequestRecord { body: body.into() }
    }
}

/// Headers and recorded response metadata for one request of an [`InvocationContext`].
#[derive(Debug, Clone, Default)]
struct RequestSlot {
    id: String,
    properties: HashMap<String, String>,
    response_content_type: Option<String>,
}

/// In-memory [`RequestContext`] for hosts that drive the transformer directly.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    model_dir: Option<PathBuf>,
    requests: Vec<RequestSlot>,
    status: Option<(StatusCode, String)>,
}

impl InvocationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model_dir(mut self, model_dir: impl Into<PathBuf>) -> Self {
        self.model_dir = Some(model_dir.into());
        self
    }

    /// Adds a request with the given headers; its index is the number of requests added
    /// before it.
    pub fn with_request<I, K, V>(mut self, id: impl Into<String>, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.requests.push(RequestSlot {
            id: id.into(),
            properties: headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            response_content_type: None,
        });
        self
    }

    pub fn response_content_type(&self, index: usize) -> Option<&str> {
        self.requests
            .get(index)
            .and_then(|slot| slot.response_content_type.as_deref())
    }

    pub fn response_status(&self) -> Option<(StatusCode, &str)> {
        self.status
            .as_ref()
            .map(|(status, phrase)| (*status, phrase.as_str()))
    }
}

impl RequestContext for InvocationContext {
    fn model_dir(&self) -> Option<&Path> {
        self.model_dir.as_deref()
    }

    fn request_ids(&self) -> Vec<String> {
        self.requests.iter().map(|slot| slot.id.clone()).collect()
    }

    fn request_properties(&self, index: usize) -> HashMap<String, String> {
        self.requests
            .get(index)
            .map(|slot| slot.properties.clone())
            .unwrap_or_default()
    }

    fn set_response_content_type(&mut self, index: usize, content_type: &str) {
        if self.requests.len() <= index {
            self.requests.resize_with(index + 1, RequestSlot::default);
        }
        self.requests[index].response_content_type = Some(content_type.to_string());
    }

    fn set_response_status(&mut self, status: StatusCode, phrase: &str) {
        self.status = Some((status, phrase.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_response_metadata() {
        let mut context = InvocationContext::new()
            .with_model_dir("/opt/ml/model")
            .with_request("a", [("Accept", "text/csv")]);

        assert_eq!(context.model_dir(), Some(Path::new("/opt/ml/model")));
        assert_eq!(context.request_ids(), vec!["a".to_string()]);
        assert_eq!(
            context.request_properties(0).get("Accept").map(String::as_str),
            Some("text/csv")
        );
        assert!(context.request_properties(3).is_empty());

        context.set_response_content_type(0, "text/csv");
        context.set_response_content_type(2, "application/json");
        context.set_response_status(StatusCode::FORBIDDEN, "Foo");

        assert_eq!(context.response_content_type(0), Some("text/csv"));
        assert_eq!(context.response_content_type(1), None);
        assert_eq!(context.response_content_type(2), Some("application/json"));
        assert_eq!(context.response_status(), Some((StatusCode::FORBIDDEN, "Foo")));
    }
}
