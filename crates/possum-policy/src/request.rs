//! Request details as delivered by the host runtime, and what we hand back

use possum_tabs::{FrameId, TabId};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    Xmlhttprequest,
    Ping,
    CspReport,
    Media,
    Websocket,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl Header {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    pub url: String,
    pub tab_id: TabId,
    #[serde(default)]
    pub frame_id: FrameId,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<Vec<Header>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Vec<Header>>,
}

impl RequestDetails {
    pub fn new(url: &str, tab_id: TabId, frame_id: FrameId, resource_type: ResourceType) -> Self {
        Self {
            url: url.to_string(),
            tab_id,
            frame_id,
            resource_type,
            request_id: None,
            request_headers: None,
            response_headers: None,
        }
    }

    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    pub fn with_request_headers(mut self, headers: Vec<Header>) -> Self {
        self.request_headers = Some(headers);
        self
    }

    pub fn with_response_headers(mut self, headers: Vec<Header>) -> Self {
        self.response_headers = Some(headers);
        self
    }

    pub fn is_main_frame(&self) -> bool {
        self.resource_type == ResourceType::MainFrame
    }
}

/// Interception stage a request is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BeforeRequest,
    BeforeSendHeaders,
    HeadersReceived,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::BeforeRequest => "before_request",
            Stage::BeforeSendHeaders => "before_send_headers",
            Stage::HeadersReceived => "headers_received",
        }
    }
}

/// Result of one interception stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Leave the request alone
    NoAction,
    Cancel,
    RequestHeaders(Vec<Header>),
    ResponseHeaders(Vec<Header>),
}

impl Verdict {
    /// The blocking-response object a webRequest listener returns, `None` for no action
    pub fn blocking_response(&self) -> Option<serde_json::Value> {
        match self {
            Verdict::NoAction => None,
            Verdict::Cancel => Some(json!({ "cancel": true })),
            Verdict::RequestHeaders(headers) => Some(json!({ "requestHeaders": headers })),
            Verdict::ResponseHeaders(headers) => Some(json!({ "responseHeaders": headers })),
        }
    }
}

/// `Cookie` on requests, `Set-Cookie` (and the legacy `Set-Cookie2`) on responses
pub fn is_cookie_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("cookie")
        || name.eq_ignore_ascii_case("set-cookie")
        || name.eq_ignore_ascii_case("set-cookie2")
}

/// Drop cookie headers, keeping the rest in their original order
pub fn strip_cookies(headers: &[Header]) -> Vec<Header> {
    headers
        .iter()
        .filter(|h| !is_cookie_header(&h.name))
        .cloned()
        .collect()
}
