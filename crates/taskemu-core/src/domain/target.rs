//! Dispatch targets: what a task calls when it runs.
//!
//! - [`DispatchTarget::Http`]: a full URL.
//! - [`DispatchTarget::AppEngine`]: a routed target. The effective host is
//!   derived from the routing descriptor when the task is created.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::QueueName;

pub const HTTP_USER_AGENT: &str = "Google-Cloud-Tasks";
pub const APP_ENGINE_USER_AGENT: &str = "AppEngine-Google; (+http://code.google.com/appengine)";
const DEFAULT_BODY_CONTENT_TYPE: &str = "application/octet-stream";
const APP_ENGINE_BASE_DOMAIN: &str = "appspot.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HttpMethod {
    #[default]
    HttpMethodUnspecified,
    Post,
    Get,
    Head,
    Put,
    Delete,
    Patch,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            // Unspecified is normalized away at creation; POST is the default.
            HttpMethod::HttpMethodUnspecified | HttpMethod::Post => "POST",
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

/// Header map. Keys keep the caller's spelling; lookups ignore ASCII case.
pub type Headers = BTreeMap<String, String>;

/// Insert `name: value`, replacing any existing header with the same name
/// regardless of case.
pub fn set_header(headers: &mut Headers, name: &str, value: impl Into<String>) {
    headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value.into());
}

pub fn has_header(headers: &Headers, name: &str) -> bool {
    headers.keys().any(|k| k.eq_ignore_ascii_case(name))
}

/// Direct HTTP target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HttpRequest {
    pub url: String,
    #[serde(default)]
    pub http_method: HttpMethod,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: Vec<u8>,
}

/// Routing descriptor of an App Engine target.
///
/// `host` is output only: it is computed from the other fields at creation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppEngineRouting {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub host: String,
}

impl AppEngineRouting {
    /// `[instance.][version.][service.]<base>`.
    ///
    /// `base` is `host_override` when given, otherwise `<project>.appspot.com`.
    /// A scheme on the override stays in front of the prefixes.
    pub fn effective_host(&self, project: &str, host_override: Option<&str>) -> String {
        let base = match host_override.filter(|h| !h.is_empty()) {
            Some(host) => host.to_string(),
            None => format!("{project}.{APP_ENGINE_BASE_DOMAIN}"),
        };
        let (scheme, mut host) = match base.split_once("://") {
            Some((scheme, rest)) => (Some(scheme.to_string()), rest.to_string()),
            None => (None, base),
        };

        for prefix in [&self.service, &self.version, &self.instance] {
            if !prefix.is_empty() {
                host = format!("{prefix}.{host}");
            }
        }

        match scheme {
            Some(scheme) => format!("{scheme}://{host}"),
            None => host,
        }
    }
}

/// Routed (App Engine) target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppEngineHttpRequest {
    #[serde(default)]
    pub http_method: HttpMethod,
    #[serde(default)]
    pub app_engine_routing: Option<AppEngineRouting>,
    #[serde(default)]
    pub relative_uri: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl AppEngineHttpRequest {
    /// Full URL of the call. Hosts without a scheme are reached over https.
    pub fn url(&self) -> String {
        let host = self
            .app_engine_routing
            .as_ref()
            .map(|r| r.host.as_str())
            .unwrap_or_default();
        if host.contains("://") {
            format!("{host}{}", self.relative_uri)
        } else {
            format!("https://{host}{}", self.relative_uri)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchTarget {
    #[serde(rename = "http_request")]
    Http(HttpRequest),
    #[serde(rename = "app_engine_http_request")]
    AppEngine(AppEngineHttpRequest),
}

impl DispatchTarget {
    pub fn http_method(&self) -> HttpMethod {
        match self {
            DispatchTarget::Http(r) => r.http_method,
            DispatchTarget::AppEngine(r) => r.http_method,
        }
    }

    pub fn url(&self) -> String {
        match self {
            DispatchTarget::Http(r) => r.url.clone(),
            DispatchTarget::AppEngine(r) => r.url(),
        }
    }

    pub fn headers(&self) -> &Headers {
        match self {
            DispatchTarget::Http(r) => &r.headers,
            DispatchTarget::AppEngine(r) => &r.headers,
        }
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        match self {
            DispatchTarget::Http(r) => &mut r.headers,
            DispatchTarget::AppEngine(r) => &mut r.headers,
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            DispatchTarget::Http(r) => &r.body,
            DispatchTarget::AppEngine(r) => &r.body,
        }
    }

    /// Prefix of the per-attempt task headers (`X-CloudTasks-QueueName`, ...).
    pub fn task_header_prefix(&self) -> &'static str {
        match self {
            DispatchTarget::Http(_) => "X-CloudTasks-",
            DispatchTarget::AppEngine(_) => "X-AppEngine-",
        }
    }

    /// Fill creation-time defaults: method, forced headers, routed host.
    pub fn normalize(&mut self, queue: &QueueName, host_override: Option<&str>) {
        match self {
            DispatchTarget::Http(r) => {
                if r.http_method == HttpMethod::HttpMethodUnspecified {
                    r.http_method = HttpMethod::Post;
                }
                set_header(&mut r.headers, "User-Agent", HTTP_USER_AGENT);
            }
            DispatchTarget::AppEngine(r) => {
                if r.http_method == HttpMethod::HttpMethodUnspecified {
                    r.http_method = HttpMethod::Post;
                }
                set_header(&mut r.headers, "User-Agent", APP_ENGINE_USER_AGENT);
                if !r.body.is_empty() && !has_header(&r.headers, "Content-Type") {
                    set_header(&mut r.headers, "Content-Type", DEFAULT_BODY_CONTENT_TYPE);
                }

                let routing = r.app_engine_routing.get_or_insert_with(Default::default);
                routing.host = routing.effective_host(queue.project(), host_override);

                if r.relative_uri.is_empty() {
                    r.relative_uri = "/".to_string();
                } else if !r.relative_uri.starts_with('/') {
                    r.relative_uri.insert(0, '/');
                }
            }
        }
    }
}
