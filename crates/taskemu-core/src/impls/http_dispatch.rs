//! Outbound HTTP dispatcher backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::debug;

use crate::domain::{DISPATCH_FAILED, DispatchTarget};
use crate::ports::Dispatcher;

/// Issues each attempt as one HTTP request with the dispatch deadline as its
/// total timeout. Response bodies are discarded.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: Client,
}

impl HttpDispatcher {
    pub fn new(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, target: &DispatchTarget, deadline: Duration) -> i32 {
        let url = target.url();
        let method = match Method::from_bytes(target.http_method().as_str().as_bytes()) {
            Ok(method) => method,
            Err(err) => {
                debug!(%url, error = %err, "invalid http method");
                return DISPATCH_FAILED;
            }
        };

        let mut request = self
            .client
            .request(method, &url)
            .timeout(deadline)
            .body(target.body().to_vec());
        for (name, value) in target.headers() {
            request = request.header(name.as_str(), value.as_str());
        }

        match request.send().await {
            Ok(response) => i32::from(response.status().as_u16()),
            Err(err) => {
                debug!(%url, error = %err, "dispatch failed");
                DISPATCH_FAILED
            }
        }
    }
}
