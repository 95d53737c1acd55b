//! HTTP adapter for the conversational reply service.
//!
//! `GET <url>?prompt=..&personid=..[&groupid=..]`, answered with `{"reply": "..."}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use kai_core::{
    errors::Error,
    ports::{ReplyClient, ReplyRequest},
    Result,
};

#[derive(Clone, Debug)]
pub struct HttpReplyClient {
    url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ReplyBody {
    #[serde(default)]
    reply: Option<String>,
}

impl HttpReplyClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("reply http client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }

    fn request(&self, req: &ReplyRequest) -> reqwest::RequestBuilder {
        let mut query = vec![
            ("prompt", req.prompt.as_str()),
            ("personid", req.person_id.as_str()),
        ];
        if let Some(group) = &req.group_id {
            query.push(("groupid", group.as_str()));
        }
        self.http.get(&self.url).query(&query)
    }
}

/// Extract the `reply` field; missing, blank or malformed bodies are errors.
fn parse_reply(body: &str) -> Result<String> {
    let parsed: ReplyBody = serde_json::from_str(body)
        .map_err(|e| Error::External(format!("reply json error: {e}")))?;
    match parsed.reply {
        Some(r) if !r.trim().is_empty() => Ok(r),
        _ => Err(Error::External(
            "reply service response has no reply".to_string(),
        )),
    }
}

#[async_trait]
impl ReplyClient for HttpReplyClient {
    async fn reply(&self, req: ReplyRequest) -> Result<String> {
        let resp = self
            .request(&req)
            .send()
            .await
            .map_err(|e| Error::External(format!("reply request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("reply body error: {e}")))?;
        if !status.is_success() {
            return Err(Error::External(format!(
                "reply service failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        debug!(person = %req.person_id, bytes = body.len(), "reply received");
        parse_reply(&body)
    }
}
