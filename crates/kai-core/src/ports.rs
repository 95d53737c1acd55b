use async_trait::async_trait;
use serde::Serialize;

use crate::{domain::Identity, Result};

/// Request to the conversational reply service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReplyRequest {
    pub prompt: String,
    pub person_id: Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Identity>,
}

/// Port for the external conversational reply service.
///
/// Any non-success status, malformed payload or missing `reply` is an error; the
/// caller decides what the user sees.
#[async_trait]
pub trait ReplyClient: Send + Sync {
    async fn reply(&self, req: ReplyRequest) -> Result<String>;
}
