// src/broadcast/mod.rs
pub mod sns;

use std::collections::BTreeMap;

use crate::error::{EncodingError, PublishError};
use crate::fingerprint::canonical_bytes;
use crate::listen::types::Activity;

pub const ATTR_CATEGORY: &str = "category";
pub const ATTR_PRIMARY_TYPE: &str = "primaryType";
pub const ATTR_SECONDARY_TYPE: &str = "secondaryType";

const EOL: u8 = b'\n';

/// What gets handed to the sink for one activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityMessage {
    /// Canonical activity JSON, newline terminated.
    pub body: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
}

impl ActivityMessage {
    pub fn from_activity(activity: &Activity) -> Result<Self, EncodingError> {
        let mut body = canonical_bytes(activity)?;
        body.push(EOL);

        let attributes = BTreeMap::from([
            (ATTR_CATEGORY.to_string(), activity.category.clone()),
            (ATTR_PRIMARY_TYPE.to_string(), activity.primary_type.clone()),
            (
                ATTR_SECONDARY_TYPE.to_string(),
                activity.secondary_type.clone(),
            ),
        ]);

        Ok(Self { body, attributes })
    }

    pub fn body_str(&self) -> Result<&str, EncodingError> {
        std::str::from_utf8(&self.body).map_err(|e| EncodingError(e.to_string()))
    }
}

/// Best-effort pub/sub topic. `Ok` only means the publish call succeeded.
#[async_trait::async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, msg: &ActivityMessage) -> Result<(), PublishError>;

    fn name(&self) -> &'static str;
}
