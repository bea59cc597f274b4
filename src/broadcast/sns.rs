use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sns::config::Region;
use aws_sdk_sns::types::MessageAttributeValue;
use aws_sdk_sns::Client;
use tracing::{debug, info};

use super::{ActivityMessage, PublishSink};
use crate::error::PublishError;

const STRING_DATA_TYPE: &str = "String";

/// Publishes activity messages to one SNS topic.
pub struct SnsPublisher {
    client: Client,
    topic_arn: String,
}

impl SnsPublisher {
    /// Credentials come from the default AWS provider chain.
    pub async fn new(region: &str, topic_arn: impl Into<String>) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        let topic_arn = topic_arn.into();

        info!(target: "broadcast", %topic_arn, region, "SNS publisher initialized");

        Self {
            client: Client::new(&shared),
            topic_arn,
        }
    }
}

#[async_trait]
impl PublishSink for SnsPublisher {
    async fn publish(&self, msg: &ActivityMessage) -> Result<(), PublishError> {
        let mut req = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(msg.body_str()?);

        for (name, value) in &msg.attributes {
            // SNS refuses empty String attributes; subscribers filter on presence instead.
            if value.is_empty() {
                debug!(target: "broadcast", attribute = %name, "skipping empty attribute");
                continue;
            }
            let attr = MessageAttributeValue::builder()
                .data_type(STRING_DATA_TYPE)
                .string_value(value)
                .build()
                .map_err(|e| PublishError::Rejected(format!("attribute {name}: {e}")))?;
            req = req.message_attributes(name, attr);
        }

        let out = req
            .send()
            .await
            .map_err(|e| PublishError::Rejected(format!("SNS publish failed: {e:?}")))?;

        debug!(
            target: "broadcast",
            message_id = out.message_id().unwrap_or("unknown"),
            "published activity"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sns"
    }
}
