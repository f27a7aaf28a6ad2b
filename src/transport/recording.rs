//! In-memory transport that records publishes instead of sending them

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::{QoS, Transport};
use crate::{Error, Result};

/// A publish captured by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Published {
    /// Payload decoded as JSON, `Null` if it is not JSON
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.payload).unwrap_or_default()
    }

    /// Payload as text
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Transport standing in for a broker
#[derive(Debug, Default)]
pub struct RecordingTransport {
    published: Mutex<Vec<Published>>,
    fail: bool,
}

impl RecordingTransport {
    /// A transport whose every publish fails with `Transport`
    #[must_use]
    pub fn failing() -> Self {
        Self {
            published: Mutex::default(),
            fail: true,
        }
    }

    /// Everything published so far, in order
    #[must_use]
    pub fn published(&self) -> Vec<Published> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn publish(&self, topic: &str, _qos: QoS, _retain: bool, payload: Vec<u8>) -> Result<()> {
        if self.fail {
            return Err(Error::Transport("not connected".to_string()));
        }
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Published {
                topic: topic.to_string(),
                payload,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_in_order() {
        let transport = RecordingTransport::default();
        transport
            .publish("a", QoS::AtLeastOnce, false, b"1".to_vec())
            .await
            .unwrap();
        transport
            .publish("b", QoS::AtLeastOnce, false, br#"{"x":1}"#.to_vec())
            .await
            .unwrap();

        let published = transport.published();
        assert_eq!(published[0].text(), "1");
        assert_eq!(published[1].topic, "b");
        assert_eq!(published[1].json()["x"], 1);
    }

    #[tokio::test]
    async fn failing_records_nothing() {
        let transport = RecordingTransport::failing();
        assert!(
            transport
                .publish("a", QoS::AtLeastOnce, false, Vec::new())
                .await
                .is_err()
        );
        assert!(transport.published().is_empty());
    }
}
