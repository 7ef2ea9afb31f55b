//! Exposure events and their wire shapes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::PayloadShape;
use crate::context::ContextAttributes;
use crate::decision::ExperimentResult;

/// Event name sent for every exposure.
pub const EXPOSURE_EVENT: &str = "$experiment_started";

/// One experiment exposure. The insert id is fixed at creation so every
/// delivery attempt of the same event carries it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExposureEvent {
    pub experiment_key: String,
    pub variation_id: String,
    pub variation_value: Value,
    pub distinct_id: Option<String>,
    pub url: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
    pub insert_id: Uuid,
}

impl ExposureEvent {
    pub fn new(context: &ContextAttributes, experiment: &ExperimentResult) -> Self {
        Self {
            experiment_key: experiment.key.clone(),
            variation_id: experiment.variation_id.to_string(),
            variation_value: experiment.value.clone(),
            distinct_id: context.distinct_id().map(str::to_string),
            url: context.url.clone(),
            user_agent: context.user_agent.clone(),
            timestamp: Utc::now(),
            insert_id: Uuid::new_v4(),
        }
    }

    /// Render the POST body.
    pub fn payload(&self, shape: PayloadShape, token: Option<&str>, environment: &str) -> Value {
        let mut properties = json!({
            "Experiment name": self.experiment_key,
            "Variant name": self.variation_id,
            "variation_value": self.variation_value,
            "exposure": true,
            "$source": "growthbook",
            "$insert_id": self.insert_id.to_string(),
            "$current_url": self.url,
            "time": self.timestamp.timestamp_millis(),
            "environment": environment,
        });

        if let Some(props) = properties.as_object_mut() {
            if let Some(token) = token {
                props.insert("token".into(), Value::from(token));
            }
            if let Some(id) = &self.distinct_id {
                props.insert("distinct_id".into(), Value::from(id.as_str()));
            }
            if !self.user_agent.is_empty() {
                props.insert("$user_agent".into(), Value::from(self.user_agent.as_str()));
            }
        }

        let event = json!({
            "event": EXPOSURE_EVENT,
            "properties": properties,
        });

        match shape {
            PayloadShape::Batch => Value::Array(vec![event]),
            PayloadShape::Object => event,
        }
    }
}
