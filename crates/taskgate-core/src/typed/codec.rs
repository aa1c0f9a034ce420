//! Payload codec - JSON payload と Job 型の相互変換

use serde_json::Value;

use super::job::Job;
use crate::domain::WorkFault;

/// Decode a submitted payload into `J`.
///
/// A missing payload (`null`) decodes as an empty object so jobs whose
/// fields are all optional can be submitted without a body.
pub fn decode_payload<J: Job>(payload: &Value) -> Result<J, WorkFault> {
    let value = match payload {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(value)
        .map_err(|e| WorkFault::new(format!("invalid payload for {}: {e}", J::NAME)))
}

/// Encode a job's output as the stored result.
pub fn encode_output<J: Job>(output: &J::Output) -> Result<Value, WorkFault> {
    serde_json::to_value(output)
        .map_err(|e| WorkFault::new(format!("unserializable result from {}: {e}", J::NAME)))
}

/// Encode a job as a submission payload.
pub fn encode_job<J: Job>(job: &J) -> Result<Value, serde_json::Error> {
    serde_json::to_value(job)
}
