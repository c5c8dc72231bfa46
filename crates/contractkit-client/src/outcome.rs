//! Response interpretation.

use contractkit_core::{SchemaError, SchemaRef};
use contractkit_protocol::ErrorBody;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TransportError;
use crate::transport::RawResponse;

/// Result of a call that reached the transport.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    /// 2xx with a body matching the response schema.
    Success { data: Value, response: RawResponse },
    Failure(CallFailure),
}

/// Why a call did not succeed.
#[derive(Debug, Clone)]
pub enum CallFailure {
    /// Non-2xx status (`response` is set) or no response at all.
    Transport {
        response: Option<RawResponse>,
        message: String,
    },
    /// 2xx whose body does not match the response schema.
    ResponseSchemaMismatch {
        response: RawResponse,
        error: SchemaError,
    },
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Validated response data, on success.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Failure(_) => None,
        }
    }

    /// Deserializes the response data into `T`. `None` on failure.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<serde_json::Result<T>> {
        self.data().map(|data| T::deserialize(data))
    }

    pub fn failure(&self) -> Option<&CallFailure> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// The raw response, if one came back.
    pub fn response(&self) -> Option<&RawResponse> {
        match self {
            Self::Success { response, .. } => Some(response),
            Self::Failure(failure) => failure.response(),
        }
    }

    /// HTTP status, if a response came back.
    pub fn status(&self) -> Option<u16> {
        self.response().map(|response| response.status)
    }

    /// Converts into a `Result`, keeping the data on success.
    pub fn into_result(self) -> Result<Value, CallFailure> {
        match self {
            Self::Success { data, .. } => Ok(data),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl CallFailure {
    pub fn response(&self) -> Option<&RawResponse> {
        match self {
            Self::Transport { response, .. } => response.as_ref(),
            Self::ResponseSchemaMismatch { response, .. } => Some(response),
        }
    }

    /// Decodes a contractkit error body from the response, if it is one.
    pub fn error_body(&self) -> Option<ErrorBody> {
        let response = self.response()?;
        serde_json::from_slice(&response.body).ok()
    }

    /// One-line description.
    pub fn message(&self) -> String {
        match self {
            Self::Transport { message, .. } => message.clone(),
            Self::ResponseSchemaMismatch { error, .. } => {
                format!("response does not match schema: {}", error)
            }
        }
    }
}

/// Interprets what the transport returned against the response schema.
pub fn interpret(
    sent: Result<RawResponse, TransportError>,
    response_schema: &SchemaRef,
) -> CallOutcome {
    let response = match sent {
        Ok(response) => response,
        Err(e) => {
            return CallOutcome::Failure(CallFailure::Transport {
                response: None,
                message: e.to_string(),
            });
        }
    };

    if !response.is_success() {
        let message = match serde_json::from_slice::<ErrorBody>(&response.body) {
            Ok(body) => format!("HTTP {}: {}", response.status, body.error),
            Err(_) => format!("HTTP {}", response.status),
        };
        return CallOutcome::Failure(CallFailure::Transport {
            response: Some(response),
            message,
        });
    }

    // An empty 2xx body reads as null.
    let decoded = if response.body.is_empty() {
        Ok(Value::Null)
    } else {
        response.json()
    };
    let value = match decoded {
        Ok(value) => value,
        Err(e) => {
            return CallOutcome::Failure(CallFailure::Transport {
                message: format!("invalid JSON response: {}", e),
                response: Some(response),
            });
        }
    };

    match response_schema.parse(&value) {
        Ok(data) => CallOutcome::Success { data, response },
        Err(error) => CallOutcome::Failure(CallFailure::ResponseSchemaMismatch { response, error }),
    }
}
