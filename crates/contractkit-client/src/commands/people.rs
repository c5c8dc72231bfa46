//! People command: calls the demo endpoint.

use contractkit_core::schema;
use serde_json::json;

use crate::config::ClientConfig;
use crate::demo;
use crate::error::{ClientError, ClientResult};
use crate::outcome::CallOutcome;
use crate::prepare::CallInput;
use crate::suite::ClientSuite;

/// Builds the suite used by `contractkit people`.
pub fn suite(config: &ClientConfig) -> ClientResult<ClientSuite> {
    let options = config
        .to_options()?
        .with_global_headers(schema::object().field("authorization", schema::string()));
    Ok(ClientSuite::new(demo::registry()?, options))
}

/// Input of one lookup.
pub fn input(first: &str, last: &str, authorization: Option<&str>) -> CallInput {
    let input = CallInput::new().with_paths(json!([first, last]));
    match authorization {
        Some(value) => input.with_headers(json!({ "authorization": value })),
        None => input,
    }
}

/// Calls `getPerson` and prints the outcome as JSON.
pub async fn run(
    config: &ClientConfig,
    first: &str,
    last: &str,
    authorization: Option<&str>,
) -> ClientResult<()> {
    let outcome = suite(config)?
        .call("getPerson", input(first, last, authorization))
        .await?;
    match outcome {
        CallOutcome::Success { data, .. } => {
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
        CallOutcome::Failure(failure) => {
            if let Some(body) = failure.error_body() {
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
            Err(ClientError::CallFailed(failure.message()))
        }
    }
}
