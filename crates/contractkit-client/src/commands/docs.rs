//! Docs command: prints the demo OpenAPI document.

use contractkit_protocol::openapi_document;

use crate::demo;
use crate::error::ClientResult;

pub fn run(base_path: &str) -> ClientResult<()> {
    let document = openapi_document(&demo::registry()?, &demo::api_info(), base_path);
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}
