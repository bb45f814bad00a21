// ============================
// crates/backend-lib/src/execute.rs
// ============================

//! Remote code execution.
//!
//! Rooms share one [`ExecutionEngine`]; the default implementation
//! talks to a Piston-compatible HTTP endpoint. Engine failures never
//! reach the protocol layer as errors: [`run`] folds them into a result
//! whose console output carries the failure text, so the shared console
//! shows what went wrong instead of the room going quiet.

use async_trait::async_trait;
use metrics::counter;
use serde_json::json;
use tracing::warn;

use codesync_common::ExecutionResult;

use crate::config::Settings;
use crate::error::EngineError;
use crate::metrics::{EXECUTION_COMPLETED, EXECUTION_FAILED};

/// One run request as the session layer hands it over.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Editor language tag; translated via [`engine_language`].
    pub language: String,
    /// Engine version constraint. Empty or missing means "any".
    pub version: Option<String>,
    /// Name the snippet runs under. Missing means `"main"`.
    pub file_name: Option<String>,
    /// The code itself.
    pub code: String,
}

/// Maps an editor language tag to the tag the engine expects. The table
/// is currently the identity for every supported language; renames on
/// either side belong here rather than in the protocol layer.
pub fn engine_language(tag: &str) -> &str {
    match tag {
        "javascript" => "javascript",
        "typescript" => "typescript",
        "python" => "python",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        "html" => "html",
        "css" => "css",
        other => other,
    }
}

/// Something that can run a snippet and report its output.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult, EngineError>;
}

/// Client for a Piston-style execution API.
pub struct PistonEngine {
    http: reqwest::Client,
    endpoint: String,
}

impl PistonEngine {
    pub fn new(settings: &Settings) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(settings.execution_timeout())
            .build()?;
        Ok(Self {
            http,
            endpoint: settings.execution_endpoint.clone(),
        })
    }
}

fn request_payload(request: &ExecutionRequest) -> serde_json::Value {
    json!({
        "language": engine_language(&request.language),
        "version": request
            .version
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or("*"),
        "files": [{
            "name": request
                .file_name
                .as_deref()
                .filter(|n| !n.is_empty())
                .unwrap_or("main"),
            "content": request.code,
        }],
    })
}

#[async_trait]
impl ExecutionEngine for PistonEngine {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult, EngineError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request_payload(&request))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}

/// Runs a request to completion. A failing engine produces a synthetic
/// result whose output is prefixed with `Execution Error:`.
pub async fn run(engine: &dyn ExecutionEngine, request: ExecutionRequest) -> ExecutionResult {
    match engine.execute(request).await {
        Ok(result) => {
            counter!(EXECUTION_COMPLETED).increment(1);
            result
        }
        Err(err) => {
            counter!(EXECUTION_FAILED).increment(1);
            warn!(%err, "code execution failed");
            ExecutionResult::from_output(format!("Execution Error: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEngine(ExecutionResult);

    #[async_trait]
    impl ExecutionEngine for FixedEngine {
        async fn execute(&self, _request: ExecutionRequest) -> Result<ExecutionResult, EngineError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenEngine;

    #[async_trait]
    impl ExecutionEngine for BrokenEngine {
        async fn execute(&self, _request: ExecutionRequest) -> Result<ExecutionResult, EngineError> {
            Err(EngineError::Status(503))
        }
    }

    fn request(language: &str) -> ExecutionRequest {
        ExecutionRequest {
            language: language.to_string(),
            version: None,
            file_name: None,
            code: "print('hi')".to_string(),
        }
    }

    #[test]
    fn engine_language_passes_unknown_tags_through() {
        assert_eq!(engine_language("python"), "python");
        assert_eq!(engine_language("cpp"), "cpp");
        assert_eq!(engine_language("brainfuck"), "brainfuck");
    }

    #[test]
    fn payload_defaults_version_and_file_name() {
        let payload = request_payload(&request("python"));
        assert_eq!(payload["language"], "python");
        assert_eq!(payload["version"], "*");
        assert_eq!(payload["files"][0]["name"], "main");
        assert_eq!(payload["files"][0]["content"], "print('hi')");
    }

    #[test]
    fn payload_treats_empty_strings_as_missing() {
        let mut req = request("javascript");
        req.version = Some(String::new());
        req.file_name = Some(String::new());
        let payload = request_payload(&req);
        assert_eq!(payload["version"], "*");
        assert_eq!(payload["files"][0]["name"], "main");

        req.version = Some("18.15.0".to_string());
        req.file_name = Some("index.js".to_string());
        let payload = request_payload(&req);
        assert_eq!(payload["version"], "18.15.0");
        assert_eq!(payload["files"][0]["name"], "index.js");
    }

    #[tokio::test]
    async fn run_passes_successful_results_through() {
        let engine = FixedEngine(ExecutionResult::from_output("hi\n"));
        let result = run(&engine, request("python")).await;
        assert_eq!(result.run.output, "hi\n");
    }

    #[tokio::test]
    async fn run_folds_failures_into_the_output() {
        let result = run(&BrokenEngine, request("python")).await;
        assert_eq!(
            result.run.output,
            "Execution Error: execution engine returned status 503"
        );
        assert!(result.extra.is_empty());
    }
}
