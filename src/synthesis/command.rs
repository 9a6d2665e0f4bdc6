//! Synthesis through an external command.
//!
//! The command receives one JSON request on stdin and answers with one JSON
//! object on stdout:
//!
//! ```json
//! // request
//! {"stage": "GEAR", "model": "...", "aspect_ratio": "1:1", "size_hint": null,
//!  "instructions": "...", "references": [{"mime_type": "image/png", "data": "<base64>"}]}
//! // response
//! {"mime_type": "image/png", "data": "<base64>"}   or   {"error": "quota exceeded"}
//! ```
//!
//! The network call, credentials and model selection all live in that
//! command. There is no timeout here.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::asset::ImageData;
use crate::errors::SynthesisError;
use crate::phase::Stage;

use super::{SynthesisRequest, Synthesizer};

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    stage: Stage,
    model: &'a str,
    aspect_ratio: &'static str,
    size_hint: Option<&'static str>,
    instructions: &'a str,
    references: Vec<WireImage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireImage {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireResponse {
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    cmd: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandSynthesizer {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.cmd
    }
}

fn encode_request(request: &SynthesisRequest) -> Result<Vec<u8>, SynthesisError> {
    let wire = WireRequest {
        stage: request.stage,
        model: &request.params.model,
        aspect_ratio: request.params.aspect_ratio.as_str(),
        size_hint: request.params.size_hint.map(|s| s.as_str()),
        instructions: &request.instructions,
        references: request
            .references
            .iter()
            .map(|img| WireImage {
                mime_type: img.mime_type().to_string(),
                data: B64.encode(img.bytes()),
            })
            .collect(),
    };
    serde_json::to_vec(&wire).map_err(|e| SynthesisError::InvalidResponse(e.to_string()))
}

fn decode_response(stdout: &[u8]) -> Result<ImageData, SynthesisError> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return Err(SynthesisError::EmptyResult);
    }
    let response: WireResponse = serde_json::from_str(text)
        .map_err(|e| SynthesisError::InvalidResponse(format!("not a JSON object: {}", e)))?;

    if let Some(message) = response.error {
        return Err(SynthesisError::Service(message));
    }
    let data = match response.data {
        Some(data) if !data.trim().is_empty() => data,
        _ => return Err(SynthesisError::EmptyResult),
    };
    let bytes = B64
        .decode(data.trim())
        .map_err(|e| SynthesisError::InvalidResponse(format!("bad base64 image data: {}", e)))?;
    if bytes.is_empty() {
        return Err(SynthesisError::EmptyResult);
    }
    let mime = response.mime_type.unwrap_or_else(|| "image/png".to_string());
    Ok(ImageData::new(mime, bytes))
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<ImageData, SynthesisError> {
        let payload = encode_request(request)?;
        debug!(
            cmd = %self.cmd,
            stage = %request.stage,
            references = request.references.len(),
            bytes = payload.len(),
            "spawning synthesis command"
        );

        let mut cmd = Command::new(&self.cmd);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn().map_err(SynthesisError::Spawn)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SynthesisError::Service("synthesis command has no stdin".into()))?;
        let write = async move {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output.map_err(SynthesisError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("'{}' exited with {}", self.cmd, output.status)
            } else {
                stderr
            };
            return Err(SynthesisError::Service(message));
        }
        if let Err(e) = written {
            return Err(SynthesisError::Service(format!(
                "failed to send request to '{}': {}",
                self.cmd, e
            )));
        }

        let image = decode_response(&output.stdout)?;
        debug!(mime = image.mime_type(), bytes = image.len(), "synthesis command returned");
        Ok(image)
    }
}
