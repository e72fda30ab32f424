
use std::{path::Path, sync::Arc};

use crate::{
    error_code::ErrorCode,
    process::{Process, ProcessError},
};

pub(crate) type ArcProber = Arc<dyn MediaProber>;

/// Pixel dimensions of the first stream in a container
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub(crate) struct Dimensions {
    pub(crate) width: i64,
    pub(crate) height: i64,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum FfProbeError {
    #[error("Error in ffprobe process")]
    Process(#[source] ProcessError),

    #[error("Invalid output format")]
    Json(#[source] serde_json::Error),

    #[error("No streams in uploaded media")]
    NoStreams,

    #[error("Invalid file path")]
    Path,
}

impl FfProbeError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Process(e) => e.error_code(),
            Self::Json(_) => ErrorCode::PROBE_OUTPUT,
            Self::NoStreams => ErrorCode::NO_STREAMS,
            Self::Path => ErrorCode::IO_ERROR,
        }
    }

    pub(crate) const fn is_client_error(&self) -> bool {
        // ffprobe bailing or reporting nothing probably means bad input
        matches!(self, Self::NoStreams) || matches!(self, Self::Process(ProcessError::Status(..)))
    }
}

/// Reports the dimensions of a local media file
#[async_trait::async_trait(?Send)]
pub(crate) trait MediaProber: Send + Sync + std::fmt::Debug {
    async fn probe(&self, path: &Path) -> Result<Dimensions, FfProbeError>;
}

#[derive(Debug, serde::Deserialize)]
struct FfProbeOutput {
    #[serde(default)]
    streams: Vec<FfProbeStream>,
}

#[derive(Debug, serde::Deserialize)]
struct FfProbeStream {
    // audio and data streams carry no dimensions
    #[serde(default)]
    width: i64,
    #[serde(default)]
    height: i64,
}

#[derive(Clone, Debug)]
pub(crate) struct FfProbe {
    command: String,
    timeout: u64,
}

impl FfProbe {
    pub(crate) fn new(command: impl Into<String>, timeout: u64) -> Self {
        FfProbe {
            command: command.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait(?Send)]
impl MediaProber for FfProbe {
    #[tracing::instrument(skip(self))]
    async fn probe(&self, path: &Path) -> Result<Dimensions, FfProbeError> {
        let path = path.to_str().ok_or(FfProbeError::Path)?;

        let process = Process::run(
            &self.command,
            &[
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
                path,
            ],
            self.timeout,
        )
        .map_err(FfProbeError::Process)?;

        let output = process.read_to_end().await.map_err(FfProbeError::Process)?;

        let output: FfProbeOutput = serde_json::from_slice(&output).map_err(FfProbeError::Json)?;

        parse_dimensions(output)
    }
}

fn parse_dimensions(output: FfProbeOutput) -> Result<Dimensions, FfProbeError> {
    let FfProbeStream { width, height } = output
        .streams
        .into_iter()
        .next()
        .ok_or(FfProbeError::NoStreams)?;

    Ok(Dimensions { width, height })
}
