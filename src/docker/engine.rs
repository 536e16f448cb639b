// Container engine seam: the operations the client needs from the engine SDK

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::image::{CreateImageOptions, PushImageOptions, TagImageOptions};
use bollard::models::{CreateImageInfo, ProgressDetail, PushImageInfo};
use bollard::Docker;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

use super::jsonmessage::{JsonMessage, JsonProgress};
use super::reference::ImageReference;

/// Stream of progress messages returned by pull and push
pub type MessageStream = BoxStream<'static, Result<JsonMessage, EngineError>>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to connect to container engine: {0}")]
    Connect(#[source] bollard::errors::Error),

    #[error("Container engine returned status {status_code}: {message}")]
    Server { status_code: u16, message: String },

    #[error("Container engine request failed: {0}")]
    Docker(#[source] bollard::errors::Error),
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => EngineError::Server {
                status_code,
                message,
            },
            other => EngineError::Docker(other),
        }
    }
}

/// Image operations of a container engine
///
/// The production implementation talks to the local daemon through bollard;
/// tests substitute a scripted engine.
#[async_trait]
pub trait ImageEngine: Send + Sync {
    /// Pull `image`, streaming the engine's progress messages
    fn pull(&self, image: &ImageReference, credentials: Option<DockerCredentials>)
        -> MessageStream;

    /// Push `image`, streaming the engine's progress messages
    fn push(&self, image: &ImageReference, credentials: Option<DockerCredentials>)
        -> MessageStream;

    /// Add the `target` reference to the local image `source`
    async fn tag(&self, source: &str, target: &ImageReference) -> Result<(), EngineError>;
}

/// Engine backed by the local Docker-compatible daemon
pub struct BollardEngine {
    docker: Docker,
}

impl BollardEngine {
    /// Connect using DOCKER_HOST and friends, then negotiate the API version
    pub async fn connect() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_defaults().map_err(EngineError::Connect)?;
        let docker = docker
            .negotiate_version()
            .await
            .map_err(EngineError::Connect)?;
        debug!("Connected to container engine");
        Ok(Self { docker })
    }
}

#[async_trait]
impl ImageEngine for BollardEngine {
    fn pull(
        &self,
        image: &ImageReference,
        credentials: Option<DockerCredentials>,
    ) -> MessageStream {
        debug!("Pulling {} (tag {})", image.repository, image.api_tag());
        let options = CreateImageOptions {
            from_image: image.repository.clone(),
            tag: image.api_tag().to_string(),
            ..Default::default()
        };

        self.docker
            .create_image(Some(options), None, credentials)
            .map(into_message)
            .boxed()
    }

    fn push(
        &self,
        image: &ImageReference,
        credentials: Option<DockerCredentials>,
    ) -> MessageStream {
        debug!("Pushing {} (tag {})", image.repository, image.tag_or_default());
        let options = PushImageOptions {
            tag: image.tag_or_default().to_string(),
        };

        self.docker
            .push_image(&image.repository, Some(options), credentials)
            .map(into_message)
            .boxed()
    }

    async fn tag(&self, source: &str, target: &ImageReference) -> Result<(), EngineError> {
        debug!("Tagging {} as {}", source, target);
        let options = TagImageOptions {
            repo: target.repository.clone(),
            tag: target.tag_or_default().to_string(),
        };
        self.docker.tag_image(source, Some(options)).await?;
        Ok(())
    }
}

/// Stream errors reported in-band become protocol messages; everything else
/// is an engine failure.
fn into_message<T: Into<JsonMessage>>(
    item: Result<T, bollard::errors::Error>,
) -> Result<JsonMessage, EngineError> {
    match item {
        Ok(info) => Ok(info.into()),
        Err(bollard::errors::Error::DockerStreamError { error }) => Ok(JsonMessage {
            error: Some(error),
            ..Default::default()
        }),
        Err(err) => Err(err.into()),
    }
}

impl From<ProgressDetail> for JsonProgress {
    fn from(detail: ProgressDetail) -> Self {
        Self {
            current: detail.current,
            total: detail.total,
        }
    }
}

impl From<CreateImageInfo> for JsonMessage {
    fn from(info: CreateImageInfo) -> Self {
        Self {
            id: info.id,
            status: info.status,
            progress: info.progress,
            progress_detail: info.progress_detail.map(Into::into),
            error: info.error,
            ..Default::default()
        }
    }
}

impl From<PushImageInfo> for JsonMessage {
    fn from(info: PushImageInfo) -> Self {
        Self {
            status: info.status,
            progress: info.progress,
            progress_detail: info.progress_detail.map(Into::into),
            error: info.error,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_band_stream_error_becomes_message() {
        let item: Result<CreateImageInfo, _> = Err(bollard::errors::Error::DockerStreamError {
            error: "toomanyrequests: rate limit exceeded".to_string(),
        });
        let message = into_message(item).unwrap();
        let error = message.json_error().unwrap();
        assert_eq!(error.message, "toomanyrequests: rate limit exceeded");
        assert_eq!(error.code, 0);
    }

    #[test]
    fn test_server_error_becomes_engine_error() {
        let item: Result<CreateImageInfo, _> =
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message: "pull access denied for nope".to_string(),
            });
        match into_message(item) {
            Err(EngineError::Server {
                status_code,
                message,
            }) => {
                assert_eq!(status_code, 404);
                assert_eq!(message, "pull access denied for nope");
            }
            other => panic!("expected server error, got {:?}", other),
        }
    }

    #[test]
    fn test_create_image_info_conversion_keeps_content() {
        let info = CreateImageInfo {
            id: Some("a258b2a6b59a".to_string()),
            status: Some("Downloading".to_string()),
            progress: Some("[=>    ] 1MB/3MB".to_string()),
            progress_detail: Some(ProgressDetail {
                current: Some(1_000_000),
                total: Some(3_000_000),
            }),
            ..Default::default()
        };
        let message = JsonMessage::from(info);
        assert_eq!(message.id.as_deref(), Some("a258b2a6b59a"));
        assert_eq!(message.status.as_deref(), Some("Downloading"));
        assert_eq!(message.progress.as_deref(), Some("[=>    ] 1MB/3MB"));
        assert_eq!(
            message.progress_detail,
            Some(JsonProgress {
                current: Some(1_000_000),
                total: Some(3_000_000),
            })
        );
        assert!(message.json_error().is_none());
    }
}
