// Docker client - image pull/tag/push against the local container engine
//
// `DockerCli` bundles an engine connection, the standard streams and the
// registry credentials loaded from config. Every operation streams the
// engine's JSON messages to the output stream through the shared display
// routine in `jsonmessage`.

mod auth;
mod engine;
mod jsonmessage;
mod reference;

pub use auth::AuthMapping;
pub use engine::{BollardEngine, ImageEngine, MessageStream};
pub use jsonmessage::JsonError;
pub use reference::ImageReference;

#[cfg(test)]
pub(crate) use engine::EngineError;
#[cfg(test)]
pub(crate) use jsonmessage::{JsonMessage, JsonProgress};

use anyhow::{bail, Context, Result};
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, error, info};

use crate::config;
use crate::streams::{In, Out, Streams};
use jsonmessage::{aux_image_id, display_json_messages_stream, DisplayError};

/// Client handle for image operations
pub struct DockerCli<E> {
    engine: E,
    #[allow(dead_code)]
    input: In,
    out: Out,
    err: Box<dyn Write + Send>,
    auth: AuthMapping,
}

impl DockerCli<BollardEngine> {
    /// Load credentials from `config_path` and connect to the local engine
    pub async fn connect(config_path: &Path) -> Result<Self> {
        let auth = config::load_auth_mapping(config_path)?;
        let engine = BollardEngine::connect().await?;
        Ok(Self::new(
            engine,
            auth,
            In::stdin(),
            Out::stdout(),
            Box::new(io::stderr()),
        ))
    }
}

impl<E: ImageEngine> DockerCli<E> {
    pub fn new(
        engine: E,
        auth: AuthMapping,
        input: In,
        out: Out,
        err: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            engine,
            input,
            out,
            err,
            auth,
        }
    }

    /// Pull `image` from its registry, rendering progress to the output stream
    pub async fn pull_image(&mut self, image: &str) -> Result<()> {
        let reference = ImageReference::parse(image)?;
        let credentials = self.auth.credentials_for(&reference.to_string());

        info!("Pulling image: {}", reference);
        let stream = self.engine.pull(&reference, credentials);
        self.display(stream)
            .await
            .with_context(|| format!("Failed to pull image '{}'", image))
    }

    /// Tag the local image `image` as `tag`
    pub async fn tag_image(&mut self, image: &str, tag: &str) -> Result<()> {
        let target = ImageReference::parse(tag)?;
        if target.digest.is_some() {
            bail!("Cannot tag an image with a digest reference: '{}'", tag);
        }

        if let Err(e) = self.engine.tag(image, &target).await {
            error!("Failed to tag image {} as {}: {}", image, target, e);
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to tag image '{}' as '{}'", image, tag)));
        }

        info!("Tagged image {} as {}", image, target);
        Ok(())
    }

    /// Push `image` to its registry, rendering progress to the output stream
    pub async fn push_image(&mut self, image: &str) -> Result<()> {
        let reference = ImageReference::parse(image)?;
        if reference.digest.is_some() {
            bail!("Cannot push a digest reference: '{}'", image);
        }
        let credentials = self.auth.credentials_for(&reference.to_string());

        info!("Pushing image: {}", reference);
        let stream = self.engine.push(&reference, credentials);
        self.display(stream)
            .await
            .with_context(|| format!("Failed to push image '{}'", image))
    }

    /// Render an engine message stream, then flush the output.
    ///
    /// A protocol error from the engine is written straight to the error
    /// stream and returned as a [`JsonError`] with a non-zero code.
    async fn display(&mut self, stream: MessageStream) -> Result<()> {
        let is_terminal = self.out().is_terminal();
        let result =
            display_json_messages_stream(stream, self.out(), is_terminal, |out, aux| {
                if let Some(id) = aux_image_id(aux) {
                    writeln!(out, "Image ID: {}", id)?;
                }
                Ok(())
            })
            .await;

        let outcome = match result {
            Ok(()) => Ok(()),
            Err(DisplayError::Json(mut json_error)) => {
                if json_error.code == 0 {
                    json_error.code = 1;
                }
                writeln!(self.err(), "{}", json_error.message)?;
                Err(anyhow::Error::new(json_error))
            }
            Err(e) => Err(e.into()),
        };

        self.out().flush()?;
        debug!("Engine message stream closed");
        outcome
    }
}

impl<E> Streams for DockerCli<E> {
    fn out(&mut self) -> &mut Out {
        &mut self.out
    }

    fn err(&mut self) -> &mut (dyn Write + Send) {
        self.err.as_mut()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{client, EngineCall, FakeEngine, Login};
    use super::*;

    fn registry_auth() -> AuthMapping {
        // base64("ci:secret")
        [("registry.example.com".to_string(), "Y2k6c2VjcmV0".to_string())]
            .into_iter()
            .collect()
    }

    fn pull_log() -> Vec<Result<JsonMessage, EngineError>> {
        vec![
            Ok(JsonMessage {
                id: Some("v1".to_string()),
                status: Some("Pulling from team/app".to_string()),
                ..Default::default()
            }),
            Ok(JsonMessage {
                id: Some("4f4fb700ef54".to_string()),
                status: Some("Downloading".to_string()),
                progress: Some("[==>   ] 32B/64B".to_string()),
                progress_detail: Some(JsonProgress {
                    current: Some(32),
                    total: Some(64),
                }),
                ..Default::default()
            }),
            Ok(JsonMessage {
                id: Some("4f4fb700ef54".to_string()),
                status: Some("Pull complete".to_string()),
                ..Default::default()
            }),
            Ok(JsonMessage::status(
                "Status: Downloaded newer image for registry.example.com/team/app:v1",
            )),
        ]
    }

    #[tokio::test]
    async fn test_pull_streams_messages_with_credentials() {
        let engine = FakeEngine::with_messages(pull_log());
        let (mut cli, out, err) = client(engine.clone(), registry_auth(), false);

        cli.pull_image("registry.example.com/team/app:v1")
            .await
            .unwrap();

        assert_eq!(
            out.contents(),
            "v1: Pulling from team/app\n\
             4f4fb700ef54: Pull complete\n\
             Status: Downloaded newer image for registry.example.com/team/app:v1\n"
        );
        assert_eq!(err.contents(), "");

        match &engine.calls()[..] {
            [EngineCall::Pull { image, credentials }] => {
                assert_eq!(image, "registry.example.com/team/app:v1");
                assert_eq!(
                    credentials,
                    &Some(Login {
                        username: Some("ci".to_string()),
                        password: Some("secret".to_string()),
                    })
                );
            }
            calls => panic!("unexpected calls: {:?}", calls),
        }
    }

    #[tokio::test]
    async fn test_pull_from_unknown_registry_is_anonymous() {
        let engine = FakeEngine::with_messages(vec![Ok(JsonMessage::status("ok"))]);
        let (mut cli, _, _) = client(engine.clone(), registry_auth(), false);

        cli.pull_image("docker.io/library/alpine").await.unwrap();

        assert_eq!(
            engine.calls(),
            vec![EngineCall::Pull {
                image: "docker.io/library/alpine".to_string(),
                credentials: None,
            }]
        );
    }

    #[tokio::test]
    async fn test_pull_protocol_error_defaults_exit_code() {
        let engine = FakeEngine::with_messages(vec![
            Ok(JsonMessage::status("Pulling from team/app")),
            Ok(JsonMessage {
                error: Some("manifest for registry.example.com/team/app:v9 not found".to_string()),
                ..Default::default()
            }),
        ]);
        let (mut cli, out, err) = client(engine, registry_auth(), false);

        let result = cli.pull_image("registry.example.com/team/app:v9").await;

        let error = result.unwrap_err();
        let json_error = error.downcast_ref::<JsonError>().expect("json error");
        assert_eq!(json_error.code, 1);
        assert_eq!(json_error.exit_code(), 1);
        assert_eq!(out.contents(), "Pulling from team/app\n");
        assert_eq!(
            err.contents(),
            "manifest for registry.example.com/team/app:v9 not found\n"
        );
    }

    #[tokio::test]
    async fn test_pull_engine_failure_is_returned() {
        let engine = FakeEngine::with_messages(vec![Err(EngineError::Server {
            status_code: 500,
            message: "daemon unavailable".to_string(),
        })]);
        let (mut cli, _, err) = client(engine, AuthMapping::default(), false);

        let error = cli.pull_image("alpine").await.unwrap_err();
        assert!(error.downcast_ref::<JsonError>().is_none());
        assert!(format!("{:#}", error).contains("daemon unavailable"));
        assert_eq!(err.contents(), "");
    }

    #[tokio::test]
    async fn test_pull_rejects_invalid_reference() {
        let engine = FakeEngine::default();
        let (mut cli, _, _) = client(engine.clone(), AuthMapping::default(), false);

        assert!(cli.pull_image("").await.is_err());
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_push_prints_aux_image_id() {
        let engine = FakeEngine::with_messages(vec![
            Ok(JsonMessage::status(
                "The push refers to repository [registry.example.com/team/app]",
            )),
            Ok(JsonMessage {
                aux: Some(serde_json::json!({ "ID": "sha256:5f70bf18a086" })),
                ..Default::default()
            }),
        ]);
        let (mut cli, out, _) = client(engine.clone(), registry_auth(), false);

        cli.push_image("registry.example.com/team/app:v1")
            .await
            .unwrap();

        assert_eq!(
            out.contents(),
            "The push refers to repository [registry.example.com/team/app]\n\
             Image ID: sha256:5f70bf18a086\n"
        );
        assert!(matches!(
            &engine.calls()[..],
            [EngineCall::Push { credentials: Some(_), .. }]
        ));
    }

    #[tokio::test]
    async fn test_push_rejects_digest_reference() {
        let engine = FakeEngine::default();
        let (mut cli, _, _) = client(engine.clone(), AuthMapping::default(), false);

        let error = cli.push_image("app@sha256:abcd").await.unwrap_err();
        assert!(error.to_string().contains("digest"));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tag_success() {
        let engine = FakeEngine::default();
        let (mut cli, _, _) = client(engine.clone(), AuthMapping::default(), false);

        cli.tag_image("alpine:3.20", "registry.example.com/base/alpine:3.20")
            .await
            .unwrap();

        assert_eq!(
            engine.calls(),
            vec![EngineCall::Tag {
                source: "alpine:3.20".to_string(),
                target: "registry.example.com/base/alpine:3.20".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_tag_failure_is_surfaced() {
        let engine = FakeEngine::failing_tag();
        let (mut cli, _, _) = client(engine, AuthMapping::default(), false);

        let error = cli
            .tag_image("missing:latest", "registry.example.com/missing:latest")
            .await
            .unwrap_err();
        let message = format!("{:#}", error);
        assert!(message.contains("Failed to tag image 'missing:latest'"));
        assert!(message.contains("No such image: missing:latest"));
    }

    #[tokio::test]
    async fn test_pull_trims_reference_before_credential_lookup() {
        let engine = FakeEngine::with_messages(vec![Ok(JsonMessage::status("ok"))]);
        let (mut cli, _, _) = client(engine.clone(), registry_auth(), false);

        cli.pull_image(" registry.example.com/team/app:v1")
            .await
            .unwrap();

        assert_eq!(
            engine.calls(),
            vec![EngineCall::Pull {
                image: "registry.example.com/team/app:v1".to_string(),
                credentials: Some(Login {
                    username: Some("ci".to_string()),
                    password: Some("secret".to_string()),
                }),
            }]
        );
    }

    #[tokio::test]
    async fn test_tag_rejects_digest_target() {
        let engine = FakeEngine::default();
        let (mut cli, _, _) = client(engine.clone(), AuthMapping::default(), false);

        let error = cli
            .tag_image("alpine", "registry.example.com/app@sha256:abcd")
            .await
            .unwrap_err();
        assert!(error.to_string().contains("digest"));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_streams_accessors() {
        let (mut cli, out, err) = client(FakeEngine::default(), AuthMapping::default(), true);

        assert!(cli.out().is_terminal());
        write!(cli.out(), "to out").unwrap();
        write!(cli.err(), "to err").unwrap();

        assert_eq!(out.contents(), "to out");
        assert_eq!(err.contents(), "to err");
    }
}
