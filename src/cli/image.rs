use anyhow::Result;
use tracing::info;

use crate::docker::{DockerCli, ImageEngine};

/// Pull an image and render the engine's progress
pub async fn pull<E: ImageEngine>(client: &mut DockerCli<E>, image: &str) -> Result<()> {
    client.pull_image(image).await?;
    info!("✓ Pulled image '{}'", image);
    Ok(())
}

/// Tag a local image
pub async fn tag<E: ImageEngine>(
    client: &mut DockerCli<E>,
    source: &str,
    target: &str,
) -> Result<()> {
    client.tag_image(source, target).await
}

/// Push an image and render the engine's progress
pub async fn push<E: ImageEngine>(client: &mut DockerCli<E>, image: &str) -> Result<()> {
    client.push_image(image).await?;
    info!("✓ Pushed image '{}'", image);
    Ok(())
}
