//! Offline access to the local store: ingest files, resolve attachments,
//! and warm representations without going through the HTTP surface.

use std::path::PathBuf;

use {
    anyhow::{Context, Result, bail},
    attache_attachments::{AiPayload, AttachmentInput},
    attache_gateway::GatewayState,
    attache_media::mime,
    attache_store::{RepresentationCache, ResourceStore, TransformDefinition},
    clap::Subcommand,
    tracing::info,
};

#[derive(Subcommand)]
pub enum CacheAction {
    /// Generate a representation now so later reads are hits.
    Ensure {
        /// Resource reference.
        reference: String,
        /// Built-in definition: thumbnail, ai-image, or pdf-pages.
        definition: String,
    },
}

/// Store a local file and print its reference.
pub async fn ingest(state: &GatewayState, file: PathBuf, mime: Option<String>, title: Option<String>) -> Result<()> {
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    if bytes.is_empty() {
        bail!("{} is empty", file.display());
    }

    let mime_type = match mime {
        Some(m) => mime::essence(&m),
        None => mime::sniff_content_type(&bytes)
            .unwrap_or("application/octet-stream")
            .to_string(),
    };
    let title = title
        .or_else(|| file.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| format!("upload.{}", mime::extension_for_mime(&mime_type)));

    let reference = state.store.store(bytes, &mime_type, &title).await?;
    info!(%reference, mime = %mime_type, "ingested resource");
    println!("{reference}");
    Ok(())
}

/// Print the display view, or the AI parts with `ai`.
pub async fn resolve(state: &GatewayState, input: AttachmentInput, ai: bool) -> Result<()> {
    let json = if ai {
        let parts = state
            .resolver
            .resolve_for_ai(&input)
            .await
            .map(AiPayload::into_parts)
            .unwrap_or_default();
        serde_json::json!({ "parts": parts })
    } else {
        serde_json::to_value(state.resolver.view(&input).await)?
    };
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

pub async fn handle_cache(state: &GatewayState, action: CacheAction) -> Result<()> {
    match action {
        CacheAction::Ensure {
            reference,
            definition,
        } => ensure(state, &reference, &definition).await,
    }
}

async fn ensure(state: &GatewayState, reference: &str, name: &str) -> Result<()> {
    let Some(definition) = TransformDefinition::builtin(name) else {
        let known: Vec<_> = TransformDefinition::builtins()
            .iter()
            .map(|(name, _)| *name)
            .collect();
        bail!("unknown definition '{name}' (expected one of: {})", known.join(", "));
    };
    let Some(resource) = state.store.find(reference).await else {
        bail!("resource '{reference}' not found");
    };

    state.cache.ensure(&resource, &definition).await;
    let Some(representation) = state.cache.get(&resource, &definition).await else {
        bail!("could not generate '{name}' for {resource}");
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "ref": resource.as_str(),
            "definition": definition.id(),
            "artifacts": representation.artifacts().len(),
            "url": state.cache.url(&resource, &definition).await,
        }))?
    );
    Ok(())
}
