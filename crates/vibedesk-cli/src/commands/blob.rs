use std::io::Write;
use std::path::Path;

use vibedesk_core::blob::{BlobKey, BlobStore};

use crate::commands::common::{normalize_identifier, Context};
use crate::error::CliError;

pub async fn run_blob_put(ctx: &Context, key: &str, file: &Path) -> Result<(), CliError> {
    let key = BlobKey::new(normalize_identifier(key)?);
    let bytes = tokio::fs::read(file).await?;

    ctx.blob_store().put(&key, &bytes).await?;
    println!("Stored {} bytes under {key}", bytes.len());
    Ok(())
}

pub async fn run_blob_get(
    ctx: &Context,
    key: &str,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let key = BlobKey::new(normalize_identifier(key)?);
    let bytes = ctx
        .blob_store()
        .get(&key)
        .await?
        .ok_or_else(|| CliError::BlobMissing(key.to_string()))?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &bytes).await?;
            eprintln!("Wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
