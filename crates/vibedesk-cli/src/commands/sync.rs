use crate::commands::common::Context;
use crate::error::CliError;

pub async fn run_sync(ctx: &Context) -> Result<(), CliError> {
    let mirror = ctx.open_mirror().await?;
    if !mirror.is_sync_enabled().await {
        return Err(CliError::SyncNotConfigured);
    }

    mirror.refresh().await?;
    println!("Sync completed");
    Ok(())
}
