//! Interactive command: delegates to the session loop.

use anyhow::Result;

use crate::session::InteractiveSession;

use super::Ctx;

pub async fn run(ctx: &Ctx) -> Result<()> {
    let catalog = ctx.fetch_catalog().await?;
    let session = InteractiveSession::new(
        ctx.backend.as_ref(),
        &ctx.store,
        &catalog,
        ctx.clustered,
        ctx.dry_run,
        ctx.config.auto_reset_on_exit,
    );
    session.run().await
}
