//! values / metadata commands - fetch one chart and print one document

use super::{ChartArgs, Context};
use crate::error::Result;
use crate::output::{self, Operation};

pub async fn run(ctx: &Context, operation: Operation, args: &ChartArgs) -> Result<()> {
    let auth = ctx.auth_for(&args.repository_url, args.auth);
    let data = ctx
        .fetcher
        .fetch(&args.repository_url, &args.identity(), auth.as_ref())
        .await?;

    output::print(&output::success(operation, &data));
    Ok(())
}
