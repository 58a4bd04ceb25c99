use clap::Args;

use super::super::{Ctx, print_json};
use crate::core::{CoreError, Timestamp, generate_id};
use crate::Result;

#[derive(Args, Debug)]
pub struct IdArgs {
    /// Id the authoring tool assigned to the entry.
    #[arg(long, value_name = "ID")]
    pub original_id: String,

    /// Creation time, RFC 3339 or compact `YYYYMMDDTHHMMSS.fffffffffZ`.
    #[arg(long, value_name = "TIME")]
    pub created_at: String,
}

pub(crate) fn handle(ctx: &Ctx, args: IdArgs) -> Result<i32> {
    let created_at = Timestamp::parse_rfc3339(&args.created_at)
        .or_else(|_| Timestamp::parse_compact(&args.created_at))?;
    let host = ctx.config.host();
    let id = generate_id(&host, &args.original_id, created_at).map_err(CoreError::from)?;

    if ctx.json {
        print_json(&serde_json::json!({
            "id": id,
            "source_host": host,
            "original_id": args.original_id,
            "created_at": created_at,
        }))?;
    } else {
        println!("{id}");
    }
    Ok(0)
}
