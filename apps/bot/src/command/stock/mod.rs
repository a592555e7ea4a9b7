mod analyze;

use crate::{Context, Error};
use analyze::analyze;

#[poise::command(slash_command, rename = "stock", subcommands("analyze"))]
pub async fn stock_command(_: Context<'_>) -> Result<(), Error> {
    Ok(())
}
