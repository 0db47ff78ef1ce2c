use ams_datasource::cli::{actions::run, start};
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let (action, _guard) = start()?;

    run::handle(action).await?;

    Ok(())
}
