use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    promptrelay_cli::cli::app::run().await
}
