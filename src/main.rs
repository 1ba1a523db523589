//! Proof pipeline service entry point.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zkvote_pipeline::server::run().await
}
