use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    reconnet::run().await
}
