#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pulsesync::run().await
}
