#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gold_tracker_lib::run().await
}
