#[tokio::main]
async fn main() -> anyhow::Result<()> {
    review_guard_lib::run().await
}
