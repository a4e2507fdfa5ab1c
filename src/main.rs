#[tokio::main]
async fn main() -> anyhow::Result<()> {
    workday_lib::run().await
}
