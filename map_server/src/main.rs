#[tokio::main]
async fn main() -> std::io::Result<()> {
    map_server::run_with_config().await
}
