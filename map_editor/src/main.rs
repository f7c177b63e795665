#[tokio::main]
async fn main() -> std::io::Result<()> {
    map_editor::run_with_config().await
}
