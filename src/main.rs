#[tokio::main]
async fn main() {
    pagevoile::start_server().await;
}
