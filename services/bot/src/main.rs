#[tokio::main]
async fn main() {
    if let Err(err) = gatehouse_bot::run().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}
