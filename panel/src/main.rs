mod clock;
mod server;
mod session;
mod settings;
mod store;
mod views;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    server::run().await
}
