mod client;
mod poller;
mod remote;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    poller::run().await
}
