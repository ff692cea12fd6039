use storefront::system::System;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	System::run().await
}
