//! tinyirrd - IRR mirror and as-set expansion daemon.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tinyirr_srv::run().await
}
