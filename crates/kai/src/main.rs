use std::sync::Arc;

use kai_core::config::Config;
use kai_reply::HttpReplyClient;

#[tokio::main]
async fn main() -> Result<(), kai_core::Error> {
    kai_core::logging::init("kai")?;

    let cfg = Arc::new(Config::load()?);
    let replies = Arc::new(HttpReplyClient::new(
        cfg.reply_url.clone(),
        cfg.reply_timeout,
    )?);

    kai_bridge::router::run_stdio(cfg, replies)
        .await
        .map_err(|e| kai_core::Error::External(format!("bridge failed: {e:#}")))?;

    Ok(())
}
