use redis::aio::ConnectionManager;
use tokio::time::{timeout, Duration};

/// Connects to `REDIS_URL` when it is set. `Ok(None)` means caching is disabled.
pub async fn get_redis() -> anyhow::Result<Option<ConnectionManager>> {
    let Some(redis_url) = std::env::var("REDIS_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
    else {
        return Ok(None);
    };

    let client = redis::Client::open(redis_url)?;
    let manager = timeout(Duration::from_secs(5), ConnectionManager::new(client))
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 5 seconds"))??;

    Ok(Some(manager))
}
