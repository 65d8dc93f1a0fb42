use std::sync::Once;
use std::sync::atomic::{AtomicU32, Ordering};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);
static TRACING: Once = Once::new();

pub fn unique_id(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, std::process::id(), id)
}

/// Conversation session key that no other test run shares, even against a
/// long-lived Redis.
pub fn unique_session() -> String {
    format!("session-{}", utils::generate_uuid())
}

/// Install a test subscriber once per process. Honors `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
            )
            .with_test_writer()
            .try_init();
    });
}

pub struct RedisFixture {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    url: String
}

impl RedisFixture {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Drop every key. Tests sharing the fixture run serially around this.
    pub async fn flush(&self) -> Result<(), Box<dyn std::error::Error>> {
        let client = redis::Client::open(self.url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }
}

static REDIS: OnceCell<Option<RedisFixture>> = OnceCell::const_new();

/// Shared Redis container, or `None` when Docker is unavailable.
pub async fn redis() -> Option<&'static RedisFixture> {
    REDIS
        .get_or_init(|| async {
            let container = match Redis::default().start().await {
                Ok(container) => container,
                Err(e) => {
                    tracing::warn!("Failed to start Redis container: {:?}", e);
                    return None;
                }
            };
            let port = match container.get_host_port_ipv4(6379).await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("Failed to get Redis port: {:?}", e);
                    return None;
                }
            };
            let url = format!("redis://localhost:{}", port);

            if let Err(e) = verify_redis_connection(&url).await {
                tracing::warn!("Redis connection verification failed: {:?}", e);
                return None;
            }

            tracing::info!("Redis fixture started on port {}", port);
            Some(RedisFixture { container, url })
        })
        .await
        .as_ref()
}

async fn verify_redis_connection(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = redis::Client::open(url)?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
}
