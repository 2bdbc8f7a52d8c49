use api_client::{prime, spawn_refetcher, PullClient};
use cache::{MemoryCache, NotificationFilter, QueryCache, QueryData, QueryKey, QueryState};
use log::*;
use secrecy::SecretString;
use service::{config::Config, logging::Logger};
use sse::{ConnectionManager, Credential, Identity, ReconnectSettings, SseTransport};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config);

    info!(
        "Starting real-time client against {} [{}]",
        config.base_url,
        config.runtime_env()
    );

    let (user_id, access_token) = match (config.user_id(), config.access_token()) {
        (Some(user_id), Some(access_token)) => (user_id.to_string(), access_token),
        _ => {
            error!("Both USER_ID and ACCESS_TOKEN are required to open a session");
            std::process::exit(1);
        }
    };

    let cache = Arc::new(MemoryCache::with_event_capacity(
        config.cache_event_capacity,
    ));
    let fetcher = Arc::new(PullClient::new(
        config.base_url.clone(),
        SecretString::new(access_token.clone()),
    ));
    let refetcher = spawn_refetcher(cache.clone(), fetcher.clone());

    prime(
        cache.as_ref(),
        fetcher.as_ref(),
        &[
            QueryKey::Conversations,
            QueryKey::UnreadNotificationCount,
            QueryKey::Notifications {
                filter: NotificationFilter::All,
                page: 1,
                limit: config.notification_page_size,
            },
        ],
    )
    .await;

    // Open the most recent conversation the way the inbox view would.
    if let Some(QueryData::Conversations(conversations)) = cache.get(&QueryKey::Conversations) {
        if let Some(latest) = conversations.first() {
            let first_page = QueryKey::Messages {
                conversation_id: latest.id.clone(),
                page: 1,
                limit: config.message_page_size,
            };
            prime(cache.as_ref(), fetcher.as_ref(), &[first_page]).await;
        }
    }

    let transport = SseTransport::new(config.base_url.clone(), config.sse_path.clone())
        .with_reconnect(ReconnectSettings {
            initial_delay: config.reconnect_initial_delay(),
            max_delay: config.reconnect_max_delay(),
            backoff_factor: config.reconnect_backoff_factor,
        });
    let manager = ConnectionManager::new(Arc::new(transport), cache.clone());

    let mut status = manager.subscribe_status();
    let mut unread = cache.subscribe(QueryKey::UnreadNotificationCount);

    manager
        .set_identity(Some(Identity::new(user_id, Credential::new(access_token))))
        .await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {e}");
                }
                info!("Shutting down");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                info!("Push connection is {:?}", *status.borrow_and_update());
            }
            state = unread.changed() => match state {
                Some(QueryState { data: Some(QueryData::UnreadCount(count)), .. }) => {
                    info!("Unread notifications: {count}");
                }
                Some(QueryState { stale: true, .. }) => debug!("Unread notification count is stale"),
                Some(_) => {}
                None => break,
            },
        }
    }

    manager.disconnect().await;
    refetcher.abort();
}
