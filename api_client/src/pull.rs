use crate::error::Error;
use async_trait::async_trait;
use cache::{MessagePage, NotificationPage, QueryData, QueryKey};
use log::*;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Anything that can produce fresh data for a cache entry.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, key: &QueryKey) -> Result<QueryData, Error>;
}

/// Every endpoint wraps its payload in `{ "data": ... }`.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct UnreadCount {
    count: u64,
}

/// Pull-fetch client for the read endpoints backing the cached queries.
pub struct PullClient {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl PullClient {
    pub fn new(base_url: impl Into<String>, token: SecretString) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, token: SecretString) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .query(query)
            .send()
            .await?
            .error_for_status()?;

        let api_response: ApiResponse<T> = response.json().await?;
        Ok(api_response.data)
    }
}

#[async_trait]
impl Fetch for PullClient {
    async fn fetch(&self, key: &QueryKey) -> Result<QueryData, Error> {
        match key {
            QueryKey::Conversations => {
                let conversations = self.get("/conversations", &[]).await?;
                Ok(QueryData::Conversations(conversations))
            }
            QueryKey::Messages {
                conversation_id,
                page,
                limit,
            } => {
                let path = format!("/conversations/{conversation_id}/messages");
                let messages: MessagePage = self
                    .get(
                        &path,
                        &[("page", page.to_string()), ("limit", limit.to_string())],
                    )
                    .await?;
                Ok(QueryData::Messages(messages))
            }
            QueryKey::Notifications {
                filter,
                page,
                limit,
            } => {
                let mut notifications: NotificationPage = self
                    .get(
                        "/notifications",
                        &[
                            ("filter", filter.as_str().to_string()),
                            ("page", page.to_string()),
                            ("limit", limit.to_string()),
                        ],
                    )
                    .await?;
                // The requested page size bounds the entry even if the server omits it.
                notifications.limit.get_or_insert(*limit as usize);
                Ok(QueryData::Notifications(notifications))
            }
            QueryKey::UnreadNotificationCount => {
                let unread: UnreadCount = self.get("/notifications/unread_count", &[]).await?;
                Ok(QueryData::UnreadCount(unread.count))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use cache::NotificationFilter;
    use mockito::Matcher;
    use serde_json::json;

    fn client(server: &mockito::ServerGuard) -> PullClient {
        PullClient::new(server.url(), SecretString::new("token-1".to_string()))
    }

    #[tokio::test]
    async fn test_fetch_conversations_unwraps_envelope() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/conversations")
            .match_header("authorization", "Bearer token-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "data": [
                        { "id": "c1", "updatedAt": "2024-05-01T10:00:00Z", "unreadCount": 2 },
                        { "id": "c2", "updatedAt": "2024-05-01T09:00:00Z" }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let data = client(&server)
            .fetch(&QueryKey::Conversations)
            .await
            .unwrap();

        mock.assert_async().await;
        let QueryData::Conversations(list) = data else {
            panic!("expected conversations");
        };
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].unread_count, 2);
    }

    #[tokio::test]
    async fn test_fetch_notifications_keeps_requested_limit() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/notifications")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("filter".into(), "unread".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
                Matcher::UrlEncoded("limit".into(), "20".into()),
            ]))
            .with_status(200)
            .with_body(json!({ "data": { "notifications": [], "total": 0 } }).to_string())
            .create_async()
            .await;

        let data = client(&server)
            .fetch(&QueryKey::Notifications {
                filter: NotificationFilter::Unread,
                page: 1,
                limit: 20,
            })
            .await
            .unwrap();

        let QueryData::Notifications(page) = data else {
            panic!("expected notifications");
        };
        assert_eq!(page.limit, Some(20));
        assert_eq!(page.total, Some(0));
    }

    #[tokio::test]
    async fn test_fetch_messages_passes_window() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/conversations/c1/messages")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "2".into()),
                Matcher::UrlEncoded("limit".into(), "50".into()),
            ]))
            .with_status(200)
            .with_body(json!({ "data": { "messages": [] } }).to_string())
            .create_async()
            .await;

        let data = client(&server)
            .fetch(&QueryKey::Messages {
                conversation_id: "c1".to_string(),
                page: 2,
                limit: 50,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(data, QueryData::Messages(MessagePage::default()));
    }

    #[tokio::test]
    async fn test_fetch_unread_count() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/notifications/unread_count")
            .with_status(200)
            .with_body(json!({ "data": { "count": 7 } }).to_string())
            .create_async()
            .await;

        let data = client(&server)
            .fetch(&QueryKey::UnreadNotificationCount)
            .await
            .unwrap();

        assert_eq!(data, QueryData::UnreadCount(7));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/conversations")
            .with_status(401)
            .create_async()
            .await;

        let err = client(&server)
            .fetch(&QueryKey::Conversations)
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::Status(401));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/notifications/unread_count")
            .with_status(200)
            .with_body("{\"data\": {}}")
            .create_async()
            .await;

        let err = client(&server)
            .fetch(&QueryKey::UnreadNotificationCount)
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::Decode);
    }
}
