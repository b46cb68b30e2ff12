//! REST client for the orders API

use async_trait::async_trait;
use http::StatusCode;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::{ApiResponse, ErrorCode, Order, OrderDraft, OrderPage, OrderPatch, OrderQuery};

use crate::config::SyncConfig;
use crate::error::{ClientError, ClientResult};

/// Orders backend
///
/// Injected into [`SyncContext`](crate::SyncContext) so tests and embedders
/// can supply their own.
#[async_trait]
pub trait OrdersApi: Send + Sync {
    /// `GET /orders`
    async fn list_orders(&self, query: &OrderQuery) -> ClientResult<OrderPage>;

    /// `POST /orders`
    async fn create_order(&self, draft: &OrderDraft) -> ClientResult<Order>;

    /// `PATCH /orders/:id`
    async fn update_order(&self, id: &str, patch: &OrderPatch) -> ClientResult<Order>;
}

/// HTTP implementation of [`OrdersApi`]
#[derive(Debug, Clone)]
pub struct NetworkOrdersApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl NetworkOrdersApi {
    pub fn new(config: &SyncConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Set the authentication token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> ClientResult<T> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        decode_response(status, &body)
    }
}

#[async_trait]
impl OrdersApi for NetworkOrdersApi {
    async fn list_orders(&self, query: &OrderQuery) -> ClientResult<OrderPage> {
        tracing::debug!(page = query.page, per_page = query.per_page, "GET /api/orders");
        let mut page: OrderPage = self
            .send(self.client.get(self.url("/api/orders")).query(query))
            .await?;
        if page.total_pages == 0 {
            page.total_pages = shared::total_pages_for(page.total_count, page.per_page);
        }
        Ok(page)
    }

    async fn create_order(&self, draft: &OrderDraft) -> ClientResult<Order> {
        tracing::debug!(total = draft.total, "POST /api/orders");
        self.send(self.client.post(self.url("/api/orders")).json(draft))
            .await
    }

    async fn update_order(&self, id: &str, patch: &OrderPatch) -> ClientResult<Order> {
        tracing::debug!(order_id = %id, "PATCH /api/orders/{}", id);
        self.send(
            self.client
                .patch(self.url(&format!("/api/orders/{}", id)))
                .json(patch),
        )
        .await
    }
}

/// Decode an `ApiResponse` body, mapping failures to [`ClientError`]
fn decode_response<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> ClientResult<T> {
    if !status.is_success() {
        return Err(error_from_body(status, body));
    }

    let envelope: ApiResponse<T> = serde_json::from_slice(body)?;
    if !envelope.is_success() {
        return Err(ClientError::Api {
            code: envelope.code,
            message: envelope.message,
        });
    }
    envelope
        .data
        .ok_or_else(|| ClientError::InvalidResponse("Missing response data".to_string()))
}

fn error_from_body(status: StatusCode, body: &[u8]) -> ClientError {
    let (code, message) = match serde_json::from_slice::<ApiResponse<serde_json::Value>>(body) {
        Ok(envelope) => (envelope.code, envelope.message),
        Err(_) => (
            ErrorCode::from_http_status(status),
            String::from_utf8_lossy(body).into_owned(),
        ),
    };

    match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
        StatusCode::FORBIDDEN => ClientError::Forbidden(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ClientError::Validation(message)
        }
        _ if code == ErrorCode::InternalError => ClientError::Internal(message),
        _ => ClientError::Api { code, message },
    }
}
