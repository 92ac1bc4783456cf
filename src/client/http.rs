use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::api::{BoardScope, BookingApi};
use super::session::ClientSession;
use super::ClientError;
use crate::models::{ApprovalAction, AuthResponse, BookingView, NewBooking};

/// `BookingApi` over the service's JSON routes.
pub struct HttpBookingApi {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

fn action_route(booking_id: &str, action: ApprovalAction) -> (Method, String) {
    match action {
        ApprovalAction::StaffApprove => (Method::PUT, format!("/api/approvals/staff/{booking_id}")),
        ApprovalAction::StaffReject => {
            (Method::PUT, format!("/api/approvals/staff/{booking_id}/reject"))
        }
        ApprovalAction::AdminApprove => (Method::PUT, format!("/api/approvals/admin/{booking_id}")),
        ApprovalAction::AdminReject => {
            (Method::PUT, format!("/api/approvals/admin/{booking_id}/reject"))
        }
        ApprovalAction::Cancel => (Method::POST, format!("/api/bookings/{booking_id}/cancel")),
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        let message = body["error"]
            .as_str()
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed"))
            .to_string();
        return Err(ClientError::Status {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp.json().await?)
}

impl HttpBookingApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<ClientSession, ClientError> {
        let resp = self
            .request(Method::POST, "/api/auth/login")
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let auth: AuthResponse = decode(resp).await?;
        Ok(ClientSession::from(auth))
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let resp = self.request(Method::POST, "/api/auth/logout").send().await?;
        let _: serde_json::Value = decode(resp).await?;
        Ok(())
    }

    pub async fn create(&self, booking: &NewBooking) -> Result<BookingView, ClientError> {
        let resp = self
            .request(Method::POST, "/api/bookings")
            .json(booking)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn booking(&self, booking_id: &str) -> Result<BookingView, ClientError> {
        let resp = self
            .request(Method::GET, &format!("/api/bookings/{booking_id}"))
            .send()
            .await?;
        decode(resp).await
    }
}

#[async_trait]
impl BookingApi for HttpBookingApi {
    async fn fetch(&self, scope: BoardScope) -> Result<Vec<BookingView>, ClientError> {
        let resp = self.request(Method::GET, scope.path()).send().await?;
        decode(resp).await
    }

    async fn perform(
        &self,
        booking_id: &str,
        action: ApprovalAction,
    ) -> Result<BookingView, ClientError> {
        let (method, path) = action_route(booking_id, action);
        let resp = self.request(method, &path).send().await?;
        decode(resp).await
    }
}
