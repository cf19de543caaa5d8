use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{GatewayError, PaymentGateway};
use crate::services::{ChargeCreated, ContactReveal, StatusReport};

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Talks to a running instance of this service over HTTP.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, GatewayError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|b| b.message.or(b.error))
                .unwrap_or(text);
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_charge(
        &self,
        buyer_id: &str,
        seller_id: &str,
    ) -> Result<ChargeCreated, GatewayError> {
        self.post(
            "/payments/pix",
            json!({ "buyerId": buyer_id, "sellerId": seller_id }),
        )
        .await
    }

    async fn check_status(&self, payment_id: &str) -> Result<StatusReport, GatewayError> {
        self.post("/payments/status", json!({ "paymentId": payment_id }))
            .await
    }

    async fn reveal_contact(
        &self,
        payment_id: &str,
        seller_id: &str,
    ) -> Result<ContactReveal, GatewayError> {
        self.post(
            "/contact-access",
            json!({ "paymentId": payment_id, "sellerId": seller_id }),
        )
        .await
    }
}
