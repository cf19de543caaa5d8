use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, SecondsFormat, Utc};
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use super::{ChargeDetail, ChargeRequest, ProcessorCharge, ProcessorError};
use crate::domain::PaymentStatus;
use crate::ports::PaymentProcessor;

const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";
const PIX_METHOD: &str = "pix";
const MAX_ERROR_BODY: usize = 512;

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    transaction_amount: f64,
    description: &'a str,
    payment_method_id: &'static str,
    payer: PayerBody<'a>,
    external_reference: &'a str,
    notification_url: &'a str,
    date_of_expiration: String,
}

#[derive(Debug, Serialize)]
struct PayerBody<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
}

/// Payment resource as returned by `POST /v1/payments` and `GET /v1/payments/{id}`.
#[derive(Debug, Deserialize)]
struct PaymentResource {
    id: serde_json::Value,
    status: String,
    status_detail: Option<String>,
    transaction_amount: Option<f64>,
    date_created: Option<String>,
    date_approved: Option<String>,
    date_of_expiration: Option<String>,
    external_reference: Option<String>,
    point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Deserialize)]
struct PointOfInteraction {
    transaction_data: Option<TransactionData>,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    qr_code: Option<String>,
    qr_code_base64: Option<String>,
    ticket_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl PaymentResource {
    fn processor_id(&self) -> Result<String, ProcessorError> {
        match &self.id {
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::String(s) if !s.is_empty() => Ok(s.clone()),
            other => Err(ProcessorError::InvalidResponse(format!(
                "unexpected payment id: {other}"
            ))),
        }
    }

    fn into_charge(self) -> Result<ProcessorCharge, ProcessorError> {
        let processor_payment_id = self.processor_id()?;
        let data = self
            .point_of_interaction
            .and_then(|poi| poi.transaction_data)
            .ok_or_else(|| {
                ProcessorError::InvalidResponse("missing PIX transaction data".to_string())
            })?;

        let qr_code = data.qr_code.filter(|code| !code.is_empty()).ok_or_else(|| {
            ProcessorError::InvalidResponse("missing PIX copy-and-paste code".to_string())
        })?;

        Ok(ProcessorCharge {
            processor_payment_id,
            status: PaymentStatus::from_processor(&self.status),
            qr_code,
            qr_code_image: data.qr_code_base64.unwrap_or_default(),
            ticket_url: data.ticket_url,
            expires_at: parse_timestamp(self.date_of_expiration.as_deref()),
        })
    }

    fn into_detail(self) -> Result<ChargeDetail, ProcessorError> {
        let processor_payment_id = self.processor_id()?;
        let amount = self
            .transaction_amount
            .and_then(|value| format!("{value:.2}").parse::<BigDecimal>().ok());

        Ok(ChargeDetail {
            processor_payment_id,
            status: PaymentStatus::from_processor(&self.status),
            status_detail: self.status_detail,
            amount,
            external_reference: self.external_reference.filter(|r| !r.is_empty()),
            created_at: parse_timestamp(self.date_created.as_deref()),
            approved_at: parse_timestamp(self.date_approved.as_deref()),
        })
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|value| value.with_timezone(&Utc))
}

fn is_transient(err: &ProcessorError) -> bool {
    err.is_transient()
}

/// Turns a non-success response into the matching error kind.
async fn error_from_response(response: reqwest::Response, payment_id: Option<&str>) -> ProcessorError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status == StatusCode::NOT_FOUND {
        return ProcessorError::NotFound(payment_id.unwrap_or("unknown").to_string());
    }

    if status.is_client_error() {
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY).collect());
        return ProcessorError::Rejected {
            status: status.as_u16(),
            message,
        };
    }

    ProcessorError::Unavailable(format!("processor returned status {}", status.as_u16()))
}

/// HTTP client for the PIX payment processor API.
#[derive(Clone)]
pub struct ProcessorClient {
    client: Client,
    base_url: String,
    access_token: String,
    circuit_breaker: Breaker,
}

impl ProcessorClient {
    pub fn new(base_url: String, access_token: String, timeout: Duration) -> Self {
        Self::with_circuit_breaker(base_url, access_token, timeout, 5, 30)
    }

    /// Creates a client whose breaker opens after `failure_threshold` consecutive
    /// transient failures and tries again after roughly `reset_timeout_secs`.
    pub fn with_circuit_breaker(
        base_url: String,
        access_token: String,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        ProcessorClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            circuit_breaker,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T, ProcessorError>
    where
        F: Future<Output = Result<T, ProcessorError>>,
    {
        match self.circuit_breaker.call_with(is_transient, call).await {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(ProcessorError::CircuitOpen),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    pub async fn create_charge(
        &self,
        request: &ChargeRequest,
        idempotency_key: &str,
    ) -> Result<ProcessorCharge, ProcessorError> {
        let transaction_amount = request
            .amount
            .to_string()
            .parse::<f64>()
            .map_err(|e| ProcessorError::Rejected {
                status: 400,
                message: format!("invalid amount: {e}"),
            })?;

        let body = CreatePaymentBody {
            transaction_amount,
            description: &request.description,
            payment_method_id: PIX_METHOD,
            payer: PayerBody {
                email: &request.payer.email,
                first_name: request.payer.first_name.as_deref(),
            },
            external_reference: &request.external_reference,
            notification_url: &request.notification_url,
            date_of_expiration: request
                .expires_at
                .to_rfc3339_opts(SecondsFormat::Millis, false),
        };

        let url = format!("{}/v1/payments", self.base_url);
        let call = async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.access_token)
                .header(IDEMPOTENCY_HEADER, idempotency_key)
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_from_response(response, None).await);
            }

            let resource = response
                .json::<PaymentResource>()
                .await
                .map_err(|e| ProcessorError::InvalidResponse(e.to_string()))?;
            resource.into_charge()
        };

        self.guarded(call).await
    }

    pub async fn get_charge(&self, processor_payment_id: &str) -> Result<ChargeDetail, ProcessorError> {
        let url = format!("{}/v1/payments/{}", self.base_url, processor_payment_id);
        let call = async {
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.access_token)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(error_from_response(response, Some(processor_payment_id)).await);
            }

            let resource = response
                .json::<PaymentResource>()
                .await
                .map_err(|e| ProcessorError::InvalidResponse(e.to_string()))?;
            resource.into_detail()
        };

        self.guarded(call).await
    }
}

#[async_trait]
impl PaymentProcessor for ProcessorClient {
    async fn create_charge(
        &self,
        request: &ChargeRequest,
        idempotency_key: &str,
    ) -> Result<ProcessorCharge, ProcessorError> {
        ProcessorClient::create_charge(self, request, idempotency_key).await
    }

    async fn get_charge(&self, processor_payment_id: &str) -> Result<ChargeDetail, ProcessorError> {
        ProcessorClient::get_charge(self, processor_payment_id).await
    }
}
