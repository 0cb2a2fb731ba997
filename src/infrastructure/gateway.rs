use crate::domain::ports::{ChargeOutcome, ChargeRequest, PaymentGateway};
use crate::error::{RenewalError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// How an HTTP status maps onto the retry contract: 2xx is a success
/// envelope, 4xx a business decline, everything else transient.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum GatewayClass {
    Success,
    Decline,
    Transient,
}

pub fn classify_status(status: StatusCode) -> GatewayClass {
    if status.is_success() {
        GatewayClass::Success
    } else if status.is_client_error() {
        GatewayClass::Decline
    } else {
        GatewayClass::Transient
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GatewayChargeBody {
    amount: u32,
    correlation_id: Uuid,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct GatewayChargeReply {
    external_id: Option<String>,
    error_code: Option<String>,
    error_description: Option<String>,
}

/// Synchronous HTTP client for the external payment provider. Every call
/// carries the configured request timeout; timeouts and connection failures
/// are classified as transient.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    url: String,
}

impl HttpPaymentGateway {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RenewalError::InternalError(Box::new(e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeOutcome> {
        let body = GatewayChargeBody {
            amount: request.amount_in_cents,
            correlation_id: request.correlation_id,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RenewalError::GatewayUnavailable(e.to_string()))?;

        let status = response.status();
        match classify_status(status) {
            GatewayClass::Transient => Err(RenewalError::GatewayUnavailable(format!(
                "gateway returned {status}"
            ))),
            GatewayClass::Decline => {
                let reply: GatewayChargeReply = response.json().await.unwrap_or_default();
                Ok(ChargeOutcome::Declined {
                    code: reply
                        .error_code
                        .unwrap_or_else(|| status.as_u16().to_string()),
                    description: reply
                        .error_description
                        .unwrap_or_else(|| "payment refused".to_string()),
                })
            }
            GatewayClass::Success => {
                let reply: GatewayChargeReply = response.json().await.map_err(|e| {
                    RenewalError::GatewayUnavailable(format!("unreadable gateway response: {e}"))
                })?;
                match reply.external_id {
                    Some(external_id) => Ok(ChargeOutcome::Approved { external_id }),
                    // Accepted the call but assigned no payment id: a decline
                    // in success clothing, not something worth retrying.
                    None => Ok(ChargeOutcome::Declined {
                        code: reply.error_code.unwrap_or_else(|| "UNSPECIFIED".to_string()),
                        description: reply
                            .error_description
                            .unwrap_or_else(|| "gateway assigned no payment id".to_string()),
                    }),
                }
            }
        }
    }
}

/// Offline stand-in for the external provider: approves every charge with a
/// deterministic external id. Lets the one-shot pipeline run end to end
/// without network access.
#[derive(Default, Clone)]
pub struct SimulatedGateway;

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeOutcome> {
        Ok(ChargeOutcome::Approved {
            external_id: format!("SIM-{}", request.correlation_id.simple()),
        })
    }
}
