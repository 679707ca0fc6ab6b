//! Outbound accrual service client
//!
//! Calls `GET {base}/api/orders/{number}` through a shared token-bucket
//! rate limiter. The client advertises gzip and decodes compressed
//! bodies transparently.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::OrderStatus;
use crate::rate_limiter::{TokenBucket, TokenBucketConfig};

/// Reply from the accrual service for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccrualUpdate {
    /// The remote reported a status (and an accrual when processed)
    Ready {
        status: OrderStatus,
        accrual: Option<Decimal>,
    },
    /// The remote does not know the order yet (204)
    Unknown,
    /// The remote asked to back off (429 with Retry-After)
    Throttled(Duration),
}

/// Errors from the accrual client
#[derive(Error, Debug)]
pub enum AccrualError {
    #[error("accrual transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("accrual returned unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("shutting down")]
    Cancelled,
}

/// Accrual lookup seam used by the order updater.
#[async_trait]
pub trait AccrualApi: Send + Sync {
    /// Retrieve the accrual state for an order number.
    async fn get(&self, number: &str) -> Result<AccrualUpdate, AccrualError>;
}

/// Status vocabulary of the remote service. `REGISTERED` is its
/// pre-processing state and maps to a still-unprocessed local order.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum RemoteStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl From<RemoteStatus> for OrderStatus {
    fn from(status: RemoteStatus) -> Self {
        match status {
            RemoteStatus::Registered => OrderStatus::New,
            RemoteStatus::Processing => OrderStatus::Processing,
            RemoteStatus::Invalid => OrderStatus::Invalid,
            RemoteStatus::Processed => OrderStatus::Processed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OrderReply {
    status: RemoteStatus,
    #[serde(default, with = "rust_decimal::serde::arbitrary_precision_option")]
    accrual: Option<Decimal>,
}

/// HTTP accrual client
pub struct AccrualClient {
    client: Client,
    base_url: String,
    limiter: TokenBucket,
    cancel: CancellationToken,
}

impl AccrualClient {
    /// Create a client for the given base URL. Limiter waits are tied to
    /// the process shutdown token.
    pub fn new(
        base_url: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<Self, AccrualError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter: TokenBucket::new(TokenBucketConfig::default()),
            cancel,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AccrualApi for AccrualClient {
    async fn get(&self, number: &str) -> Result<AccrualUpdate, AccrualError> {
        self.limiter
            .acquire(&self.cancel)
            .await
            .map_err(|_| AccrualError::Cancelled)?;

        let url = format!("{}/api/orders/{}", self.base_url, number);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::NO_CONTENT => return Ok(AccrualUpdate::Unknown),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                return Ok(match retry_after {
                    Some(secs) => AccrualUpdate::Throttled(Duration::from_secs(secs)),
                    None => AccrualUpdate::Unknown,
                });
            }
            status if status.as_u16() > 299 => {
                return Err(AccrualError::UnexpectedStatus(status.as_u16()));
            }
            _ => {}
        }

        let reply: OrderReply = response.json().await?;
        Ok(AccrualUpdate::Ready {
            status: reply.status.into(),
            accrual: reply.accrual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_base_url_normalization() {
        let cancel = CancellationToken::new();
        let client = AccrualClient::new("http://localhost:8081/", cancel.clone()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8081");

        let client = AccrualClient::new("http://localhost:8081", cancel).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8081");
    }

    #[test]
    fn test_remote_status_mapping() {
        assert_eq!(OrderStatus::from(RemoteStatus::Registered), OrderStatus::New);
        assert_eq!(
            OrderStatus::from(RemoteStatus::Processing),
            OrderStatus::Processing
        );
        assert_eq!(OrderStatus::from(RemoteStatus::Invalid), OrderStatus::Invalid);
        assert_eq!(
            OrderStatus::from(RemoteStatus::Processed),
            OrderStatus::Processed
        );
    }

    #[test]
    fn test_reply_decoding_keeps_decimal_exact() {
        let reply: OrderReply =
            serde_json::from_str(r#"{"order":"79927398713","status":"PROCESSED","accrual":729.3}"#)
                .unwrap();
        assert!(matches!(reply.status, RemoteStatus::Processed));
        assert_eq!(reply.accrual, Some(dec!(729.3)));
    }

    #[test]
    fn test_reply_without_accrual() {
        let reply: OrderReply =
            serde_json::from_str(r#"{"order":"79927398713","status":"PROCESSING"}"#).unwrap();
        assert!(matches!(reply.status, RemoteStatus::Processing));
        assert_eq!(reply.accrual, None);
    }

    #[test]
    fn test_unknown_remote_status_rejected() {
        let result =
            serde_json::from_str::<OrderReply>(r#"{"order":"1","status":"EXPLODED"}"#);
        assert!(result.is_err());
    }
}
