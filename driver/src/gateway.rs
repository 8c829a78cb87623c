use std::time::Duration;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use kernel::interface::gateway::{
    GatewaySession, PaymentGateway, SessionRequest, VerificationResult, VerificationStatus,
};
use kernel::KernelError;

use crate::env;
use crate::error::ConvertError;

static GATEWAY_BASE_URL: &str = "GATEWAY_BASE_URL";
static GATEWAY_STORE_ID: &str = "GATEWAY_STORE_ID";
static GATEWAY_STORE_PASSWORD: &str = "GATEWAY_STORE_PASSWORD";
static CALLBACK_BASE_URL: &str = "CALLBACK_BASE_URL";

/// The gateway may legitimately take a while on a busy afternoon, but a
/// call that exceeds this is reported as `UpstreamTimeout` and treated as
/// inconclusive, never as proof of remote failure.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// SSLCommerz hosted-checkout client. Sessions are opened with a form post
/// against the gwprocess endpoint; success callbacks are re-verified
/// against the validator endpoint before anything is trusted.
pub struct SslCommerzGateway {
    client: reqwest::Client,
    base_url: String,
    store_id: String,
    store_password: String,
    callback_base_url: String,
}

impl SslCommerzGateway {
    pub fn from_env() -> error_stack::Result<Self, KernelError> {
        let client = reqwest::Client::builder()
            .timeout(GATEWAY_TIMEOUT)
            .build()
            .change_context_lazy(|| KernelError::Internal)?;
        Ok(Self {
            client,
            base_url: env(GATEWAY_BASE_URL)?,
            store_id: env(GATEWAY_STORE_ID)?,
            store_password: env(GATEWAY_STORE_PASSWORD)?,
            callback_base_url: env(CALLBACK_BASE_URL)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    status: Option<String>,
    sessionkey: Option<String>,
    #[serde(rename = "GatewayPageURL")]
    gateway_page_url: Option<String>,
    #[serde(rename = "failedreason")]
    failed_reason: Option<String>,
}

#[async_trait::async_trait]
impl PaymentGateway for SslCommerzGateway {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> error_stack::Result<GatewaySession, KernelError> {
        let customer = &request.customer;
        let form: Vec<(&str, String)> = vec![
            ("store_id", self.store_id.clone()),
            ("store_passwd", self.store_password.clone()),
            ("total_amount", request.amount.to_string()),
            ("currency", "BDT".to_string()),
            ("tran_id", request.transaction_id.to_string()),
            ("product_category", "Cycle Rental".to_string()),
            ("product_name", "Cycle Rental Service".to_string()),
            ("product_profile", "non-physical-goods".to_string()),
            ("shipping_method", "NO".to_string()),
            (
                "cus_name",
                customer.name.clone().unwrap_or_else(|| "CycleX User".into()),
            ),
            (
                "cus_email",
                customer
                    .email
                    .clone()
                    .unwrap_or_else(|| "user@cyclex.example".into()),
            ),
            (
                "cus_add1",
                customer.address.clone().unwrap_or_else(|| "Dhaka".into()),
            ),
            (
                "cus_city",
                customer.city.clone().unwrap_or_else(|| "Dhaka".into()),
            ),
            (
                "cus_postcode",
                customer.postcode.clone().unwrap_or_else(|| "1000".into()),
            ),
            ("cus_country", "Bangladesh".to_string()),
            (
                "cus_phone",
                customer.phone.clone().unwrap_or_else(|| "N/A".into()),
            ),
            ("value_a", request.rental_id.to_string()),
            ("value_b", request.payer.to_string()),
            (
                "success_url",
                format!("{}/settlements/success", self.callback_base_url),
            ),
            (
                "fail_url",
                format!("{}/settlements/fail", self.callback_base_url),
            ),
            (
                "cancel_url",
                format!("{}/settlements/cancel", self.callback_base_url),
            ),
            (
                "ipn_url",
                format!("{}/settlements/ipn", self.callback_base_url),
            ),
        ];

        let response = self
            .client
            .post(format!("{}/gwprocess/v4/api.php", self.base_url))
            .form(&form)
            .send()
            .await
            .convert_error()?;
        let body: SessionResponse = response.json().await.convert_error()?;

        match body.status.as_deref() {
            Some("VALID") | Some("SUCCESS") => {
                match (body.sessionkey, body.gateway_page_url) {
                    (Some(session_id), Some(redirect_url)) => Ok(GatewaySession {
                        session_id,
                        redirect_url,
                    }),
                    _ => Err(Report::new(KernelError::Internal)
                        .attach_printable("gateway session response missing key or url")),
                }
            }
            status => Err(Report::new(KernelError::Internal).attach_printable(format!(
                "gateway session rejected: status {status:?}, reason {:?}",
                body.failed_reason
            ))),
        }
    }

    async fn verify_transaction(
        &self,
        verification_id: &str,
    ) -> error_stack::Result<VerificationResult, KernelError> {
        let form = [
            ("val_id", verification_id),
            ("store_id", self.store_id.as_str()),
            ("store_passwd", self.store_password.as_str()),
        ];

        let response = self
            .client
            .post(format!(
                "{}/validator/api/validationserverAPI.php",
                self.base_url
            ))
            .form(&form)
            .send()
            .await
            .convert_error()?;
        let payload: serde_json::Value = response.json().await.convert_error()?;

        let status = match payload.get("status").and_then(serde_json::Value::as_str) {
            Some("VALID") | Some("VALIDATED") => VerificationStatus::Valid,
            _ => VerificationStatus::Invalid,
        };
        Ok(VerificationResult { status, payload })
    }
}
