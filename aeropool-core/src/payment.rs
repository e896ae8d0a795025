use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type GatewayError = Box<dyn std::error::Error + Send + Sync>;
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresAction,
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

impl IntentStatus {
    pub fn from_provider(s: &str) -> Self {
        match s {
            "succeeded" => IntentStatus::Succeeded,
            "processing" => IntentStatus::Processing,
            "requires_action" | "requires_confirmation" => IntentStatus::RequiresAction,
            "canceled" => IntentStatus::Canceled,
            "requires_payment_method" => IntentStatus::RequiresPaymentMethod,
            _ => IntentStatus::Failed,
        }
    }
}

/// A provider-side payment intent. Amounts are integer minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub client_secret: Option<String>,
    pub metadata: HashMap<String, String>,
    /// Present when the charge is split to a connected payout account.
    pub transfer_destination: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateIntentRequest {
    pub amount: i64,
    pub currency: String,
    pub metadata: HashMap<String, String>,
    /// Connected account receiving the split, when the driver has one.
    pub split_destination: Option<String>,
    /// Platform share retained out of the split, minor units.
    pub application_fee: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefundOptions {
    pub reverse_transfer: bool,
    pub refund_application_fee: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub refund_id: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub transfer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingLink {
    pub account_id: String,
    pub onboarding_url: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountStatus {
    pub account_id: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub requirements_due: Vec<String>,
}

impl AccountStatus {
    pub fn is_ready(&self) -> bool {
        self.charges_enabled && self.payouts_enabled && self.requirements_due.is_empty()
    }
}

/// Boundary to the external payment service provider.
///
/// A created intent is never authoritative on its own: callers must treat
/// payment as settled only after `get_intent` reports `Succeeded` or a
/// signature-verified webhook says so.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, req: CreateIntentRequest) -> GatewayResult<PaymentIntent>;

    async fn get_intent(&self, intent_id: &str) -> GatewayResult<PaymentIntent>;

    async fn refund(&self, intent_id: &str, opts: RefundOptions) -> GatewayResult<RefundOutcome>;

    async fn create_transfer(
        &self,
        amount: i64,
        currency: &str,
        destination: &str,
        metadata: HashMap<String, String>,
    ) -> GatewayResult<TransferOutcome>;

    async fn create_connected_account(&self, email: &str) -> GatewayResult<OnboardingLink>;

    async fn get_account(&self, account_id: &str) -> GatewayResult<AccountStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_mapping() {
        assert_eq!(IntentStatus::from_provider("succeeded"), IntentStatus::Succeeded);
        assert_eq!(IntentStatus::from_provider("requires_action"), IntentStatus::RequiresAction);
        assert_eq!(IntentStatus::from_provider("canceled"), IntentStatus::Canceled);
        assert_eq!(IntentStatus::from_provider("whatever"), IntentStatus::Failed);
    }

    #[test]
    fn account_readiness() {
        let mut acct = AccountStatus {
            account_id: "acct_1".into(),
            charges_enabled: true,
            payouts_enabled: true,
            requirements_due: vec![],
        };
        assert!(acct.is_ready());
        acct.requirements_due.push("external_account".into());
        assert!(!acct.is_ready());
    }
}
