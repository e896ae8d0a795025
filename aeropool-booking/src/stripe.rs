use aeropool_core::payment::{
    AccountStatus, CreateIntentRequest, GatewayResult, IntentStatus, OnboardingLink,
    PaymentGateway, PaymentIntent, RefundOptions, RefundOutcome, TransferOutcome,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.stripe.com/v1";

/// Form-encoded Stripe client implementing the gateway boundary.
pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
    /// Where connected-account onboarding returns the driver to.
    onboarding_return_url: String,
}

impl StripeGateway {
    pub fn new(secret_key: String, onboarding_return_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("http client");
        Self {
            http,
            secret_key,
            api_base: DEFAULT_API_BASE.to_string(),
            onboarding_return_url,
        }
    }

    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }

    async fn post_form(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> GatewayResult<serde_json::Value> {
        let res = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await?;
        Self::into_json(res).await
    }

    async fn get(&self, path: &str) -> GatewayResult<serde_json::Value> {
        let res = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::into_json(res).await
    }

    async fn into_json(res: reqwest::Response) -> GatewayResult<serde_json::Value> {
        let status = res.status();
        let body: serde_json::Value = res.json().await?;
        if !status.is_success() {
            let message = body["error"]["message"].as_str().unwrap_or("unknown error");
            return Err(format!("stripe {status}: {message}").into());
        }
        Ok(body)
    }

    fn intent_from_value(value: serde_json::Value) -> GatewayResult<PaymentIntent> {
        let raw: RawIntent = serde_json::from_value(value)?;
        Ok(PaymentIntent {
            status: IntentStatus::from_provider(&raw.status),
            id: raw.id,
            amount: raw.amount,
            currency: raw.currency,
            client_secret: raw.client_secret,
            metadata: raw.metadata,
            transfer_destination: raw.transfer_data.map(|t| t.destination),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawIntent {
    id: String,
    amount: i64,
    currency: String,
    status: String,
    client_secret: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    transfer_data: Option<RawTransferData>,
}

#[derive(Debug, Deserialize)]
struct RawTransferData {
    destination: String,
}

#[derive(Debug, Deserialize)]
struct RawRefund {
    id: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct RawTransfer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    id: String,
    #[serde(default)]
    charges_enabled: bool,
    #[serde(default)]
    payouts_enabled: bool,
    #[serde(default)]
    requirements: RawRequirements,
}

#[derive(Debug, Default, Deserialize)]
struct RawRequirements {
    #[serde(default)]
    currently_due: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawAccountLink {
    url: String,
    expires_at: i64,
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(&self, req: CreateIntentRequest) -> GatewayResult<PaymentIntent> {
        let mut params = vec![
            ("amount".to_string(), req.amount.to_string()),
            ("currency".to_string(), req.currency.clone()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ];
        for (k, v) in &req.metadata {
            params.push((format!("metadata[{k}]"), v.clone()));
        }
        if let Some(destination) = &req.split_destination {
            params.push(("transfer_data[destination]".to_string(), destination.clone()));
            if let Some(fee) = req.application_fee {
                params.push(("application_fee_amount".to_string(), fee.to_string()));
            }
        }
        let body = self.post_form("/payment_intents", params).await?;
        Self::intent_from_value(body)
    }

    async fn get_intent(&self, intent_id: &str) -> GatewayResult<PaymentIntent> {
        let body = self.get(&format!("/payment_intents/{intent_id}")).await?;
        Self::intent_from_value(body)
    }

    async fn refund(&self, intent_id: &str, opts: RefundOptions) -> GatewayResult<RefundOutcome> {
        let mut params = vec![("payment_intent".to_string(), intent_id.to_string())];
        if opts.reverse_transfer {
            params.push(("reverse_transfer".to_string(), "true".to_string()));
        }
        if opts.refund_application_fee {
            params.push(("refund_application_fee".to_string(), "true".to_string()));
        }
        let body = self.post_form("/refunds", params).await?;
        let raw: RawRefund = serde_json::from_value(body)?;
        Ok(RefundOutcome { refund_id: raw.id, amount: raw.amount })
    }

    async fn create_transfer(
        &self,
        amount: i64,
        currency: &str,
        destination: &str,
        metadata: HashMap<String, String>,
    ) -> GatewayResult<TransferOutcome> {
        let mut params = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), currency.to_string()),
            ("destination".to_string(), destination.to_string()),
        ];
        for (k, v) in &metadata {
            params.push((format!("metadata[{k}]"), v.clone()));
        }
        let body = self.post_form("/transfers", params).await?;
        let raw: RawTransfer = serde_json::from_value(body)?;
        Ok(TransferOutcome { transfer_id: raw.id })
    }

    async fn create_connected_account(&self, email: &str) -> GatewayResult<OnboardingLink> {
        let account_body = self
            .post_form(
                "/accounts",
                vec![
                    ("type".to_string(), "express".to_string()),
                    ("email".to_string(), email.to_string()),
                    ("capabilities[transfers][requested]".to_string(), "true".to_string()),
                ],
            )
            .await?;
        let account: RawAccount = serde_json::from_value(account_body)?;

        let link_body = self
            .post_form(
                "/account_links",
                vec![
                    ("account".to_string(), account.id.clone()),
                    ("refresh_url".to_string(), self.onboarding_return_url.clone()),
                    ("return_url".to_string(), self.onboarding_return_url.clone()),
                    ("type".to_string(), "account_onboarding".to_string()),
                ],
            )
            .await?;
        let link: RawAccountLink = serde_json::from_value(link_body)?;

        Ok(OnboardingLink {
            account_id: account.id,
            onboarding_url: link.url,
            expires_at: link.expires_at,
        })
    }

    async fn get_account(&self, account_id: &str) -> GatewayResult<AccountStatus> {
        let body = self.get(&format!("/accounts/{account_id}")).await?;
        let raw: RawAccount = serde_json::from_value(body)?;
        Ok(AccountStatus {
            account_id: raw.id,
            charges_enabled: raw.charges_enabled,
            payouts_enabled: raw.payouts_enabled,
            requirements_due: raw.requirements.currently_due,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_mapping_handles_split_payload() {
        let value = serde_json::json!({
            "id": "pi_123",
            "amount": 4000,
            "currency": "eur",
            "status": "succeeded",
            "client_secret": "pi_123_secret",
            "metadata": {"ride_id": "abc"},
            "transfer_data": {"destination": "acct_9"}
        });
        let intent = StripeGateway::intent_from_value(value).unwrap();
        assert_eq!(intent.status, IntentStatus::Succeeded);
        assert_eq!(intent.transfer_destination.as_deref(), Some("acct_9"));
        assert_eq!(intent.metadata["ride_id"], "abc");
    }

    #[test]
    fn intent_mapping_tolerates_missing_optionals() {
        let value = serde_json::json!({
            "id": "pi_1",
            "amount": 100,
            "currency": "eur",
            "status": "requires_payment_method"
        });
        let intent = StripeGateway::intent_from_value(value).unwrap();
        assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);
        assert!(intent.transfer_destination.is_none());
        assert!(intent.metadata.is_empty());
    }
}
