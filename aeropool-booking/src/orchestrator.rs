use aeropool_core::payment::{
    AccountStatus, CreateIntentRequest, GatewayResult, IntentStatus, OnboardingLink,
    PaymentGateway, PaymentIntent, RefundOptions, RefundOutcome, TransferOutcome,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Thin policy layer over the gateway. Keeps the "an intent is only
/// authoritative once re-read as succeeded" rule in one place.
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment intent {0} is not in a succeeded state")]
    IntentNotSucceeded(String),
    #[error("payment provider error: {0}")]
    Provider(String),
}

impl PaymentOrchestrator {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.gateway
    }

    pub async fn create_intent(&self, req: CreateIntentRequest) -> Result<PaymentIntent, PaymentError> {
        self.gateway
            .create_intent(req)
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))
    }

    /// Re-reads the intent from the provider and fails unless it has
    /// settled. This is the only path that may treat a card payment as
    /// money received.
    pub async fn confirm_succeeded(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        let intent = self
            .gateway
            .get_intent(intent_id)
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;
        if intent.status != IntentStatus::Succeeded {
            return Err(PaymentError::IntentNotSucceeded(intent.id));
        }
        Ok(intent)
    }

    pub async fn refund(
        &self,
        intent_id: &str,
        opts: RefundOptions,
    ) -> Result<RefundOutcome, PaymentError> {
        self.gateway
            .refund(intent_id, opts)
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))
    }
}

/// In-process gateway for tests. Intents are held in memory; tests flip
/// their status to simulate the client-side confirmation step.
#[derive(Default)]
pub struct MockGateway {
    state: std::sync::Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    intents: HashMap<String, PaymentIntent>,
    refunds: Vec<(String, RefundOptions)>,
    transfers: Vec<(String, i64)>,
    counter: u64,
    fail_refunds: bool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the edge confirming the payment.
    pub fn succeed_intent(&self, intent_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(intent) = state.intents.get_mut(intent_id) {
            intent.status = IntentStatus::Succeeded;
        }
    }

    pub fn fail_intent(&self, intent_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(intent) = state.intents.get_mut(intent_id) {
            intent.status = IntentStatus::Failed;
        }
    }

    pub fn set_fail_refunds(&self, fail: bool) {
        self.state.lock().unwrap().fail_refunds = fail;
    }

    pub fn refunds(&self) -> Vec<(String, RefundOptions)> {
        self.state.lock().unwrap().refunds.clone()
    }

    pub fn transfers(&self) -> Vec<(String, i64)> {
        self.state.lock().unwrap().transfers.clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(&self, req: CreateIntentRequest) -> GatewayResult<PaymentIntent> {
        let mut state = self.state.lock().unwrap();
        state.counter += 1;
        let id = format!("pi_mock_{}", state.counter);
        let intent = PaymentIntent {
            id: id.clone(),
            amount: req.amount,
            currency: req.currency,
            status: IntentStatus::RequiresPaymentMethod,
            client_secret: Some(format!("{id}_secret")),
            metadata: req.metadata,
            transfer_destination: req.split_destination,
        };
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn get_intent(&self, intent_id: &str) -> GatewayResult<PaymentIntent> {
        self.state
            .lock()
            .unwrap()
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| format!("no such intent: {intent_id}").into())
    }

    async fn refund(&self, intent_id: &str, opts: RefundOptions) -> GatewayResult<RefundOutcome> {
        let mut state = self.state.lock().unwrap();
        if state.fail_refunds {
            return Err("simulated refund failure".into());
        }
        let amount = state
            .intents
            .get(intent_id)
            .map(|i| i.amount)
            .ok_or_else(|| format!("no such intent: {intent_id}"))?;
        state.refunds.push((intent_id.to_string(), opts));
        Ok(RefundOutcome { refund_id: format!("re_mock_{}", state.refunds.len()), amount })
    }

    async fn create_transfer(
        &self,
        amount: i64,
        _currency: &str,
        destination: &str,
        _metadata: HashMap<String, String>,
    ) -> GatewayResult<TransferOutcome> {
        let mut state = self.state.lock().unwrap();
        state.transfers.push((destination.to_string(), amount));
        Ok(TransferOutcome { transfer_id: format!("tr_mock_{}", state.transfers.len()) })
    }

    async fn create_connected_account(&self, email: &str) -> GatewayResult<OnboardingLink> {
        Ok(OnboardingLink {
            account_id: format!("acct_mock_{}", email.len()),
            onboarding_url: "https://connect.example/onboard".into(),
            expires_at: 0,
        })
    }

    async fn get_account(&self, account_id: &str) -> GatewayResult<AccountStatus> {
        Ok(AccountStatus {
            account_id: account_id.to_string(),
            charges_enabled: true,
            payouts_enabled: true,
            requirements_due: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn intent_must_settle_before_it_counts() {
        let gateway = Arc::new(MockGateway::new());
        let orchestrator = PaymentOrchestrator::new(gateway.clone());

        let intent = orchestrator
            .create_intent(CreateIntentRequest {
                amount: 4000,
                currency: "eur".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        // Not confirmed yet: treating it as paid must fail.
        let err = orchestrator.confirm_succeeded(&intent.id).await.unwrap_err();
        assert!(matches!(err, PaymentError::IntentNotSucceeded(_)));

        gateway.succeed_intent(&intent.id);
        let settled = orchestrator.confirm_succeeded(&intent.id).await.unwrap();
        assert_eq!(settled.amount, 4000);
    }

    #[tokio::test]
    async fn failed_intents_and_refunds_surface_as_errors() {
        let gateway = Arc::new(MockGateway::new());
        let orchestrator = PaymentOrchestrator::new(gateway.clone());
        let intent = orchestrator
            .create_intent(CreateIntentRequest {
                amount: 1000,
                currency: "eur".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        gateway.fail_intent(&intent.id);
        assert!(matches!(
            orchestrator.confirm_succeeded(&intent.id).await.unwrap_err(),
            PaymentError::IntentNotSucceeded(_)
        ));

        gateway.set_fail_refunds(true);
        assert!(matches!(
            orchestrator.refund(&intent.id, RefundOptions::default()).await.unwrap_err(),
            PaymentError::Provider(_)
        ));
        assert!(gateway.refunds().is_empty());
    }

    #[tokio::test]
    async fn refund_records_flags() {
        let gateway = Arc::new(MockGateway::new());
        let orchestrator = PaymentOrchestrator::new(gateway.clone());
        let intent = orchestrator
            .create_intent(CreateIntentRequest {
                amount: 2000,
                currency: "eur".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let outcome = orchestrator
            .refund(&intent.id, RefundOptions { reverse_transfer: true, refund_application_fee: true })
            .await
            .unwrap();
        assert_eq!(outcome.amount, 2000);
        let refunds = gateway.refunds();
        assert_eq!(refunds.len(), 1);
        assert!(refunds[0].1.reverse_transfer);
    }
}
