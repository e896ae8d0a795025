use aeropool_core::payment::RefundOptions;
use aeropool_domain::booking::PaymentMethod;
use aeropool_domain::wallet::FeePolicy;

/// Ledger movements a cancellation requires. Refunds are always 100 % of
/// gross, platform fee included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundPlan {
    /// PSP refund to issue first, when the payment went through a card.
    pub psp_refund: Option<RefundOptions>,
    /// Credit to the passenger's wallet, minor units (the full gross).
    pub credit_passenger: i64,
    /// Debit of the driver's wallet by their net share, when the earning
    /// was credited internally rather than settled at the PSP.
    pub debit_driver: Option<i64>,
}

/// Derives the movements for a paid booking or accepted request.
///
/// * `card` + split to a connected account: the PSP reverses the transfer
///   and the application fee, so only the passenger credit remains.
/// * `card` without a connected account: the driver was credited on the
///   internal ledger and must give the net share back.
/// * `wallet`: both sides move on the internal ledger, no PSP involved.
pub fn plan_refund(
    method: PaymentMethod,
    gross: i64,
    fees: FeePolicy,
    intent_had_transfer: bool,
) -> RefundPlan {
    match method {
        PaymentMethod::Card => {
            let psp_refund = Some(RefundOptions {
                reverse_transfer: intent_had_transfer,
                refund_application_fee: intent_had_transfer,
            });
            let debit_driver = if intent_had_transfer {
                None
            } else {
                Some(fees.split(gross).net)
            };
            RefundPlan { psp_refund, credit_passenger: gross, debit_driver }
        }
        PaymentMethod::Wallet => RefundPlan {
            psp_refund: None,
            credit_passenger: gross,
            debit_driver: Some(fees.split(gross).net),
        },
        PaymentMethod::None => RefundPlan {
            psp_refund: None,
            credit_passenger: 0,
            debit_driver: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_refund_without_connected_account_unwinds_internal_credit() {
        // Intent of 4000, driver was credited 3600 on the wallet ledger.
        let plan = plan_refund(PaymentMethod::Card, 4000, FeePolicy::new(10), false);
        let psp = plan.psp_refund.clone().unwrap();
        assert!(!psp.reverse_transfer);
        assert!(!psp.refund_application_fee);
        assert_eq!(plan.credit_passenger, 4000);
        assert_eq!(plan.debit_driver, Some(3600));
    }

    #[test]
    fn card_refund_with_split_reverses_at_the_psp() {
        let plan = plan_refund(PaymentMethod::Card, 4000, FeePolicy::new(10), true);
        let psp = plan.psp_refund.clone().unwrap();
        assert!(psp.reverse_transfer);
        assert!(psp.refund_application_fee);
        assert_eq!(plan.credit_passenger, 4000);
        assert_eq!(plan.debit_driver, None);
    }

    #[test]
    fn wallet_refund_moves_both_ledger_sides() {
        let plan = plan_refund(PaymentMethod::Wallet, 4000, FeePolicy::new(10), false);
        assert!(plan.psp_refund.is_none());
        assert_eq!(plan.credit_passenger, 4000);
        assert_eq!(plan.debit_driver, Some(3600));
    }

    #[test]
    fn unpaid_booking_yields_an_empty_plan() {
        let plan = plan_refund(PaymentMethod::None, 0, FeePolicy::new(10), false);
        assert_eq!(plan.credit_passenger, 0);
        assert!(plan.psp_refund.is_none());
        assert!(plan.debit_driver.is_none());
    }
}
