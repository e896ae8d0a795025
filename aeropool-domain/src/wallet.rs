use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Spendable balance, minor units. Never negative.
    pub balance: i64,
    /// Withdrawals in flight at the PSP.
    pub pending_balance: i64,
    pub total_earned: i64,
    pub total_withdrawn: i64,
    pub currency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    RideEarning,
    RidePayment,
    PlatformFee,
    Withdrawal,
    WithdrawalFailed,
    Refund,
    Bonus,
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::RideEarning => "ride_earning",
            TransactionKind::RidePayment => "ride_payment",
            TransactionKind::PlatformFee => "platform_fee",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::WithdrawalFailed => "withdrawal_failed",
            TransactionKind::Refund => "refund",
            TransactionKind::Bonus => "bonus",
            TransactionKind::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ride_earning" => Some(TransactionKind::RideEarning),
            "ride_payment" => Some(TransactionKind::RidePayment),
            "platform_fee" => Some(TransactionKind::PlatformFee),
            "withdrawal" => Some(TransactionKind::Withdrawal),
            "withdrawal_failed" => Some(TransactionKind::WithdrawalFailed),
            "refund" => Some(TransactionKind::Refund),
            "bonus" => Some(TransactionKind::Bonus),
            "adjustment" => Some(TransactionKind::Adjustment),
            _ => None,
        }
    }

    /// Whether a completed transaction of this kind moves the spendable
    /// balance. Platform fee rows are bookkeeping only; the fee never
    /// touched the driver's wallet.
    pub fn affects_balance(&self) -> bool {
        !matches!(self, TransactionKind::PlatformFee)
    }

    pub fn is_earning(&self) -> bool {
        matches!(self, TransactionKind::RideEarning | TransactionKind::Bonus)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            "cancelled" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Booking,
    Ride,
    Request,
    Payout,
    Refund,
    Manual,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Booking => "booking",
            ReferenceKind::Ride => "ride",
            ReferenceKind::Request => "request",
            ReferenceKind::Payout => "payout",
            ReferenceKind::Refund => "refund",
            ReferenceKind::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booking" => Some(ReferenceKind::Booking),
            "ride" => Some(ReferenceKind::Ride),
            "request" => Some(ReferenceKind::Request),
            "payout" => Some(ReferenceKind::Payout),
            "refund" => Some(ReferenceKind::Refund),
            "manual" => Some(ReferenceKind::Manual),
            _ => None,
        }
    }
}

/// Append-only ledger entry. Completed rows are immutable; the wallet
/// balance is by definition the sum of completed, balance-affecting rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    /// Signed minor units: credits positive, debits negative.
    pub amount: i64,
    pub gross_amount: i64,
    pub fee_amount: i64,
    pub fee_percent: i64,
    pub net_amount: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub reference_kind: ReferenceKind,
    pub reference_id: Option<Uuid>,
    pub psp_intent_id: Option<String>,
    pub psp_transfer_id: Option<String>,
    pub psp_payout_id: Option<String>,
    pub description: String,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Failed => "failed",
            PayoutStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PayoutStatus::Pending),
            "processing" => Some(PayoutStatus::Processing),
            "completed" => Some(PayoutStatus::Completed),
            "failed" => Some(PayoutStatus::Failed),
            "cancelled" => Some(PayoutStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    Standard,
    Instant,
}

impl PayoutMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutMethod::Standard => "standard",
            PayoutMethod::Instant => "instant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(PayoutMethod::Standard),
            "instant" => Some(PayoutMethod::Instant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub amount: i64,
    pub status: PayoutStatus,
    pub psp_payout_id: Option<String>,
    pub psp_transfer_id: Option<String>,
    pub method: PayoutMethod,
    pub failure_reason: Option<String>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Platform cut applied to ride earnings, integer percent.
#[derive(Debug, Clone, Copy)]
pub struct FeePolicy {
    pub percent: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub gross: i64,
    pub fee: i64,
    pub net: i64,
}

impl FeePolicy {
    pub fn new(percent: i64) -> Self {
        Self { percent: percent.clamp(0, 100) }
    }

    /// Integer round-half-up split. `net + fee == gross` always.
    pub fn split(&self, gross: i64) -> FeeBreakdown {
        let fee = (gross * self.percent + 50) / 100;
        FeeBreakdown { gross, fee, net: gross - fee }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_split_default_ten_percent() {
        let fees = FeePolicy::new(10);
        let b = fees.split(4000);
        assert_eq!(b, FeeBreakdown { gross: 4000, fee: 400, net: 3600 });
    }

    #[test]
    fn fee_split_rounds_half_up_and_balances() {
        let fees = FeePolicy::new(10);
        for gross in [1, 5, 99, 1515, 333, 100_001] {
            let b = fees.split(gross);
            assert_eq!(b.fee + b.net, gross, "gross {gross}");
        }
        // 151.5 rounds up to 152.
        assert_eq!(fees.split(1515).fee, 152);
        // 0.5 rounds up to 1.
        assert_eq!(fees.split(5).fee, 1);
    }

    #[test]
    fn fee_policy_clamps_percent() {
        assert_eq!(FeePolicy::new(150).percent, 100);
        assert_eq!(FeePolicy::new(-3).percent, 0);
    }

    #[test]
    fn platform_fee_rows_do_not_move_balance() {
        assert!(!TransactionKind::PlatformFee.affects_balance());
        assert!(TransactionKind::RideEarning.affects_balance());
        assert!(TransactionKind::Refund.affects_balance());
    }

    #[test]
    fn kind_round_trip() {
        for s in [
            "ride_earning",
            "ride_payment",
            "platform_fee",
            "withdrawal",
            "withdrawal_failed",
            "refund",
            "bonus",
            "adjustment",
        ] {
            assert_eq!(TransactionKind::parse(s).unwrap().as_str(), s);
        }
    }
}
