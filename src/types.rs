use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for a payment
pub type PaymentId = Uuid;

/// calendar unit used for rate basis and loan duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    /// how many of this unit fit in a year
    pub fn per_year(&self) -> Decimal {
        match self {
            TimeUnit::Day => Decimal::from(365),
            TimeUnit::Week => Decimal::from(52),
            TimeUnit::Month => Decimal::from(12),
            TimeUnit::Year => Decimal::ONE,
        }
    }
}

/// repayment frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepaymentFrequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl RepaymentFrequency {
    /// repayment periods per year
    pub fn periods_per_year(&self) -> Decimal {
        match self {
            RepaymentFrequency::Daily => Decimal::from(365),
            RepaymentFrequency::Weekly => Decimal::from(52),
            RepaymentFrequency::Biweekly => Decimal::from(26),
            RepaymentFrequency::Monthly => Decimal::from(12),
            RepaymentFrequency::Quarterly => Decimal::from(4),
            RepaymentFrequency::Yearly => Decimal::ONE,
        }
    }

    /// true when a rate quoted per `unit` already applies to one period
    pub fn matches(&self, unit: TimeUnit) -> bool {
        matches!(
            (self, unit),
            (RepaymentFrequency::Daily, TimeUnit::Day)
                | (RepaymentFrequency::Weekly, TimeUnit::Week)
                | (RepaymentFrequency::Monthly, TimeUnit::Month)
                | (RepaymentFrequency::Yearly, TimeUnit::Year)
        )
    }
}

/// interest method as stated on the loan terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterestMethodKind {
    /// interest computed once on the original principal and spread evenly
    Flat,
    /// constant EMI, interest on the remaining balance
    Reducing,
    /// principal compounded per period, total spread evenly
    Compound,
}

/// installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallmentStatus {
    Pending,
    Paid,
    Partial,
    Overdue,
    GracePeriod,
}

/// payment record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Recorded,
    Completed,
    Reversed,
    Cancelled,
}

impl PaymentStatus {
    /// whether the payment counts towards the ledger
    pub fn is_effective(&self) -> bool {
        matches!(self, PaymentStatus::Recorded | PaymentStatus::Completed)
    }
}

/// lifecycle status used for collections and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    /// disbursed, no payments yet
    Open,
    /// payments occurring, within tolerance of maturity
    InProgress,
    /// more than the overdue offset past maturity
    Overdue,
    /// more than the default offset past maturity
    Defaulted,
    /// fully repaid
    Closed,
}

impl LoanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Closed | LoanStatus::Defaulted)
    }
}

/// disbursement workflow status of a loan account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisbursementStatus {
    /// terms may still change, schedule can be regenerated
    Pending,
    /// funds released, terms frozen
    Disbursed,
    /// abandoned before disbursement
    Cancelled,
}
