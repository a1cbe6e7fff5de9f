pub mod allocator;
pub mod installments;
pub mod waterfall;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::schedule::ScheduleSummary;
use crate::types::{LoanId, PaymentId, PaymentStatus};

pub use allocator::{Allocation, AllocationContext, PaymentAllocator};
pub use waterfall::{Obligations, WaterfallBucket, WaterfallSplit};

/// incoming payment as received from the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub loan_id: LoanId,
    pub amount: Money,
    pub payment_date: NaiveDate,
    /// apply to this installment instead of the oldest unpaid one
    pub installment_number: Option<u32>,
    pub reference: String,
}

impl PaymentRequest {
    pub fn new(loan_id: LoanId, amount: Money, payment_date: NaiveDate) -> Self {
        Self {
            loan_id,
            amount,
            payment_date,
            installment_number: None,
            reference: String::new(),
        }
    }

    pub fn for_installment(mut self, number: u32) -> Self {
        self.installment_number = Some(number);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }
}

/// recorded payment; amounts are never edited, only the status moves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub loan_id: LoanId,
    /// insertion order, breaks ties between payments on the same date
    pub sequence: u64,
    pub payment_date: NaiveDate,
    pub amount: Money,
    pub principal_paid: Money,
    pub interest_paid: Money,
    pub fees_paid: Money,
    pub penalty_paid: Money,
    pub penalty_assessed: Money,
    pub outstanding_balance: Money,
    pub is_late: bool,
    pub days_late: i64,
    pub is_early: bool,
    pub is_partial: bool,
    pub is_overpayment: bool,
    pub overpayment_amount: Money,
    pub installment_number: u32,
    pub status: PaymentStatus,
    pub reference: String,
}

impl Payment {
    /// amount that landed in a waterfall bucket
    pub fn applied_amount(&self) -> Money {
        self.penalty_paid + self.fees_paid + self.interest_paid + self.principal_paid
    }

    /// applied amount that counts against the schedule (everything but penalty)
    pub fn scheduled_portion(&self) -> Money {
        self.fees_paid + self.interest_paid + self.principal_paid
    }

    pub fn is_effective(&self) -> bool {
        self.status.is_effective() && self.amount.is_positive()
    }
}

/// what a loan owes in total and what has been applied so far
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CumulativeTotals {
    pub original_principal: Money,
    pub original_interest: Money,
    pub original_fees: Money,
    pub total_due: Money,
    pub paid: Money,
    pub principal_paid: Money,
    pub interest_paid: Money,
    pub fees_paid: Money,
    pub penalty_assessed: Money,
    pub penalty_paid: Money,
}

impl CumulativeTotals {
    /// nothing applied yet
    pub fn opening(summary: &ScheduleSummary) -> Self {
        Self {
            original_principal: summary.principal,
            original_interest: summary.interest,
            original_fees: summary.fees,
            total_due: summary.total_payable,
            paid: Money::ZERO,
            principal_paid: Money::ZERO,
            interest_paid: Money::ZERO,
            fees_paid: Money::ZERO,
            penalty_assessed: Money::ZERO,
            penalty_paid: Money::ZERO,
        }
    }

    pub fn remaining_principal(&self) -> Money {
        self.original_principal.saturating_sub(self.principal_paid)
    }

    pub fn remaining_interest(&self) -> Money {
        self.original_interest.saturating_sub(self.interest_paid)
    }

    pub fn remaining_fees(&self) -> Money {
        self.original_fees.saturating_sub(self.fees_paid)
    }

    pub fn unpaid_penalty(&self) -> Money {
        self.penalty_assessed.saturating_sub(self.penalty_paid)
    }

    pub fn remaining_total(&self) -> Money {
        self.total_due.saturating_sub(self.paid - self.penalty_paid)
    }

    /// total due plus penalties minus everything paid
    pub fn outstanding_balance(&self) -> Money {
        self.total_due + self.penalty_assessed - self.paid
    }
}
