pub mod calendar;
pub mod generator;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{InstallmentStatus, InterestMethodKind, LoanId, PaymentId};

pub use generator::ScheduleGenerator;

/// one scheduled repayment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub loan_id: LoanId,
    pub number: u32,
    pub due_date: NaiveDate,
    pub grace_expiry: Option<NaiveDate>,
    pub scheduled_amount: Money,
    pub principal: Money,
    pub interest: Money,
    pub fee: Money,
    /// scheduled total through this installment
    pub cumulative_due: Money,
    /// scheduled total still owed after this installment
    pub outstanding_after: Money,

    // updated as payments land
    pub paid_amount: Money,
    pub principal_paid: Money,
    pub interest_paid: Money,
    pub fee_paid: Money,
    pub paid_date: Option<NaiveDate>,
    pub payment_id: Option<PaymentId>,
    pub outstanding_amount: Money,
    pub is_partial: bool,
    pub is_late: bool,
    pub is_early: bool,
    pub status: InstallmentStatus,
}

impl Installment {
    /// last day the installment can be paid without being late
    pub fn lateness_anchor(&self) -> NaiveDate {
        self.grace_expiry.unwrap_or(self.due_date)
    }

    pub fn is_settled(&self) -> bool {
        self.status == InstallmentStatus::Paid
    }

    pub fn remaining_fee(&self) -> Money {
        self.fee.saturating_sub(self.fee_paid)
    }

    pub fn remaining_interest(&self) -> Money {
        self.interest.saturating_sub(self.interest_paid)
    }

    pub fn remaining_principal(&self) -> Money {
        self.principal.saturating_sub(self.principal_paid)
    }

    /// clear everything a payment may have changed
    pub fn reset_payments(&mut self) {
        self.paid_amount = Money::ZERO;
        self.principal_paid = Money::ZERO;
        self.interest_paid = Money::ZERO;
        self.fee_paid = Money::ZERO;
        self.paid_date = None;
        self.payment_id = None;
        self.outstanding_amount = self.scheduled_amount;
        self.is_partial = false;
        self.is_late = false;
        self.is_early = false;
        self.status = InstallmentStatus::Pending;
    }
}

/// totals of a generated schedule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub principal: Money,
    pub interest: Money,
    pub fees: Money,
    pub total_payable: Money,
    pub installment_count: u32,
    pub first_due_date: NaiveDate,
    pub maturity_date: NaiveDate,
}

/// ordered installment plan of a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub loan_id: LoanId,
    pub interest_method: InterestMethodKind,
    pub installments: Vec<Installment>,
    pub summary: ScheduleSummary,
}

impl Schedule {
    /// get installment by its 1-based number
    pub fn get(&self, number: u32) -> Option<&Installment> {
        if number == 0 {
            return None;
        }
        self.installments.get((number - 1) as usize)
    }

    pub fn get_mut(&mut self, number: u32) -> Option<&mut Installment> {
        if number == 0 {
            return None;
        }
        self.installments.get_mut((number - 1) as usize)
    }

    /// lowest-numbered installment not yet fully paid
    pub fn first_unpaid(&self) -> Option<&Installment> {
        self.installments.iter().find(|i| !i.is_settled())
    }

    pub fn maturity_date(&self) -> NaiveDate {
        self.summary.maturity_date
    }

    pub fn len(&self) -> usize {
        self.installments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installments.is_empty()
    }

    /// schedule with every installment back to its generated state
    pub fn pristine(&self) -> Schedule {
        let mut schedule = self.clone();
        for installment in &mut schedule.installments {
            installment.reset_payments();
        }
        schedule
    }
}
