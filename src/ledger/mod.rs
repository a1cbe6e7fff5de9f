pub mod scoring;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::payments::{CumulativeTotals, Payment};
use crate::schedule::Schedule;
use crate::status::StatusClassifier;
use crate::types::{LoanId, LoanStatus};

use scoring::ScoreInputs;

/// days per month when converting lateness to months overdue
const DAYS_PER_MONTH: i64 = 30;

/// schedule pointer kept on the ledger
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DueCheckpoint {
    pub number: u32,
    pub due_date: NaiveDate,
    /// last day before the installment counts as late
    pub late_after: NaiveDate,
    pub amount: Money,
    pub cumulative_due: Money,
}

/// the parts of a recorded payment the ledger folds in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaymentPosting {
    pub payment_date: NaiveDate,
    pub amount: Money,
    pub principal: Money,
    pub interest: Money,
    pub fees: Money,
    pub penalty_assessed: Money,
    pub penalty_paid: Money,
    pub overpayment_amount: Money,
    pub is_late: bool,
    pub is_early: bool,
    pub is_partial: bool,
    pub is_overpayment: bool,
}

impl PaymentPosting {
    pub fn applied(&self) -> Money {
        self.principal + self.interest + self.fees + self.penalty_paid
    }
}

impl From<&Payment> for PaymentPosting {
    fn from(payment: &Payment) -> Self {
        Self {
            payment_date: payment.payment_date,
            amount: payment.amount,
            principal: payment.principal_paid,
            interest: payment.interest_paid,
            fees: payment.fees_paid,
            penalty_assessed: payment.penalty_assessed,
            penalty_paid: payment.penalty_paid,
            overpayment_amount: payment.overpayment_amount,
            is_late: payment.is_late,
            is_early: payment.is_early,
            is_partial: payment.is_partial,
            is_overpayment: payment.is_overpayment,
        }
    }
}

/// input to the ledger transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LedgerEvent {
    /// fold one recorded payment in
    Payment(PaymentPosting),
    /// re-derive lateness, missed installments and status as of a date
    Assess { as_of: NaiveDate },
}

/// derived financial state of one loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerAggregate {
    pub loan_id: LoanId,

    // original obligations
    pub original_principal: Money,
    pub original_interest: Money,
    pub original_fees: Money,
    pub total_due: Money,

    // cumulative amounts
    pub cumulative_payment: Money,
    pub cumulative_principal: Money,
    pub cumulative_interest: Money,
    pub cumulative_fees: Money,
    pub cumulative_penalty: Money,
    pub cumulative_penalty_paid: Money,
    pub cumulative_overpayment: Money,

    // outstanding
    pub outstanding_balance: Money,
    pub outstanding_principal: Money,
    pub outstanding_interest: Money,
    pub outstanding_fees: Money,
    pub outstanding_penalty: Money,

    // installments
    pub installments_paid: u32,
    pub installments_remaining: u32,
    pub total_installments: u32,
    pub next_due_date: Option<NaiveDate>,
    pub next_due_amount: Money,
    pub maturity_date: NaiveDate,
    pub checkpoints: Vec<DueCheckpoint>,

    // lateness
    pub is_late: bool,
    pub days_late: i64,
    pub months_overdue: i64,
    pub late_payments: u32,
    pub missed_payments: u32,
    pub early_payments: u32,
    pub on_time_payments: u32,
    pub is_defaulted: bool,
    pub default_date: Option<NaiveDate>,
    pub has_partial_payment: bool,
    pub has_overpayment: bool,
    pub last_payment_date: Option<NaiveDate>,
    pub last_payment_amount: Option<Money>,

    // scores and status
    pub payment_behavior_score: Decimal,
    pub default_risk_score: Decimal,
    pub status: LoanStatus,
    pub completion_percentage: Decimal,
    pub as_of: Option<NaiveDate>,
}

impl LedgerAggregate {
    /// opening ledger for a freshly disbursed loan
    pub fn initialize(schedule: &Schedule) -> Self {
        let summary = &schedule.summary;
        let checkpoints = schedule
            .installments
            .iter()
            .map(|i| DueCheckpoint {
                number: i.number,
                due_date: i.due_date,
                late_after: i.lateness_anchor(),
                amount: i.scheduled_amount,
                cumulative_due: i.cumulative_due,
            })
            .collect();

        let mut ledger = Self {
            loan_id: schedule.loan_id,
            original_principal: summary.principal,
            original_interest: summary.interest,
            original_fees: summary.fees,
            total_due: summary.total_payable,
            cumulative_payment: Money::ZERO,
            cumulative_principal: Money::ZERO,
            cumulative_interest: Money::ZERO,
            cumulative_fees: Money::ZERO,
            cumulative_penalty: Money::ZERO,
            cumulative_penalty_paid: Money::ZERO,
            cumulative_overpayment: Money::ZERO,
            outstanding_balance: summary.total_payable,
            outstanding_principal: summary.principal,
            outstanding_interest: summary.interest,
            outstanding_fees: summary.fees,
            outstanding_penalty: Money::ZERO,
            installments_paid: 0,
            installments_remaining: summary.installment_count,
            total_installments: summary.installment_count,
            next_due_date: None,
            next_due_amount: Money::ZERO,
            maturity_date: summary.maturity_date,
            checkpoints,
            is_late: false,
            days_late: 0,
            months_overdue: 0,
            late_payments: 0,
            missed_payments: 0,
            early_payments: 0,
            on_time_payments: 0,
            is_defaulted: false,
            default_date: None,
            has_partial_payment: false,
            has_overpayment: false,
            last_payment_date: None,
            last_payment_amount: None,
            payment_behavior_score: Decimal::ZERO,
            default_risk_score: Decimal::ZERO,
            status: LoanStatus::Open,
            completion_percentage: Decimal::ZERO,
            as_of: None,
        };
        ledger.recompute_derived();
        ledger
    }

    /// pure transition: the ledger after `event`
    pub fn apply(&self, event: &LedgerEvent, config: &EngineConfig) -> Result<LedgerAggregate> {
        let mut next = self.clone();
        match event {
            LedgerEvent::Payment(posting) => {
                next.fold_payment(posting);
                next.recompute_derived();
            }
            LedgerEvent::Assess { as_of } => {
                next.recompute_derived();
                next.assess(*as_of, config);
                next.recompute_scores();
            }
        }
        next.check_invariants()?;
        Ok(next)
    }

    /// cumulative view handed to the allocator
    pub fn totals(&self) -> CumulativeTotals {
        CumulativeTotals {
            original_principal: self.original_principal,
            original_interest: self.original_interest,
            original_fees: self.original_fees,
            total_due: self.total_due,
            paid: self.cumulative_payment,
            principal_paid: self.cumulative_principal,
            interest_paid: self.cumulative_interest,
            fees_paid: self.cumulative_fees,
            penalty_assessed: self.cumulative_penalty,
            penalty_paid: self.cumulative_penalty_paid,
        }
    }

    /// paid towards the schedule, penalties excluded
    pub fn scheduled_paid(&self) -> Money {
        self.cumulative_principal + self.cumulative_interest + self.cumulative_fees
    }

    pub fn has_payments(&self) -> bool {
        self.last_payment_date.is_some()
    }

    /// earliest installment not covered by what has been paid
    pub fn next_checkpoint(&self) -> Option<&DueCheckpoint> {
        let paid = self.scheduled_paid();
        self.checkpoints.iter().find(|c| c.cumulative_due > paid)
    }

    /// keep a default recorded earlier; the default date is never overwritten
    pub fn carry_forward_default(&mut self, previous: &LedgerAggregate) {
        if let Some(date) = previous.default_date {
            self.is_defaulted = true;
            self.default_date = Some(self.default_date.map_or(date, |d| d.min(date)));
        }
    }

    /// fold one payment into the running totals
    pub(crate) fn fold_payment(&mut self, posting: &PaymentPosting) {
        self.cumulative_payment += posting.applied();
        self.cumulative_principal += posting.principal;
        self.cumulative_interest += posting.interest;
        self.cumulative_fees += posting.fees;
        self.cumulative_penalty += posting.penalty_assessed;
        self.cumulative_penalty_paid += posting.penalty_paid;
        self.cumulative_overpayment += posting.overpayment_amount;

        self.installments_paid += 1;
        // ties go to the later posting, matching replay order
        if self.last_payment_date.map_or(true, |last| posting.payment_date >= last) {
            self.last_payment_date = Some(posting.payment_date);
            self.last_payment_amount = Some(posting.amount);
        }

        if posting.is_late {
            self.late_payments += 1;
        } else {
            self.on_time_payments += 1;
        }
        if posting.is_early {
            self.early_payments += 1;
        }
        self.has_partial_payment |= posting.is_partial;
        self.has_overpayment |= posting.is_overpayment;
    }

    /// outstanding balances, pointers, completion and scores from the cumulative fields
    pub(crate) fn recompute_derived(&mut self) {
        self.outstanding_principal = self.original_principal - self.cumulative_principal;
        self.outstanding_interest = self.original_interest - self.cumulative_interest;
        self.outstanding_fees = self.original_fees - self.cumulative_fees;
        self.outstanding_penalty = self.cumulative_penalty - self.cumulative_penalty_paid;
        self.outstanding_balance = self.total_due + self.cumulative_penalty - self.cumulative_payment;

        self.installments_remaining = self.total_installments.saturating_sub(self.installments_paid);

        let paid = self.scheduled_paid();
        let (next_date, next_amount) = match self.next_checkpoint() {
            Some(checkpoint) => (Some(checkpoint.due_date), checkpoint.cumulative_due - paid),
            None => (None, Money::ZERO),
        };
        self.next_due_date = next_date;
        self.next_due_amount = next_amount;

        self.completion_percentage = if self.total_due.is_positive() {
            (self.cumulative_payment.ratio(self.total_due) * Decimal::from(100))
                .min(Decimal::from(100))
                .round_dp(2)
        } else {
            Decimal::ZERO
        };

        self.recompute_scores();
    }

    pub(crate) fn recompute_scores(&mut self) {
        let inputs = ScoreInputs {
            installments_paid: self.installments_paid,
            late_payments: self.late_payments,
            on_time_payments: self.on_time_payments,
            early_payments: self.early_payments,
            missed_payments: self.missed_payments,
            days_late: self.days_late,
        };
        self.payment_behavior_score = scoring::behavior_score(&inputs);
        self.default_risk_score = scoring::default_risk_score(&inputs, self.payment_behavior_score);
    }

    /// lateness as of a date, measured from the earliest uncovered installment
    pub(crate) fn assess(&mut self, as_of: NaiveDate, config: &EngineConfig) {
        let paid = self.scheduled_paid();
        self.missed_payments = self
            .checkpoints
            .iter()
            .filter(|c| c.late_after < as_of && c.cumulative_due > paid)
            .count() as u32;

        let late_since = self
            .next_checkpoint()
            .map(|c| c.late_after)
            .filter(|late_after| as_of > *late_after);

        match late_since {
            Some(late_after) => {
                self.is_late = true;
                self.days_late = (as_of - late_after).num_days();
            }
            None => {
                self.is_late = false;
                self.days_late = 0;
            }
        }
        self.months_overdue = self.days_late / DAYS_PER_MONTH;

        if self.days_late > config.default_flag_days_late {
            self.is_defaulted = true;
            if self.default_date.is_none() {
                self.default_date = Some(as_of);
            }
        }

        self.status = StatusClassifier::new(config).transition(self.status, self, as_of);
        self.as_of = Some(as_of);
    }

    /// the balance identities every ledger must satisfy
    pub fn check_invariants(&self) -> Result<()> {
        let inconsistent = |field: &'static str, expected: Money, actual: Money| {
            LedgerError::InconsistentAggregate {
                loan_id: self.loan_id,
                field,
                expected,
                actual,
            }
        };

        let expected_balance = self.total_due + self.cumulative_penalty - self.cumulative_payment;
        if self.outstanding_balance != expected_balance {
            return Err(inconsistent("outstanding_balance", expected_balance, self.outstanding_balance));
        }

        let applied = self.scheduled_paid() + self.cumulative_penalty_paid;
        if self.cumulative_payment != applied {
            return Err(inconsistent("cumulative_payment", applied, self.cumulative_payment));
        }

        let obligations = self.original_principal + self.original_interest + self.original_fees;
        if self.total_due != obligations {
            return Err(inconsistent("total_due", obligations, self.total_due));
        }

        for (field, value) in [
            ("outstanding_principal", self.outstanding_principal),
            ("outstanding_interest", self.outstanding_interest),
            ("outstanding_fees", self.outstanding_fees),
            ("outstanding_penalty", self.outstanding_penalty),
        ] {
            if value.is_negative() {
                return Err(inconsistent(field, Money::ZERO, value));
            }
        }

        Ok(())
    }
}
