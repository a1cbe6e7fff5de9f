use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{EngineConfig, LoanTerms};
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::interest::{PenaltyAssessment, PenaltyEngine};
use crate::schedule::{Installment, Schedule};
use crate::types::{LoanId, LoanStatus, PaymentId, PaymentStatus};

use super::waterfall::{self, Obligations, WaterfallSplit};
use super::{CumulativeTotals, Payment, PaymentRequest};

/// everything the allocator reads; nothing here is mutated
#[derive(Debug, Clone, Copy)]
pub struct AllocationContext<'a> {
    pub terms: &'a LoanTerms,
    pub schedule: &'a Schedule,
    pub totals: &'a CumulativeTotals,
    pub status: LoanStatus,
    pub today: NaiveDate,
}

/// breakdown of one incoming payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub loan_id: LoanId,
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub installment_number: u32,
    pub scheduled_amount: Money,
    pub penalty: PenaltyAssessment,
    pub split: WaterfallSplit,
    pub is_late: bool,
    pub days_late: i64,
    pub is_early: bool,
    pub is_partial: bool,
    pub is_overpayment: bool,
    /// excess over everything still due on the loan
    pub overpayment_amount: Money,
    pub outstanding_after: Money,
}

impl Allocation {
    /// turn the allocation into the payment record the caller persists
    pub fn into_payment(self, id: PaymentId, sequence: u64, reference: String) -> Payment {
        Payment {
            id,
            loan_id: self.loan_id,
            sequence,
            payment_date: self.payment_date,
            amount: self.amount,
            principal_paid: self.split.principal,
            interest_paid: self.split.interest,
            fees_paid: self.split.fees,
            penalty_paid: self.split.penalty,
            penalty_assessed: self.penalty.assessed,
            outstanding_balance: self.outstanding_after,
            is_late: self.is_late,
            days_late: self.days_late,
            is_early: self.is_early,
            is_partial: self.is_partial,
            is_overpayment: self.is_overpayment,
            overpayment_amount: self.overpayment_amount,
            installment_number: self.installment_number,
            status: PaymentStatus::Recorded,
            reference,
        }
    }
}

/// allocates incoming payments across penalty, fees, interest and principal
pub struct PaymentAllocator<'c> {
    config: &'c EngineConfig,
}

impl<'c> PaymentAllocator<'c> {
    pub fn new(config: &'c EngineConfig) -> Self {
        Self { config }
    }

    pub fn allocate(&self, ctx: &AllocationContext<'_>, request: &PaymentRequest) -> Result<Allocation> {
        let loan_id = ctx.terms.loan_id;
        self.validate(ctx, request)?;

        let target = self.target_installment(ctx, request)?;

        let anchor = target.lateness_anchor();
        let is_late = request.payment_date > anchor;
        let days_late = if is_late {
            (request.payment_date - anchor).num_days()
        } else {
            0
        };
        let is_early = request.payment_date < target.due_date;

        let penalty = PenaltyEngine::new(ctx.terms).assess(
            ctx.totals.outstanding_balance(),
            ctx.totals.unpaid_penalty(),
            days_late,
        );

        let owed = Obligations {
            penalty: penalty.total_due(),
            fees: ctx.totals.remaining_fees(),
            interest: ctx.totals.remaining_interest(),
            principal: ctx.totals.remaining_principal(),
        };
        let split = waterfall::split(request.amount, &owed);

        let scheduled = target.scheduled_amount;
        let is_partial = request.amount.as_decimal() < scheduled.as_decimal() * self.config.partial_threshold;
        let is_overpayment =
            request.amount.as_decimal() > scheduled.as_decimal() * self.config.overpayment_threshold;

        let outstanding_after = ctx.totals.outstanding_balance() + penalty.assessed - split.applied();

        debug!(
            %loan_id,
            installment = target.number,
            amount = %request.amount,
            penalty = %split.penalty,
            fees = %split.fees,
            interest = %split.interest,
            principal = %split.principal,
            excess = %split.excess,
            is_late,
            "allocated payment"
        );

        Ok(Allocation {
            loan_id,
            amount: request.amount,
            payment_date: request.payment_date,
            installment_number: target.number,
            scheduled_amount: scheduled,
            penalty,
            split,
            is_late,
            days_late,
            is_early,
            is_partial,
            is_overpayment,
            overpayment_amount: split.excess,
            outstanding_after,
        })
    }

    fn validate(&self, ctx: &AllocationContext<'_>, request: &PaymentRequest) -> Result<()> {
        let loan_id = ctx.terms.loan_id;
        let invalid = |message: String| LedgerError::InvalidPayment {
            loan_id,
            payment: None,
            message,
        };

        if request.loan_id != loan_id {
            return Err(invalid(format!("payment addressed to loan {}", request.loan_id)));
        }

        match ctx.status {
            LoanStatus::Closed => return Err(LedgerError::AlreadyClosed { loan_id }),
            LoanStatus::Defaulted => return Err(LedgerError::AlreadyDefaulted { loan_id }),
            _ => {}
        }

        if !request.amount.is_positive() {
            return Err(invalid(format!("amount must be positive, got {}", request.amount)));
        }

        let latest_allowed = ctx
            .today
            .checked_add_days(Days::new(self.config.future_date_tolerance_days.max(0) as u64))
            .unwrap_or(ctx.today);
        if request.payment_date > latest_allowed {
            return Err(invalid(format!(
                "payment date {} is in the future (today {})",
                request.payment_date, ctx.today
            )));
        }

        if request.payment_date < ctx.terms.disbursement_date {
            return Err(invalid(format!(
                "payment date {} precedes disbursement on {}",
                request.payment_date, ctx.terms.disbursement_date
            )));
        }

        Ok(())
    }

    /// requested installment, else the oldest unpaid one (the last when all are paid)
    fn target_installment<'s>(
        &self,
        ctx: &AllocationContext<'s>,
        request: &PaymentRequest,
    ) -> Result<&'s Installment> {
        let loan_id = ctx.terms.loan_id;
        match request.installment_number {
            Some(number) => ctx
                .schedule
                .get(number)
                .filter(|installment| installment.loan_id == loan_id)
                .ok_or(LedgerError::UnknownInstallment {
                    loan_id,
                    installment_number: number,
                }),
            None => ctx
                .schedule
                .first_unpaid()
                .or_else(|| ctx.schedule.installments.last())
                .ok_or(LedgerError::UnknownInstallment {
                    loan_id,
                    installment_number: 0,
                }),
        }
    }
}
