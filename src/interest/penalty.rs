use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{LoanTerms, PenaltyPolicy};
use crate::decimal::Money;

/// penalty assessed for a single payment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PenaltyAssessment {
    /// newly assessed for this payment
    pub assessed: Money,
    /// assessed earlier and still unpaid
    pub carried_over: Money,
    pub days_charged: i64,
}

impl PenaltyAssessment {
    /// everything the waterfall must settle before fees
    pub fn total_due(&self) -> Money {
        self.assessed + self.carried_over
    }
}

/// engine for calculating late-payment penalties
pub struct PenaltyEngine<'a> {
    policy: &'a PenaltyPolicy,
    late_fee: Money,
}

impl<'a> PenaltyEngine<'a> {
    pub fn new(terms: &'a LoanTerms) -> Self {
        Self {
            policy: &terms.penalty_policy,
            late_fee: terms.late_fee,
        }
    }

    /// assess the penalty for a payment `days_late` past grace expiry
    pub fn assess(
        &self,
        outstanding_balance: Money,
        unpaid_penalty: Money,
        days_late: i64,
    ) -> PenaltyAssessment {
        let carried_over = unpaid_penalty.max(Money::ZERO);
        if days_late <= 0 {
            return PenaltyAssessment {
                assessed: Money::ZERO,
                carried_over,
                days_charged: 0,
            };
        }

        let assessed = match self.policy {
            PenaltyPolicy::None => Money::ZERO,
            PenaltyPolicy::FlatPerPayment => self.late_fee,
            PenaltyPolicy::DailyRate { rate } => {
                let base = outstanding_balance.max(Money::ZERO);
                (base * (rate.as_decimal() * Decimal::from(days_late))).round_cents()
            }
        };

        PenaltyAssessment {
            assessed,
            carried_over,
            days_charged: days_late,
        }
    }
}
