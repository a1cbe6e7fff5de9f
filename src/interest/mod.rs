pub mod penalty;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::LoanTerms;
use crate::decimal::{Money, Rate};
use crate::types::{InterestMethodKind, RepaymentFrequency, TimeUnit};

pub use penalty::{PenaltyAssessment, PenaltyEngine};

/// precision kept while raising rates to a power
const FACTOR_DP: u32 = 18;

/// interest method resolved from the terms, carrying only what the generator needs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InterestPlan {
    /// total interest fixed up front
    Flat { total_interest: Money },
    /// equal installments, interest on the remaining balance
    Reducing { periodic_rate: Rate },
    /// principal compounded once per repayment period
    Compound { periodic_rate: Rate },
}

impl InterestPlan {
    /// resolve the interest method of the terms once
    pub fn resolve(terms: &LoanTerms) -> Self {
        match terms.interest_method {
            InterestMethodKind::Flat => {
                let interest = terms.principal
                    * (terms.interest_rate.as_decimal() * terms.flat_interest_periods());
                InterestPlan::Flat {
                    total_interest: interest.round_cents(),
                }
            }
            InterestMethodKind::Reducing => InterestPlan::Reducing {
                periodic_rate: periodic_rate(terms.interest_rate, terms.rate_per, terms.frequency),
            },
            InterestMethodKind::Compound => InterestPlan::Compound {
                periodic_rate: periodic_rate(terms.interest_rate, terms.rate_per, terms.frequency),
            },
        }
    }

    pub fn kind(&self) -> InterestMethodKind {
        match self {
            InterestPlan::Flat { .. } => InterestMethodKind::Flat,
            InterestPlan::Reducing { .. } => InterestMethodKind::Reducing,
            InterestPlan::Compound { .. } => InterestMethodKind::Compound,
        }
    }
}

/// convert a rate quoted per `rate_per` into the rate for one repayment period
pub fn periodic_rate(rate: Rate, rate_per: TimeUnit, frequency: RepaymentFrequency) -> Rate {
    if frequency.matches(rate_per) {
        return rate;
    }
    let annual = rate.as_decimal() * rate_per.per_year();
    Rate::from_decimal(annual / frequency.periods_per_year())
}

/// (1 + r)^n
pub fn compound_factor(rate: Rate, periods: u32) -> Decimal {
    let base = Decimal::ONE + rate.as_decimal();
    let mut factor = Decimal::ONE;
    for _ in 0..periods {
        factor = (factor * base).round_dp(FACTOR_DP);
    }
    factor
}

/// equal periodic installment: P·r·(1+r)^n / ((1+r)^n − 1), or P/n without interest
pub fn emi(principal: Money, periodic_rate: Rate, periods: u32) -> Money {
    if periods == 0 {
        return principal;
    }
    let r = periodic_rate.as_decimal();
    if r.is_zero() {
        return (principal / Decimal::from(periods)).round_cents();
    }
    let factor = compound_factor(periodic_rate, periods);
    let amount = principal.as_decimal() * r * factor / (factor - Decimal::ONE);
    Money::from_decimal(amount).round_cents()
}
