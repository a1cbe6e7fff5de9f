use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::types::{InterestMethodKind, LoanId, RepaymentFrequency, TimeUnit};

/// how the penalty due on a late payment is computed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PenaltyPolicy {
    /// no penalty on late payments
    None,
    /// the terms' late fee, once per late payment
    FlatPerPayment,
    /// daily rate on the outstanding balance for every day late
    DailyRate { rate: Rate },
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        PenaltyPolicy::FlatPerPayment
    }
}

/// commercial terms of a loan, frozen once disbursed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub loan_id: LoanId,
    pub principal: Money,
    /// rate as a fraction, quoted per `rate_per`
    pub interest_rate: Rate,
    pub interest_method: InterestMethodKind,
    pub rate_per: TimeUnit,
    pub duration: u32,
    pub duration_unit: TimeUnit,
    pub frequency: RepaymentFrequency,
    pub number_of_installments: u32,
    pub grace_period_days: u32,
    pub processing_fee: Money,
    pub late_fee: Money,
    #[serde(default)]
    pub penalty_policy: PenaltyPolicy,
    pub disbursement_date: NaiveDate,
    pub first_repayment_date: Option<NaiveDate>,
}

impl LoanTerms {
    pub fn builder() -> LoanTermsBuilder {
        LoanTermsBuilder::new()
    }

    /// monthly loan whose duration equals its installment count
    pub fn monthly(
        principal: Money,
        rate: Rate,
        method: InterestMethodKind,
        installments: u32,
        disbursement_date: NaiveDate,
    ) -> Self {
        Self {
            loan_id: Uuid::new_v4(),
            principal,
            interest_rate: rate,
            interest_method: method,
            rate_per: TimeUnit::Year,
            duration: installments,
            duration_unit: TimeUnit::Month,
            frequency: RepaymentFrequency::Monthly,
            number_of_installments: installments,
            grace_period_days: 0,
            processing_fee: Money::ZERO,
            late_fee: Money::ZERO,
            penalty_policy: PenaltyPolicy::FlatPerPayment,
            disbursement_date,
            first_repayment_date: None,
        }
    }

    /// weekly group loan, rate quoted per month, with a short grace period
    pub fn weekly_group(
        principal: Money,
        monthly_rate: Rate,
        weeks: u32,
        disbursement_date: NaiveDate,
    ) -> Self {
        Self {
            loan_id: Uuid::new_v4(),
            principal,
            interest_rate: monthly_rate,
            interest_method: InterestMethodKind::Flat,
            rate_per: TimeUnit::Month,
            duration: weeks,
            duration_unit: TimeUnit::Week,
            frequency: RepaymentFrequency::Weekly,
            number_of_installments: weeks,
            grace_period_days: 2,
            processing_fee: Money::ZERO,
            late_fee: Money::ZERO,
            penalty_policy: PenaltyPolicy::FlatPerPayment,
            disbursement_date,
            first_repayment_date: None,
        }
    }

    /// loan term expressed in rate-basis units
    pub fn term_in_rate_units(&self) -> Decimal {
        let duration = Decimal::from(self.duration);
        if self.duration_unit == self.rate_per {
            return duration;
        }
        duration / self.duration_unit.per_year() * self.rate_per.per_year()
    }

    /// rate periods charged by the flat method, never less than one whole period
    ///
    /// a six month loan at 20% per year is charged the full 20%.
    pub fn flat_interest_periods(&self) -> Decimal {
        self.term_in_rate_units().max(Decimal::ONE)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| LedgerError::InvalidTerms {
            loan_id: self.loan_id,
            message: message.to_string(),
        };

        if !self.principal.is_positive() {
            return Err(invalid("principal must be positive"));
        }
        if self.number_of_installments == 0 {
            return Err(invalid("number of installments must be positive"));
        }
        if self.duration == 0 {
            return Err(invalid("duration must be positive"));
        }
        if self.interest_rate.is_negative() {
            return Err(invalid("interest rate cannot be negative"));
        }
        if self.processing_fee.is_negative() || self.late_fee.is_negative() {
            return Err(invalid("fees cannot be negative"));
        }
        if let PenaltyPolicy::DailyRate { rate } = &self.penalty_policy {
            if rate.is_negative() {
                return Err(invalid("penalty rate cannot be negative"));
            }
        }
        if let Some(first) = self.first_repayment_date {
            if first < self.disbursement_date {
                return Err(invalid("first repayment date precedes disbursement"));
            }
        }
        Ok(())
    }
}

/// builder for loan terms
#[derive(Debug, Default)]
pub struct LoanTermsBuilder {
    loan_id: Option<LoanId>,
    principal: Option<Money>,
    interest_rate: Option<Rate>,
    interest_method: Option<InterestMethodKind>,
    rate_per: Option<TimeUnit>,
    duration: Option<(u32, TimeUnit)>,
    frequency: Option<RepaymentFrequency>,
    number_of_installments: Option<u32>,
    grace_period_days: u32,
    processing_fee: Money,
    late_fee: Money,
    penalty_policy: PenaltyPolicy,
    disbursement_date: Option<NaiveDate>,
    first_repayment_date: Option<NaiveDate>,
}

impl LoanTermsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loan_id(mut self, id: LoanId) -> Self {
        self.loan_id = Some(id);
        self
    }

    pub fn principal(mut self, principal: Money) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn rate(mut self, rate: Rate, per: TimeUnit) -> Self {
        self.interest_rate = Some(rate);
        self.rate_per = Some(per);
        self
    }

    pub fn method(mut self, method: InterestMethodKind) -> Self {
        self.interest_method = Some(method);
        self
    }

    pub fn duration(mut self, duration: u32, unit: TimeUnit) -> Self {
        self.duration = Some((duration, unit));
        self
    }

    pub fn frequency(mut self, frequency: RepaymentFrequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn installments(mut self, count: u32) -> Self {
        self.number_of_installments = Some(count);
        self
    }

    pub fn grace_period_days(mut self, days: u32) -> Self {
        self.grace_period_days = days;
        self
    }

    pub fn processing_fee(mut self, fee: Money) -> Self {
        self.processing_fee = fee;
        self
    }

    pub fn late_fee(mut self, fee: Money) -> Self {
        self.late_fee = fee;
        self
    }

    pub fn penalty_policy(mut self, policy: PenaltyPolicy) -> Self {
        self.penalty_policy = policy;
        self
    }

    pub fn disbursement_date(mut self, date: NaiveDate) -> Self {
        self.disbursement_date = Some(date);
        self
    }

    pub fn first_repayment_date(mut self, date: NaiveDate) -> Self {
        self.first_repayment_date = Some(date);
        self
    }

    pub fn build(self) -> Result<LoanTerms> {
        let loan_id = self.loan_id.unwrap_or_else(Uuid::new_v4);
        let missing = |field: &str| LedgerError::InvalidTerms {
            loan_id,
            message: format!("{} required", field),
        };

        let principal = self.principal.ok_or_else(|| missing("principal"))?;
        let interest_rate = self.interest_rate.ok_or_else(|| missing("interest rate"))?;
        let rate_per = self.rate_per.unwrap_or(TimeUnit::Year);
        let frequency = self.frequency.unwrap_or(RepaymentFrequency::Monthly);
        let number_of_installments = self
            .number_of_installments
            .ok_or_else(|| missing("number of installments"))?;
        let disbursement_date = self
            .disbursement_date
            .ok_or_else(|| missing("disbursement date"))?;

        // without an explicit duration the term spans the installments
        let (duration, duration_unit) = self.duration.unwrap_or_else(|| match frequency {
            RepaymentFrequency::Daily => (number_of_installments, TimeUnit::Day),
            RepaymentFrequency::Weekly => (number_of_installments, TimeUnit::Week),
            RepaymentFrequency::Biweekly => (number_of_installments * 2, TimeUnit::Week),
            RepaymentFrequency::Monthly => (number_of_installments, TimeUnit::Month),
            RepaymentFrequency::Quarterly => (number_of_installments * 3, TimeUnit::Month),
            RepaymentFrequency::Yearly => (number_of_installments, TimeUnit::Year),
        });

        let terms = LoanTerms {
            loan_id,
            principal,
            interest_rate,
            interest_method: self.interest_method.unwrap_or(InterestMethodKind::Reducing),
            rate_per,
            duration,
            duration_unit,
            frequency,
            number_of_installments,
            grace_period_days: self.grace_period_days,
            processing_fee: self.processing_fee,
            late_fee: self.late_fee,
            penalty_policy: self.penalty_policy,
            disbursement_date,
            first_repayment_date: self.first_repayment_date,
        };

        terms.validate()?;
        Ok(terms)
    }
}

/// thresholds and switches for the ledger engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// payments below this share of the installment are partial
    pub partial_threshold: Decimal,
    /// payments above this share of the installment are overpayments
    pub overpayment_threshold: Decimal,
    /// rounding tolerance when deciding a loan is fully paid
    pub closed_tolerance: Money,
    /// days past maturity before a loan is overdue
    pub overdue_after_maturity_days: u32,
    /// months past maturity before a loan is defaulted
    pub default_after_maturity_months: u32,
    /// days late after which the ledger raises its default flag
    pub default_flag_days_late: i64,
    /// days a payment may be dated ahead of today (timezone skew)
    pub future_date_tolerance_days: i64,
    /// rebuild from history when an incremental update breaks an invariant
    pub rebuild_on_inconsistency: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            partial_threshold: dec!(0.95),
            overpayment_threshold: dec!(1.05),
            closed_tolerance: Money::CENT,
            overdue_after_maturity_days: 14,
            default_after_maturity_months: 6,
            default_flag_days_late: 90,
            future_date_tolerance_days: 1,
            rebuild_on_inconsistency: true,
        }
    }
}

impl EngineConfig {
    /// load from json, missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| LedgerError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.partial_threshold <= Decimal::ZERO || self.partial_threshold > Decimal::ONE {
            return Err(LedgerError::InvalidConfiguration {
                message: format!("partial threshold out of range: {}", self.partial_threshold),
            });
        }
        if self.overpayment_threshold < Decimal::ONE {
            return Err(LedgerError::InvalidConfiguration {
                message: format!("overpayment threshold below 1: {}", self.overpayment_threshold),
            });
        }
        if self.closed_tolerance.is_negative() {
            return Err(LedgerError::InvalidConfiguration {
                message: "closed tolerance cannot be negative".to_string(),
            });
        }
        if self.future_date_tolerance_days < 0 || self.default_flag_days_late < 0 {
            return Err(LedgerError::InvalidConfiguration {
                message: "day thresholds cannot be negative".to_string(),
            });
        }
        Ok(())
    }
}
