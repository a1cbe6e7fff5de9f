use chrono::NaiveDate;
use tracing::{debug, info};

use crate::config::LoanTerms;
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::interest::{self, InterestPlan};
use crate::types::{InstallmentStatus, LoanId};

use super::calendar;
use super::{Installment, Schedule, ScheduleSummary};

/// principal, interest and fee portions of one installment
#[derive(Debug, Clone, Copy)]
struct Portions {
    principal: Money,
    interest: Money,
    fee: Money,
}

/// turns loan terms into an installment plan
pub struct ScheduleGenerator;

impl ScheduleGenerator {
    /// generate the full schedule; regeneration replaces any earlier schedule wholesale
    pub fn generate(terms: &LoanTerms) -> Result<Schedule> {
        terms.validate()?;

        let plan = InterestPlan::resolve(terms);
        let due_dates = calendar::due_dates(terms)?;
        let n = terms.number_of_installments;

        let portions = match plan {
            InterestPlan::Flat { total_interest } => {
                Self::even_portions(terms.principal, total_interest, terms.processing_fee, n)
            }
            InterestPlan::Reducing { periodic_rate } => {
                Self::reducing_portions(terms.principal, periodic_rate, terms.processing_fee, n)
            }
            InterestPlan::Compound { periodic_rate } => {
                let factor = interest::compound_factor(periodic_rate, n);
                let total = (terms.principal * factor).round_cents();
                let total_interest = total - terms.principal;
                Self::even_portions(terms.principal, total_interest, terms.processing_fee, n)
            }
        };

        let total_payable: Money = portions
            .iter()
            .map(|p| p.principal + p.interest + p.fee)
            .sum();

        let installments = Self::build_installments(
            terms.loan_id,
            &due_dates,
            &portions,
            terms.grace_period_days,
            total_payable,
        );

        let summary = ScheduleSummary {
            principal: portions.iter().map(|p| p.principal).sum(),
            interest: portions.iter().map(|p| p.interest).sum(),
            fees: portions.iter().map(|p| p.fee).sum(),
            total_payable,
            installment_count: n,
            first_due_date: Self::edge_date(terms.loan_id, due_dates.first())?,
            maturity_date: Self::edge_date(terms.loan_id, due_dates.last())?,
        };

        info!(
            loan_id = %terms.loan_id,
            method = ?plan.kind(),
            installments = n,
            total_payable = %summary.total_payable,
            "generated repayment schedule"
        );

        Ok(Schedule {
            loan_id: terms.loan_id,
            interest_method: plan.kind(),
            installments,
            summary,
        })
    }

    /// identical portions per installment, the last one absorbing rounding
    fn even_portions(principal: Money, interest: Money, fee: Money, n: u32) -> Vec<Portions> {
        let principals = principal.split_even(n);
        let interests = interest.split_even(n);
        let fees = fee.split_even(n);

        principals
            .into_iter()
            .zip(interests)
            .zip(fees)
            .map(|((principal, interest), fee)| Portions {
                principal,
                interest,
                fee,
            })
            .collect()
    }

    /// constant EMI with interest on the remaining balance; fee on the first installment
    fn reducing_portions(principal: Money, periodic_rate: Rate, fee: Money, n: u32) -> Vec<Portions> {
        let emi = interest::emi(principal, periodic_rate, n);
        debug!(%emi, rate = %periodic_rate, "reducing balance installment");

        let mut balance = principal;
        let mut portions = Vec::with_capacity(n as usize);

        for i in 1..=n {
            let interest = (balance * periodic_rate.as_decimal()).round_cents();
            let principal_portion = if i == n {
                balance
            } else {
                (emi - interest).max(Money::ZERO).min(balance)
            };

            portions.push(Portions {
                principal: principal_portion,
                interest,
                fee: if i == 1 { fee } else { Money::ZERO },
            });

            balance -= principal_portion;
        }

        portions
    }

    fn build_installments(
        loan_id: LoanId,
        due_dates: &[NaiveDate],
        portions: &[Portions],
        grace_period_days: u32,
        total_payable: Money,
    ) -> Vec<Installment> {
        let mut cumulative_due = Money::ZERO;

        due_dates
            .iter()
            .zip(portions)
            .enumerate()
            .map(|(index, (due_date, portion))| {
                let scheduled_amount = portion.principal + portion.interest + portion.fee;
                cumulative_due += scheduled_amount;

                Installment {
                    loan_id,
                    number: index as u32 + 1,
                    due_date: *due_date,
                    grace_expiry: calendar::grace_expiry(*due_date, grace_period_days),
                    scheduled_amount,
                    principal: portion.principal,
                    interest: portion.interest,
                    fee: portion.fee,
                    cumulative_due,
                    outstanding_after: total_payable - cumulative_due,
                    paid_amount: Money::ZERO,
                    principal_paid: Money::ZERO,
                    interest_paid: Money::ZERO,
                    fee_paid: Money::ZERO,
                    paid_date: None,
                    payment_id: None,
                    outstanding_amount: scheduled_amount,
                    is_partial: false,
                    is_late: false,
                    is_early: false,
                    status: InstallmentStatus::Pending,
                }
            })
            .collect()
    }

    fn edge_date(loan_id: LoanId, date: Option<&NaiveDate>) -> Result<NaiveDate> {
        date.copied().ok_or_else(|| LedgerError::InvalidTerms {
            loan_id,
            message: "schedule has no installments".to_string(),
        })
    }
}
