use chrono::{Days, Months, NaiveDate};

use crate::config::LoanTerms;
use crate::errors::{LedgerError, Result};
use crate::types::RepaymentFrequency;

/// move `date` forward by `periods` repayment periods
///
/// month-based frequencies step in calendar months from the anchor, so a
/// schedule anchored on the 31st lands on the last day of shorter months
/// without drifting afterwards.
pub fn advance(date: NaiveDate, frequency: RepaymentFrequency, periods: u32) -> Option<NaiveDate> {
    match frequency {
        RepaymentFrequency::Daily => date.checked_add_days(Days::new(u64::from(periods))),
        RepaymentFrequency::Weekly => date.checked_add_days(Days::new(7 * u64::from(periods))),
        RepaymentFrequency::Biweekly => date.checked_add_days(Days::new(14 * u64::from(periods))),
        RepaymentFrequency::Monthly => date.checked_add_months(Months::new(periods)),
        RepaymentFrequency::Quarterly => date.checked_add_months(Months::new(3 * periods)),
        RepaymentFrequency::Yearly => date.checked_add_months(Months::new(12 * periods)),
    }
}

/// first repayment date, defaulting to one period after disbursement
pub fn first_due_date(terms: &LoanTerms) -> Result<NaiveDate> {
    match terms.first_repayment_date {
        Some(date) => Ok(date),
        None => advance(terms.disbursement_date, terms.frequency, 1).ok_or_else(|| {
            LedgerError::InvalidTerms {
                loan_id: terms.loan_id,
                message: "first repayment date out of range".to_string(),
            }
        }),
    }
}

/// due dates for every installment, in order
pub fn due_dates(terms: &LoanTerms) -> Result<Vec<NaiveDate>> {
    let first = first_due_date(terms)?;
    (0..terms.number_of_installments)
        .map(|k| {
            advance(first, terms.frequency, k).ok_or_else(|| LedgerError::InvalidTerms {
                loan_id: terms.loan_id,
                message: format!("due date of installment {} out of range", k + 1),
            })
        })
        .collect()
}

/// grace expiry for a due date, only when grace days are configured
pub fn grace_expiry(due_date: NaiveDate, grace_period_days: u32) -> Option<NaiveDate> {
    if grace_period_days == 0 {
        return None;
    }
    due_date.checked_add_days(Days::new(u64::from(grace_period_days)))
}
