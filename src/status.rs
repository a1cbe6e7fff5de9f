use chrono::{Days, Months, NaiveDate};

use crate::config::EngineConfig;
use crate::ledger::LedgerAggregate;
use crate::types::LoanStatus;

/// ordered status rules, first match wins
pub struct StatusClassifier<'c> {
    config: &'c EngineConfig,
}

impl<'c> StatusClassifier<'c> {
    pub fn new(config: &'c EngineConfig) -> Self {
        Self { config }
    }

    /// status from the aggregate alone, ignoring any previous status
    pub fn classify(&self, ledger: &LedgerAggregate, today: NaiveDate) -> LoanStatus {
        if self.is_fully_paid(ledger) {
            return LoanStatus::Closed;
        }
        if !ledger.has_payments() {
            return LoanStatus::Open;
        }
        if today > self.default_after(ledger.maturity_date) {
            return LoanStatus::Defaulted;
        }
        if today > self.overdue_after(ledger.maturity_date) {
            return LoanStatus::Overdue;
        }
        LoanStatus::InProgress
    }

    /// next status given the current one; closed and defaulted never change
    pub fn transition(&self, previous: LoanStatus, ledger: &LedgerAggregate, today: NaiveDate) -> LoanStatus {
        if previous.is_terminal() {
            return previous;
        }
        self.classify(ledger, today)
    }

    /// schedule covered within tolerance and no penalty left owing
    ///
    /// only the scheduled portion of the payments counts toward the schedule.
    /// money that went to penalties does not, so a loan whose payments add up to
    /// the total due stays open while part of that total paid a penalty.
    pub fn is_fully_paid(&self, ledger: &LedgerAggregate) -> bool {
        let tolerance = self.config.closed_tolerance;
        ledger.total_due > tolerance
            && ledger.scheduled_paid() >= ledger.total_due - tolerance
            && ledger.outstanding_penalty <= tolerance
    }

    fn overdue_after(&self, maturity: NaiveDate) -> NaiveDate {
        maturity
            .checked_add_days(Days::new(self.config.overdue_after_maturity_days as u64))
            .unwrap_or(NaiveDate::MAX)
    }

    fn default_after(&self, maturity: NaiveDate) -> NaiveDate {
        maturity
            .checked_add_months(Months::new(self.config.default_after_maturity_months))
            .unwrap_or(NaiveDate::MAX)
    }
}
