use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hourglass_rs::SafeTimeProvider;
use tracing::{debug, info};

use crate::config::{EngineConfig, LoanTerms};
use crate::errors::{LedgerError, Result};
use crate::events::Event;
use crate::ledger::LedgerAggregate;
use crate::loan::LoanAccount;
use crate::payments::{Payment, PaymentRequest};
use crate::reconcile::DriftReport;
use crate::types::{DisbursementStatus, LoanId, LoanStatus, PaymentId};

/// registry of loan accounts
///
/// each loan sits behind its own mutex, so a read-allocate-write cycle on one
/// loan never interleaves with another on the same loan, while different loans
/// proceed in parallel. the map's shard lock is only held long enough to clone
/// the loan's handle.
pub struct LoanBook {
    loans: DashMap<LoanId, Arc<Mutex<LoanAccount>>>,
    config: EngineConfig,
}

impl LoanBook {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            loans: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }

    pub fn contains(&self, loan_id: LoanId) -> bool {
        self.loans.contains_key(&loan_id)
    }

    /// originate a loan from its terms and register it
    pub fn open(&self, terms: LoanTerms) -> Result<LoanId> {
        self.register(LoanAccount::originate(terms)?)
    }

    pub fn register(&self, account: LoanAccount) -> Result<LoanId> {
        let loan_id = account.id();
        match self.loans.entry(loan_id) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateLoan { loan_id }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(account)));
                debug!(%loan_id, "loan registered");
                Ok(loan_id)
            }
        }
    }

    /// run `f` with exclusive access to one loan
    pub fn with_loan<T>(&self, loan_id: LoanId, f: impl FnOnce(&mut LoanAccount) -> Result<T>) -> Result<T> {
        let handle = self
            .loans
            .get(&loan_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::LoanNotFound { loan_id })?;

        let mut account = handle.lock().map_err(|_| LedgerError::LockPoisoned { loan_id })?;
        f(&mut account)
    }

    pub fn disburse(&self, loan_id: LoanId, today: NaiveDate) -> Result<LedgerAggregate> {
        self.with_loan(loan_id, |account| account.disburse(today).cloned())
    }

    pub fn record_payment(&self, request: &PaymentRequest, today: NaiveDate) -> Result<Payment> {
        self.with_loan(request.loan_id, |account| {
            account.record_payment(request, &self.config, today)
        })
    }

    pub fn record_payment_at(&self, request: &PaymentRequest, time: &SafeTimeProvider) -> Result<Payment> {
        self.record_payment(request, time.now().date_naive())
    }

    pub fn reverse_payment(&self, loan_id: LoanId, payment_id: PaymentId, today: NaiveDate) -> Result<Payment> {
        self.with_loan(loan_id, |account| {
            account.reverse_payment(payment_id, &self.config, today)
        })
    }

    pub fn cancel_payment(&self, loan_id: LoanId, payment_id: PaymentId, today: NaiveDate) -> Result<Payment> {
        self.with_loan(loan_id, |account| {
            account.cancel_payment(payment_id, &self.config, today)
        })
    }

    /// snapshot of a loan's ledger
    pub fn ledger(&self, loan_id: LoanId) -> Result<LedgerAggregate> {
        self.with_loan(loan_id, |account| account.ledger().cloned())
    }

    /// re-assess every disbursed loan as of today
    pub fn refresh_all(&self, today: NaiveDate) -> Vec<(LoanId, Result<LoanStatus>)> {
        let results = self.for_each_disbursed(|account| account.refresh(today, &self.config));
        info!(loans = results.len(), %today, "refreshed loan statuses");
        results
    }

    /// rebuild every disbursed loan whose stored ledger drifted from its history
    pub fn recalculate_all(&self, today: NaiveDate) -> Vec<(LoanId, Result<DriftReport>)> {
        let results = self.for_each_disbursed(|account| account.reconcile(today, &self.config));
        let repaired = results
            .iter()
            .filter(|(_, r)| matches!(r, Ok(report) if !report.is_clean()))
            .count();
        info!(loans = results.len(), repaired, %today, "recalculated ledgers");
        results
    }

    /// collect pending events from every loan
    pub fn drain_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for (loan_id, handle) in self.handles() {
            match handle.lock() {
                Ok(mut account) => events.extend(account.take_events()),
                Err(_) => debug!(%loan_id, "skipping poisoned loan while draining events"),
            }
        }
        events
    }

    fn handles(&self) -> Vec<(LoanId, Arc<Mutex<LoanAccount>>)> {
        self.loans
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    /// one loan at a time, each under its own lock
    fn for_each_disbursed<T>(&self, mut f: impl FnMut(&mut LoanAccount) -> Result<T>) -> Vec<(LoanId, Result<T>)> {
        let mut results = Vec::new();
        for (loan_id, handle) in self.handles() {
            let outcome = match handle.lock() {
                Ok(mut account) => {
                    if account.disbursement != DisbursementStatus::Disbursed {
                        continue;
                    }
                    f(&mut account)
                }
                Err(_) => Err(LedgerError::LockPoisoned { loan_id }),
            };
            results.push((loan_id, outcome));
        }
        results
    }
}

impl Default for LoanBook {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Money, Rate};
    use crate::types::InterestMethodKind;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn terms() -> LoanTerms {
        let mut terms = LoanTerms::monthly(
            Money::from_major(1_000_000),
            Rate::from_percentage(20),
            InterestMethodKind::Flat,
            6,
            date(2024, 1, 1),
        );
        terms.processing_fee = Money::from_major(30_000);
        terms
    }

    fn book_with_loan() -> (LoanBook, LoanId) {
        let book = LoanBook::default();
        let loan_id = book.open(terms()).unwrap();
        book.disburse(loan_id, date(2024, 1, 1)).unwrap();
        (book, loan_id)
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let book = LoanBook::default();
        let account = LoanAccount::originate(terms()).unwrap();
        let loan_id = account.id();
        let twin = LoanAccount::originate(account.terms.clone()).unwrap();

        book.register(account).unwrap();
        assert_eq!(book.register(twin).unwrap_err(), LedgerError::DuplicateLoan { loan_id });
        assert_eq!(book.len(), 1);
        assert!(book.contains(loan_id));
    }

    #[test]
    fn test_unknown_loan() {
        let book = LoanBook::default();
        let loan_id = Uuid::new_v4();
        assert_eq!(book.ledger(loan_id).unwrap_err(), LedgerError::LoanNotFound { loan_id });
    }

    #[test]
    fn test_payment_through_book() {
        let (book, loan_id) = book_with_loan();
        let request = PaymentRequest::new(loan_id, Money::from_major(205_000), date(2024, 2, 1));
        let payment = book.record_payment(&request, date(2024, 2, 1)).unwrap();

        let ledger = book.ledger(loan_id).unwrap();
        assert_eq!(ledger.cumulative_payment, payment.applied_amount());
        assert_eq!(ledger.status, LoanStatus::InProgress);

        let reversed = book.reverse_payment(loan_id, payment.id, date(2024, 2, 2)).unwrap();
        assert_eq!(reversed.id, payment.id);
        assert_eq!(book.ledger(loan_id).unwrap().cumulative_payment, Money::ZERO);
    }

    #[test]
    fn test_concurrent_payments_on_one_loan_are_serialized() {
        let (book, loan_id) = book_with_loan();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let request = PaymentRequest::new(loan_id, Money::from_major(10_000), date(2024, 2, 1));
                    book.record_payment(&request, date(2024, 2, 1)).unwrap();
                });
            }
        });

        let ledger = book.ledger(loan_id).unwrap();
        assert_eq!(ledger.cumulative_payment, Money::from_major(80_000));
        assert_eq!(ledger.cumulative_fees, Money::from_major(30_000));
        assert_eq!(ledger.cumulative_interest, Money::from_major(50_000));
        assert_eq!(ledger.installments_paid, 8);
        assert!(ledger.check_invariants().is_ok());

        let sequences = book
            .with_loan(loan_id, |account| {
                Ok(account.payments.iter().map(|p| p.sequence).collect::<Vec<_>>())
            })
            .unwrap();
        assert_eq!(sequences, (0..8).collect::<Vec<u64>>());
    }

    #[test]
    fn test_different_loans_in_parallel() {
        let book = LoanBook::default();
        let ids: Vec<LoanId> = (0..4)
            .map(|_| {
                let id = book.open(terms()).unwrap();
                book.disburse(id, date(2024, 1, 1)).unwrap();
                id
            })
            .collect();

        std::thread::scope(|scope| {
            for id in &ids {
                let book = &book;
                scope.spawn(move || {
                    let request = PaymentRequest::new(*id, Money::from_major(205_000), date(2024, 2, 1));
                    book.record_payment(&request, date(2024, 2, 1)).unwrap();
                });
            }
        });

        for id in ids {
            assert_eq!(book.ledger(id).unwrap().installments_paid, 1);
        }
    }

    #[test]
    fn test_poisoned_loan_reports_error() {
        let (book, loan_id) = book_with_loan();

        std::thread::scope(|scope| {
            let handle = scope.spawn(|| {
                let _ = book.with_loan(loan_id, |_| -> Result<()> { panic!("writer crashed") });
            });
            assert!(handle.join().is_err());
        });

        assert_eq!(book.ledger(loan_id).unwrap_err(), LedgerError::LockPoisoned { loan_id });
        let refreshed = book.refresh_all(date(2024, 2, 1));
        assert!(matches!(refreshed[0].1, Err(LedgerError::LockPoisoned { .. })));
    }

    #[test]
    fn test_batch_operations_skip_pending_loans() {
        let (book, loan_id) = book_with_loan();
        book.open(terms()).unwrap();
        let request = PaymentRequest::new(loan_id, Money::from_major(205_000), date(2024, 2, 1));
        book.record_payment(&request, date(2024, 2, 1)).unwrap();

        let refreshed = book.refresh_all(date(2024, 3, 10));
        assert_eq!(refreshed.len(), 1);
        assert_eq!(refreshed[0].0, loan_id);
        assert_eq!(refreshed[0].1, Ok(LoanStatus::InProgress));

        book.with_loan(loan_id, |account| {
            if let Some(ledger) = account.ledger.as_mut() {
                ledger.on_time_payments = 0;
            }
            Ok(())
        })
        .unwrap();

        let recalculated = book.recalculate_all(date(2024, 3, 10));
        assert_eq!(recalculated.len(), 1);
        assert!(matches!(&recalculated[0].1, Ok(report) if !report.is_clean()));
        assert_eq!(book.ledger(loan_id).unwrap().on_time_payments, 1);

        let events = book.drain_events();
        assert!(events.iter().any(|e| matches!(e, Event::DriftDetected { .. })));
        assert!(book.drain_events().is_empty());
    }
}
