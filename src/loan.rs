use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, LoanTerms};
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::{LedgerAggregate, LedgerEvent, PaymentPosting};
use crate::payments::installments;
use crate::payments::{AllocationContext, Payment, PaymentAllocator, PaymentRequest};
use crate::reconcile::{DriftReport, Reconciler};
use crate::schedule::{Schedule, ScheduleGenerator};
use crate::types::{DisbursementStatus, LoanId, LoanStatus, PaymentId, PaymentStatus};

/// one loan: terms, schedule, payment history and the ledger derived from them
#[derive(Debug)]
pub struct LoanAccount {
    pub terms: LoanTerms,
    pub disbursement: DisbursementStatus,
    pub schedule: Schedule,
    pub payments: Vec<Payment>,
    pub ledger: Option<LedgerAggregate>,
    pub events: EventStore,
    next_sequence: u64,
}

impl LoanAccount {
    /// create a pending loan and its repayment schedule
    pub fn originate(terms: LoanTerms) -> Result<Self> {
        let schedule = ScheduleGenerator::generate(&terms)?;
        let mut account = Self {
            terms,
            disbursement: DisbursementStatus::Pending,
            schedule,
            payments: Vec::new(),
            ledger: None,
            events: EventStore::new(),
            next_sequence: 0,
        };
        account.emit_schedule();
        Ok(account)
    }

    pub fn id(&self) -> LoanId {
        self.terms.loan_id
    }

    /// current ledger; only disbursed loans have one
    pub fn ledger(&self) -> Result<&LedgerAggregate> {
        self.ledger.as_ref().ok_or(LedgerError::LoanNotActive {
            loan_id: self.id(),
            status: self.disbursement,
        })
    }

    pub fn status(&self) -> Option<LoanStatus> {
        self.ledger.as_ref().map(|l| l.status)
    }

    pub fn payment(&self, payment_id: PaymentId) -> Option<&Payment> {
        self.payments.iter().find(|p| p.id == payment_id)
    }

    /// replace the terms and regenerate the schedule, before disbursement only
    pub fn amend_terms(&mut self, mut terms: LoanTerms) -> Result<()> {
        self.require_pending("amend terms")?;
        terms.loan_id = self.id();
        let schedule = ScheduleGenerator::generate(&terms)?;
        self.terms = terms;
        self.schedule = schedule;
        self.emit_schedule();
        Ok(())
    }

    /// abandon a loan that was never disbursed
    pub fn cancel(&mut self, today: NaiveDate) -> Result<()> {
        self.require_pending("cancel")?;
        self.disbursement = DisbursementStatus::Cancelled;
        info!(loan_id = %self.id(), "loan cancelled before disbursement");
        self.events.emit(Event::LoanCancelled {
            loan_id: self.id(),
            date: today,
        });
        Ok(())
    }

    /// release funds and open the ledger
    pub fn disburse(&mut self, today: NaiveDate) -> Result<&LedgerAggregate> {
        self.require_pending("disburse")?;
        self.disbursement = DisbursementStatus::Disbursed;
        info!(
            loan_id = %self.id(),
            principal = %self.terms.principal,
            total_payable = %self.schedule.summary.total_payable,
            "loan disbursed"
        );
        self.events.emit(Event::LoanDisbursed {
            loan_id: self.id(),
            principal: self.terms.principal,
            date: today,
        });
        Ok(self.ledger.insert(LedgerAggregate::initialize(&self.schedule)))
    }

    pub fn disburse_at(&mut self, time: &SafeTimeProvider) -> Result<&LedgerAggregate> {
        self.disburse(time.now().date_naive())
    }

    /// allocate a payment, post it to the ledger and the installments, then re-assess
    pub fn record_payment(
        &mut self,
        request: &PaymentRequest,
        config: &EngineConfig,
        today: NaiveDate,
    ) -> Result<Payment> {
        let loan_id = self.id();
        let ledger = self.ledger()?.clone();

        let totals = ledger.totals();
        let ctx = AllocationContext {
            terms: &self.terms,
            schedule: &self.schedule,
            totals: &totals,
            status: ledger.status,
            today,
        };
        let allocation = PaymentAllocator::new(config).allocate(&ctx, request)?;

        let sequence = self.next_sequence;
        let mut payment = allocation.into_payment(Uuid::new_v4(), sequence, request.reference.clone());
        payment.status = PaymentStatus::Completed;

        // replay order is by date, so a payment older than the latest one is rebuilt in place
        let backdated = ledger
            .last_payment_date
            .is_some_and(|latest| payment.payment_date < latest);

        let touched = if backdated {
            info!(%loan_id, payment_date = %payment.payment_date, "backdated payment, rebuilding from history");
            self.commit_by_rebuild(&payment, today, config, "backdated payment")?
        } else {
            match ledger.apply(&LedgerEvent::Payment(PaymentPosting::from(&payment)), config) {
                Ok(next) => {
                    self.payments.push(payment.clone());
                    self.ledger = Some(next);
                    installments::apply_payment(&mut self.schedule, &payment)
                }
                Err(err) if err.needs_rebuild() && config.rebuild_on_inconsistency => {
                    warn!(%loan_id, error = %err, "incremental update rejected, rebuilding from history");
                    self.commit_by_rebuild(&payment, today, config, &err.to_string())?
                }
                Err(err) => return Err(err),
            }
        };
        self.next_sequence = sequence + 1;

        info!(
            %loan_id,
            payment_id = %payment.id,
            amount = %payment.amount,
            installment = payment.installment_number,
            is_late = payment.is_late,
            "payment recorded"
        );
        self.events.emit(Event::PaymentAllocated {
            loan_id,
            payment_id: payment.id,
            amount: payment.amount,
            penalty: payment.penalty_paid,
            fees: payment.fees_paid,
            interest: payment.interest_paid,
            principal: payment.principal_paid,
            overpayment: payment.overpayment_amount,
            installments: touched,
            date: payment.payment_date,
        });

        self.refresh(today, config)?;
        Ok(payment)
    }

    pub fn record_payment_at(
        &mut self,
        request: &PaymentRequest,
        config: &EngineConfig,
        time: &SafeTimeProvider,
    ) -> Result<Payment> {
        self.record_payment(request, config, time.now().date_naive())
    }

    /// mark a payment reversed and rebuild the ledger without it
    pub fn reverse_payment(
        &mut self,
        payment_id: PaymentId,
        config: &EngineConfig,
        today: NaiveDate,
    ) -> Result<Payment> {
        let payment = self.void_payment(payment_id, PaymentStatus::Reversed, config, today)?;
        self.events.emit(Event::PaymentReversed {
            loan_id: self.id(),
            payment_id,
            amount: payment.amount,
            date: today,
        });
        Ok(payment)
    }

    /// mark a payment cancelled and rebuild the ledger without it
    pub fn cancel_payment(
        &mut self,
        payment_id: PaymentId,
        config: &EngineConfig,
        today: NaiveDate,
    ) -> Result<Payment> {
        let payment = self.void_payment(payment_id, PaymentStatus::Cancelled, config, today)?;
        self.events.emit(Event::PaymentCancelled {
            loan_id: self.id(),
            payment_id,
            amount: payment.amount,
            date: today,
        });
        Ok(payment)
    }

    /// re-derive lateness, default flag, status and installment statuses as of today
    pub fn refresh(&mut self, today: NaiveDate, config: &EngineConfig) -> Result<LoanStatus> {
        let loan_id = self.id();
        let previous = self.ledger()?.clone();
        let next = previous.apply(&LedgerEvent::Assess { as_of: today }, config)?;

        for number in installments::refresh_statuses(&mut self.schedule, today) {
            if let Some(installment) = self.schedule.get(number) {
                self.events.emit(Event::InstallmentOverdue {
                    loan_id,
                    installment_number: number,
                    due_date: installment.due_date,
                    outstanding: installment.outstanding_amount,
                    date: today,
                });
            }
        }

        if next.is_defaulted && !previous.is_defaulted {
            warn!(%loan_id, days_late = next.days_late, "default flag raised");
            self.events.emit(Event::DefaultFlagRaised {
                loan_id,
                days_late: next.days_late,
                date: today,
            });
        }
        self.emit_status_change(previous.status, next.status, today);

        let status = next.status;
        self.ledger = Some(next);
        Ok(status)
    }

    /// audit the stored ledger and replace it with the rebuild when they disagree
    pub fn reconcile(&mut self, today: NaiveDate, config: &EngineConfig) -> Result<DriftReport> {
        let report = self.audit(config)?;
        if !report.is_clean() {
            self.events.emit(Event::DriftDetected {
                loan_id: self.id(),
                fields: report.drifts.iter().map(|d| d.field.clone()).collect(),
                date: today,
            });
            self.rebuild(today, config, "drift detected")?;
        }
        Ok(report)
    }

    /// compare the stored ledger with a rebuild, changing nothing
    pub fn audit(&self, config: &EngineConfig) -> Result<DriftReport> {
        Reconciler::audit(self.ledger()?, &self.schedule, &self.payments, config)
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take_events()
    }

    fn void_payment(
        &mut self,
        payment_id: PaymentId,
        status: PaymentStatus,
        config: &EngineConfig,
        today: NaiveDate,
    ) -> Result<Payment> {
        let loan_id = self.id();
        self.ledger()?;
        let payment = self
            .payments
            .iter_mut()
            .find(|p| p.id == payment_id)
            .ok_or(LedgerError::PaymentNotFound { loan_id, payment_id })?;

        if !payment.status.is_effective() {
            return Err(LedgerError::InvalidState {
                loan_id,
                current: format!("{:?}", payment.status),
                expected: "an effective payment".to_string(),
            });
        }
        let previous_status = payment.status;
        payment.status = status;
        let voided = payment.clone();

        if let Err(err) = self.rebuild(today, config, &format!("payment {} {:?}", payment_id, status)) {
            if let Some(p) = self.payments.iter_mut().find(|p| p.id == payment_id) {
                p.status = previous_status;
            }
            return Err(err);
        }
        info!(%loan_id, %payment_id, ?status, "payment voided");
        Ok(voided)
    }

    /// add a payment to the history and rebuild; the history is restored on failure
    fn commit_by_rebuild(
        &mut self,
        payment: &Payment,
        today: NaiveDate,
        config: &EngineConfig,
        reason: &str,
    ) -> Result<Vec<u32>> {
        self.payments.push(payment.clone());
        if let Err(err) = self.rebuild(today, config, reason) {
            self.payments.pop();
            return Err(err);
        }
        Ok(self
            .schedule
            .installments
            .iter()
            .filter(|i| i.payment_id == Some(payment.id))
            .map(|i| i.number)
            .collect())
    }

    /// replace ledger and installment state with a replay of the payment history
    fn rebuild(&mut self, today: NaiveDate, config: &EngineConfig, reason: &str) -> Result<()> {
        let loan_id = self.id();
        let previous = self.ledger()?.clone();
        let rebuilt = Reconciler::rebuild_as_of(&self.schedule, &self.payments, today, config)?;

        let mut ledger = rebuilt.ledger;
        ledger.carry_forward_default(&previous);

        info!(%loan_id, replayed = rebuilt.replayed, skipped = rebuilt.skipped, reason, "ledger rebuilt");
        self.events.emit(Event::LedgerRebuilt {
            loan_id,
            reason: reason.to_string(),
            date: today,
        });
        self.emit_status_change(previous.status, ledger.status, today);

        self.schedule = rebuilt.schedule;
        self.ledger = Some(ledger);
        Ok(())
    }

    fn require_pending(&self, action: &str) -> Result<()> {
        if self.disbursement != DisbursementStatus::Pending {
            return Err(LedgerError::InvalidState {
                loan_id: self.id(),
                current: format!("{:?}", self.disbursement),
                expected: format!("Pending to {}", action),
            });
        }
        Ok(())
    }

    fn emit_schedule(&mut self) {
        self.events.emit(Event::ScheduleGenerated {
            loan_id: self.id(),
            method: self.schedule.interest_method,
            installments: self.schedule.summary.installment_count,
            total_payable: self.schedule.summary.total_payable,
            maturity_date: self.schedule.summary.maturity_date,
        });
    }

    fn emit_status_change(&mut self, old_status: LoanStatus, new_status: LoanStatus, today: NaiveDate) {
        if old_status != new_status {
            info!(loan_id = %self.id(), ?old_status, ?new_status, "loan status changed");
            self.events.emit(Event::StatusChanged {
                loan_id: self.id(),
                old_status,
                new_status,
                date: today,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Money, Rate};
    use crate::types::{InstallmentStatus, InterestMethodKind, RepaymentFrequency, TimeUnit};
    use chrono::{TimeZone, Utc};
    use hourglass_rs::TimeSource;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// 1,000,000 at 20% flat, six monthly installments of 205,000
    fn terms() -> LoanTerms {
        LoanTerms::builder()
            .principal(Money::from_major(1_000_000))
            .rate(Rate::from_percentage(20), TimeUnit::Year)
            .method(InterestMethodKind::Flat)
            .frequency(RepaymentFrequency::Monthly)
            .installments(6)
            .processing_fee(Money::from_major(30_000))
            .late_fee(Money::from_major(5_000))
            .grace_period_days(5)
            .disbursement_date(date(2024, 1, 1))
            .build()
            .unwrap()
    }

    fn disbursed() -> LoanAccount {
        let mut account = LoanAccount::originate(terms()).unwrap();
        account.disburse(date(2024, 1, 1)).unwrap();
        account.take_events();
        account
    }

    fn pay(account: &mut LoanAccount, amount: i64, on: NaiveDate) -> Result<Payment> {
        let request = PaymentRequest::new(account.id(), Money::from_major(amount), on);
        account.record_payment(&request, &EngineConfig::default(), on)
    }

    #[test]
    fn test_originate_and_disburse() {
        let mut account = LoanAccount::originate(terms()).unwrap();
        assert_eq!(account.disbursement, DisbursementStatus::Pending);
        assert_eq!(account.schedule.len(), 6);
        assert!(account.ledger().is_err());

        let ledger = account.disburse(date(2024, 1, 1)).unwrap();
        assert_eq!(ledger.status, LoanStatus::Open);
        assert_eq!(ledger.total_due, Money::from_major(1_230_000));

        let events = account.take_events();
        assert!(matches!(events[0], Event::ScheduleGenerated { installments: 6, .. }));
        assert!(matches!(events[1], Event::LoanDisbursed { .. }));
    }

    #[test]
    fn test_first_payment() {
        let mut account = disbursed();
        let payment = pay(&mut account, 205_000, date(2024, 2, 1)).unwrap();

        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.fees_paid, Money::from_major(30_000));
        assert_eq!(payment.interest_paid, Money::from_major(175_000));
        assert_eq!(payment.installment_number, 1);

        let ledger = account.ledger().unwrap();
        assert_eq!(ledger.status, LoanStatus::InProgress);
        assert_eq!(ledger.cumulative_payment, Money::from_major(205_000));
        assert_eq!(ledger.outstanding_balance, Money::from_major(1_025_000));
        assert_eq!(ledger.next_due_date, Some(date(2024, 3, 1)));
        assert_eq!(account.schedule.get(1).unwrap().status, InstallmentStatus::Paid);

        let events = account.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::PaymentAllocated { installments, .. } if installments == &vec![1]
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            Event::StatusChanged {
                old_status: LoanStatus::Open,
                new_status: LoanStatus::InProgress,
                ..
            }
        )));
    }

    #[test]
    fn test_full_repayment_closes_loan() {
        let mut account = disbursed();
        for month in 2..=7 {
            pay(&mut account, 205_000, date(2024, month, 1)).unwrap();
        }

        let ledger = account.ledger().unwrap();
        assert_eq!(ledger.status, LoanStatus::Closed);
        assert_eq!(ledger.outstanding_balance, Money::ZERO);
        assert_eq!(ledger.installments_paid, 6);
        assert_eq!(ledger.installments_remaining, 0);
        assert!(account.schedule.installments.iter().all(|i| i.is_settled()));

        assert_eq!(
            pay(&mut account, 1_000, date(2024, 7, 2)).unwrap_err(),
            LedgerError::AlreadyClosed { loan_id: account.id() }
        );

        // still closed three weeks past maturity
        let status = account.refresh(date(2024, 7, 22), &EngineConfig::default()).unwrap();
        assert_eq!(status, LoanStatus::Closed);
    }

    #[test]
    fn test_pending_lifecycle_rules() {
        let mut account = LoanAccount::originate(terms()).unwrap();
        assert!(matches!(
            pay(&mut account, 100, date(2024, 2, 1)),
            Err(LedgerError::LoanNotActive {
                status: DisbursementStatus::Pending,
                ..
            })
        ));

        let mut amended = terms();
        amended.number_of_installments = 12;
        amended.duration = 12;
        amended.duration_unit = TimeUnit::Month;
        account.amend_terms(amended).unwrap();
        assert_eq!(account.schedule.len(), 12);
        assert_eq!(account.schedule.loan_id, account.id());

        account.disburse(date(2024, 1, 1)).unwrap();
        assert!(matches!(
            account.amend_terms(terms()),
            Err(LedgerError::InvalidState { .. })
        ));
        assert!(account.cancel(date(2024, 1, 2)).is_err());
    }

    #[test]
    fn test_cancelled_loan_cannot_disburse() {
        let mut account = LoanAccount::originate(terms()).unwrap();
        account.cancel(date(2024, 1, 1)).unwrap();
        assert_eq!(account.disbursement, DisbursementStatus::Cancelled);
        assert!(matches!(
            account.disburse(date(2024, 1, 2)),
            Err(LedgerError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_reversal_rebuilds_ledger() {
        let mut account = disbursed();
        let config = EngineConfig::default();
        let first = pay(&mut account, 205_000, date(2024, 2, 1)).unwrap();
        let second = pay(&mut account, 205_000, date(2024, 3, 1)).unwrap();
        account.take_events();

        let reversed = account.reverse_payment(first.id, &config, date(2024, 3, 2)).unwrap();
        assert_eq!(reversed.status, PaymentStatus::Reversed);

        let ledger = account.ledger().unwrap();
        assert_eq!(ledger.cumulative_payment, second.applied_amount());
        assert_eq!(ledger.installments_paid, 1);
        assert_eq!(account.schedule.get(1).unwrap().paid_amount, Money::ZERO);
        assert_eq!(account.schedule.get(2).unwrap().status, InstallmentStatus::Paid);

        let events = account.take_events();
        assert!(events.iter().any(|e| matches!(e, Event::LedgerRebuilt { .. })));
        assert!(events.iter().any(|e| matches!(e, Event::PaymentReversed { .. })));

        assert!(matches!(
            account.reverse_payment(first.id, &config, date(2024, 3, 2)),
            Err(LedgerError::InvalidState { .. })
        ));
        let missing = Uuid::new_v4();
        assert_eq!(
            account.cancel_payment(missing, &config, date(2024, 3, 2)).unwrap_err(),
            LedgerError::PaymentNotFound {
                loan_id: account.id(),
                payment_id: missing
            }
        );
    }

    #[test]
    fn test_cancel_payment_reopens_closed_loan() {
        let mut account = disbursed();
        let config = EngineConfig::default();
        let payment = pay(&mut account, 1_230_000, date(2024, 2, 1)).unwrap();
        assert_eq!(account.status(), Some(LoanStatus::Closed));

        account.cancel_payment(payment.id, &config, date(2024, 2, 2)).unwrap();
        assert_eq!(account.status(), Some(LoanStatus::Open));
        assert_eq!(account.ledger().unwrap().outstanding_balance, Money::from_major(1_230_000));
    }

    #[test]
    fn test_refresh_tracks_lateness_and_default_flag() {
        let mut account = disbursed();
        let config = EngineConfig::default();
        pay(&mut account, 205_000, date(2024, 2, 1)).unwrap();
        account.take_events();

        // installment 2 due 2024-03-01, grace until 2024-03-06
        account.refresh(date(2024, 3, 10), &config).unwrap();
        let ledger = account.ledger().unwrap();
        assert!(ledger.is_late);
        assert_eq!(ledger.days_late, 4);
        assert_eq!(ledger.missed_payments, 1);
        assert_eq!(account.schedule.get(2).unwrap().status, InstallmentStatus::Overdue);
        assert!(account
            .take_events()
            .iter()
            .any(|e| matches!(e, Event::InstallmentOverdue { installment_number: 2, .. })));

        // 96 days past grace, still before maturity
        account.refresh(date(2024, 6, 10), &config).unwrap();
        let ledger = account.ledger().unwrap();
        assert!(ledger.is_defaulted);
        assert_eq!(ledger.default_date, Some(date(2024, 6, 10)));
        assert_eq!(ledger.status, LoanStatus::InProgress);
        assert!(account
            .take_events()
            .iter()
            .any(|e| matches!(e, Event::DefaultFlagRaised { days_late: 96, .. })));

        // maturity 2024-07-01, defaulted six months later
        account.refresh(date(2025, 1, 2), &config).unwrap();
        assert_eq!(account.status(), Some(LoanStatus::Defaulted));
        assert_eq!(account.ledger().unwrap().default_date, Some(date(2024, 6, 10)));
        assert!(matches!(
            pay(&mut account, 1_000, date(2025, 1, 2)),
            Err(LedgerError::AlreadyDefaulted { .. })
        ));
    }

    #[test]
    fn test_late_payment_carries_penalty() {
        let mut account = disbursed();
        let payment = pay(&mut account, 205_000, date(2024, 2, 10)).unwrap();

        assert!(payment.is_late);
        assert_eq!(payment.penalty_assessed, Money::from_major(5_000));
        assert_eq!(payment.penalty_paid, Money::from_major(5_000));
        assert_eq!(payment.applied_amount(), Money::from_major(205_000));

        let ledger = account.ledger().unwrap();
        assert_eq!(ledger.cumulative_penalty, Money::from_major(5_000));
        assert_eq!(ledger.late_payments, 1);
        // 1,230,000 + 5,000 - 205,000
        assert_eq!(ledger.outstanding_balance, Money::from_major(1_030_000));
    }

    #[test]
    fn test_inconsistent_ledger_is_rebuilt() {
        let mut account = disbursed();
        pay(&mut account, 205_000, date(2024, 2, 1)).unwrap();
        account.take_events();

        // corrupt the stored ledger
        if let Some(ledger) = account.ledger.as_mut() {
            ledger.cumulative_payment += Money::from_major(1);
        }

        pay(&mut account, 205_000, date(2024, 3, 1)).unwrap();
        let ledger = account.ledger().unwrap();
        assert!(ledger.check_invariants().is_ok());
        assert_eq!(ledger.cumulative_payment, Money::from_major(410_000));
        assert!(account
            .take_events()
            .iter()
            .any(|e| matches!(e, Event::LedgerRebuilt { .. })));
    }

    #[test]
    fn test_inconsistency_surfaces_when_rebuild_disabled() {
        let mut account = disbursed();
        let config = EngineConfig {
            rebuild_on_inconsistency: false,
            ..EngineConfig::default()
        };
        if let Some(ledger) = account.ledger.as_mut() {
            ledger.cumulative_payment += Money::from_major(1);
        }

        let request = PaymentRequest::new(account.id(), Money::from_major(205_000), date(2024, 2, 1));
        let err = account.record_payment(&request, &config, date(2024, 2, 1)).unwrap_err();
        assert!(err.needs_rebuild());
        assert!(account.payments.is_empty());
    }

    #[test]
    fn test_reconcile_repairs_drift() {
        let mut account = disbursed();
        let config = EngineConfig::default();
        pay(&mut account, 205_000, date(2024, 2, 1)).unwrap();
        assert!(account.audit(&config).unwrap().is_clean());

        if let Some(ledger) = account.ledger.as_mut() {
            ledger.late_payments = 3;
        }
        let report = account.reconcile(date(2024, 2, 1), &config).unwrap();
        assert!(!report.is_clean());
        assert_eq!(account.ledger().unwrap().late_payments, 0);
        assert!(account.audit(&config).unwrap().is_clean());
        assert!(account
            .take_events()
            .iter()
            .any(|e| matches!(e, Event::DriftDetected { .. })));
    }

    #[test]
    fn test_backdated_payment_matches_rebuild() {
        let mut account = disbursed();
        let config = EngineConfig::default();
        let today = date(2024, 3, 1);

        let later = PaymentRequest::new(account.id(), Money::from_major(100_000), date(2024, 3, 1));
        account.record_payment(&later, &config, today).unwrap();
        account.take_events();
        let earlier = PaymentRequest::new(account.id(), Money::from_major(100_000), date(2024, 2, 1));
        let backdated = account.record_payment(&earlier, &config, today).unwrap();
        assert_eq!(backdated.sequence, 1);

        let rebuilt = Reconciler::rebuild_as_of(&account.schedule, &account.payments, today, &config).unwrap();
        let ledger = account.ledger().unwrap();
        assert_eq!(ledger, &rebuilt.ledger);
        assert_eq!(account.schedule.installments, rebuilt.schedule.installments);
        assert_eq!(ledger.last_payment_date, Some(date(2024, 3, 1)));
        assert_eq!(ledger.last_payment_amount, Some(Money::from_major(100_000)));
        // the 2024-03-01 payment is replayed last
        assert_eq!(account.schedule.get(1).unwrap().paid_date, Some(date(2024, 3, 1)));
        assert!(account.audit(&config).unwrap().is_clean());
        assert!(account.take_events().iter().any(|e| matches!(
            e,
            Event::LedgerRebuilt { reason, .. } if reason == "backdated payment"
        )));
    }

    #[test]
    fn test_rejected_payment_does_not_consume_sequence() {
        let mut account = disbursed();
        let strict = EngineConfig {
            rebuild_on_inconsistency: false,
            ..EngineConfig::default()
        };
        if let Some(ledger) = account.ledger.as_mut() {
            ledger.cumulative_payment += Money::from_major(1);
        }

        let request = PaymentRequest::new(account.id(), Money::from_major(205_000), date(2024, 2, 1));
        assert!(account.record_payment(&request, &strict, date(2024, 2, 1)).is_err());

        account.reconcile(date(2024, 2, 1), &strict).unwrap();
        let payment = account.record_payment(&request, &strict, date(2024, 2, 1)).unwrap();
        assert_eq!(payment.sequence, 0);
        let second = account.record_payment(&request, &strict, date(2024, 2, 1)).unwrap();
        assert_eq!(second.sequence, 1);
    }

    #[test]
    fn test_record_payment_with_time_provider() {
        let mut account = disbursed();
        let time = SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 2, 1, 9, 30, 0).unwrap(),
        ));
        let request = PaymentRequest::new(account.id(), Money::from_major(205_000), date(2024, 2, 1));
        account
            .record_payment_at(&request, &EngineConfig::default(), &time)
            .unwrap();

        // a payment dated two days ahead of the clock is rejected
        time.test_control().unwrap().advance(chrono::Duration::hours(1));
        let ahead = PaymentRequest::new(account.id(), Money::from_major(1_000), date(2024, 2, 3));
        assert!(matches!(
            account.record_payment_at(&ahead, &EngineConfig::default(), &time),
            Err(LedgerError::InvalidPayment { .. })
        ));
    }
}
