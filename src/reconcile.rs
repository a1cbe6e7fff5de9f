use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{EngineConfig, LoanTerms};
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::ledger::{LedgerAggregate, LedgerEvent};
use crate::payments::installments;
use crate::payments::Payment;
use crate::schedule::{Schedule, ScheduleGenerator};
use crate::types::LoanId;

/// output of a full rebuild
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub ledger: LedgerAggregate,
    /// installment state after replaying the same history
    pub schedule: Schedule,
    pub replayed: usize,
    pub skipped: usize,
}

/// one field where a stored ledger disagrees with its rebuild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDrift {
    pub field: String,
    pub stored: String,
    pub rebuilt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub loan_id: LoanId,
    pub drifts: Vec<FieldDrift>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty()
    }

    fn compare<T: PartialEq + std::fmt::Debug>(&mut self, field: &str, stored: &T, rebuilt: &T) {
        if stored != rebuilt {
            self.drifts.push(FieldDrift {
                field: field.to_string(),
                stored: format!("{:?}", stored),
                rebuilt: format!("{:?}", rebuilt),
            });
        }
    }
}

/// rebuilds ledgers from raw payment history
pub struct Reconciler;

impl Reconciler {
    /// effective payments in replay order: payment date, then insertion sequence
    pub fn replay_order(history: &[Payment]) -> Vec<&Payment> {
        let mut ordered: Vec<&Payment> = history.iter().filter(|p| p.is_effective()).collect();
        ordered.sort_by_key(|p| (p.payment_date, p.sequence));
        ordered
    }

    /// schedule from the terms, then a rebuild over it
    pub fn reconcile(terms: &LoanTerms, history: &[Payment]) -> Result<LedgerAggregate> {
        let schedule = ScheduleGenerator::generate(terms)?;
        Ok(Self::rebuild(&schedule, history)?.ledger)
    }

    /// replay the whole history from zero
    pub fn rebuild(schedule: &Schedule, history: &[Payment]) -> Result<Reconciliation> {
        let loan_id = schedule.loan_id;
        if let Some(foreign) = history.iter().find(|p| p.loan_id != loan_id) {
            return Err(LedgerError::InvalidPayment {
                loan_id,
                payment: Some(foreign.id),
                message: format!("payment belongs to loan {}", foreign.loan_id),
            });
        }

        let ordered = Self::replay_order(history);
        let mut replayed_schedule = schedule.pristine();
        let mut ledger = LedgerAggregate::initialize(&replayed_schedule);

        for payment in &ordered {
            ledger.cumulative_principal += payment.principal_paid;
            ledger.cumulative_interest += payment.interest_paid;
            ledger.cumulative_fees += payment.fees_paid;
            ledger.cumulative_penalty += payment.penalty_assessed;
            ledger.cumulative_penalty_paid += payment.penalty_paid;
            ledger.cumulative_payment += payment.applied_amount();
            ledger.cumulative_overpayment += payment.overpayment_amount;

            ledger.installments_paid += 1;
            ledger.last_payment_date = Some(payment.payment_date);
            ledger.last_payment_amount = Some(payment.amount);

            if payment.is_late {
                ledger.late_payments += 1;
            } else {
                ledger.on_time_payments += 1;
            }
            if payment.is_early {
                ledger.early_payments += 1;
            }
            ledger.has_partial_payment |= payment.is_partial;
            ledger.has_overpayment |= payment.is_overpayment;

            installments::apply_payment(&mut replayed_schedule, payment);
        }

        ledger.recompute_derived();
        ledger.check_invariants()?;

        let replayed = ordered.len();
        let skipped = history.len() - replayed;
        debug!(%loan_id, replayed, skipped, "rebuilt ledger from history");

        Ok(Reconciliation {
            ledger,
            schedule: replayed_schedule,
            replayed,
            skipped,
        })
    }

    /// rebuild, then evaluate lateness and status as of a date
    pub fn rebuild_as_of(
        schedule: &Schedule,
        history: &[Payment],
        as_of: NaiveDate,
        config: &EngineConfig,
    ) -> Result<Reconciliation> {
        let mut rebuilt = Self::rebuild(schedule, history)?;
        installments::refresh_statuses(&mut rebuilt.schedule, as_of);
        rebuilt.ledger = rebuilt.ledger.apply(&LedgerEvent::Assess { as_of }, config)?;
        Ok(rebuilt)
    }

    /// compare a stored ledger against a rebuild of its history
    pub fn audit(
        stored: &LedgerAggregate,
        schedule: &Schedule,
        history: &[Payment],
        config: &EngineConfig,
    ) -> Result<DriftReport> {
        let replay = match stored.as_of {
            Some(as_of) => Self::rebuild_as_of(schedule, history, as_of, config)?,
            None => Self::rebuild(schedule, history)?,
        };
        let mut rebuilt = replay.ledger;
        rebuilt.carry_forward_default(stored);

        let mut report = DriftReport {
            loan_id: stored.loan_id,
            drifts: Vec::new(),
        };

        let money_fields: [(&str, Money, Money); 14] = [
            ("total_due", stored.total_due, rebuilt.total_due),
            ("cumulative_payment", stored.cumulative_payment, rebuilt.cumulative_payment),
            ("cumulative_principal", stored.cumulative_principal, rebuilt.cumulative_principal),
            ("cumulative_interest", stored.cumulative_interest, rebuilt.cumulative_interest),
            ("cumulative_fees", stored.cumulative_fees, rebuilt.cumulative_fees),
            ("cumulative_penalty", stored.cumulative_penalty, rebuilt.cumulative_penalty),
            ("cumulative_penalty_paid", stored.cumulative_penalty_paid, rebuilt.cumulative_penalty_paid),
            ("cumulative_overpayment", stored.cumulative_overpayment, rebuilt.cumulative_overpayment),
            ("outstanding_balance", stored.outstanding_balance, rebuilt.outstanding_balance),
            ("outstanding_principal", stored.outstanding_principal, rebuilt.outstanding_principal),
            ("outstanding_interest", stored.outstanding_interest, rebuilt.outstanding_interest),
            ("outstanding_fees", stored.outstanding_fees, rebuilt.outstanding_fees),
            ("outstanding_penalty", stored.outstanding_penalty, rebuilt.outstanding_penalty),
            ("next_due_amount", stored.next_due_amount, rebuilt.next_due_amount),
        ];
        for (field, mine, theirs) in &money_fields {
            report.compare(field, mine, theirs);
        }

        let count_fields: [(&str, u32, u32); 6] = [
            ("installments_paid", stored.installments_paid, rebuilt.installments_paid),
            ("installments_remaining", stored.installments_remaining, rebuilt.installments_remaining),
            ("late_payments", stored.late_payments, rebuilt.late_payments),
            ("on_time_payments", stored.on_time_payments, rebuilt.on_time_payments),
            ("early_payments", stored.early_payments, rebuilt.early_payments),
            ("missed_payments", stored.missed_payments, rebuilt.missed_payments),
        ];
        for (field, mine, theirs) in &count_fields {
            report.compare(field, mine, theirs);
        }

        report.compare("next_due_date", &stored.next_due_date, &rebuilt.next_due_date);
        report.compare("last_payment_date", &stored.last_payment_date, &rebuilt.last_payment_date);
        report.compare(
            "last_payment_amount",
            &stored.last_payment_amount,
            &rebuilt.last_payment_amount,
        );
        report.compare(
            "has_partial_payment",
            &stored.has_partial_payment,
            &rebuilt.has_partial_payment,
        );
        report.compare("has_overpayment", &stored.has_overpayment, &rebuilt.has_overpayment);
        report.compare("days_late", &stored.days_late, &rebuilt.days_late);
        report.compare("is_defaulted", &stored.is_defaulted, &rebuilt.is_defaulted);
        report.compare("default_date", &stored.default_date, &rebuilt.default_date);
        report.compare("status", &stored.status, &rebuilt.status);
        report.compare(
            "payment_behavior_score",
            &stored.payment_behavior_score,
            &rebuilt.payment_behavior_score,
        );
        report.compare("default_risk_score", &stored.default_risk_score, &rebuilt.default_risk_score);
        report.compare(
            "completion_percentage",
            &stored.completion_percentage,
            &rebuilt.completion_percentage,
        );

        report.compare(
            "installment_count",
            &schedule.installments.len(),
            &replay.schedule.installments.len(),
        );
        for (mine, theirs) in schedule.installments.iter().zip(&replay.schedule.installments) {
            report.compare(&format!("installment[{}]", mine.number), mine, theirs);
        }

        if !report.is_clean() {
            warn!(
                loan_id = %stored.loan_id,
                fields = report.drifts.len(),
                "stored ledger drifted from its payment history"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Rate;
    use crate::payments::{AllocationContext, PaymentAllocator, PaymentRequest};
    use crate::types::{InterestMethodKind, LoanStatus, PaymentStatus, RepaymentFrequency, TimeUnit};
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn terms() -> LoanTerms {
        LoanTerms::builder()
            .principal(Money::from_major(12_000))
            .rate(Rate::from_percentage(24), TimeUnit::Year)
            .method(InterestMethodKind::Reducing)
            .duration(6, TimeUnit::Month)
            .frequency(RepaymentFrequency::Monthly)
            .installments(6)
            .processing_fee(Money::from_major(300))
            .late_fee(Money::from_major(50))
            .grace_period_days(3)
            .disbursement_date(date(2024, 1, 1))
            .build()
            .unwrap()
    }

    /// allocates and folds each payment the way an account would
    fn incremental(
        terms: &LoanTerms,
        payments: &[(i64, NaiveDate)],
        config: &EngineConfig,
    ) -> (LedgerAggregate, Schedule, Vec<Payment>) {
        let mut schedule = ScheduleGenerator::generate(terms).unwrap();
        let mut ledger = LedgerAggregate::initialize(&schedule);
        let mut history = Vec::new();

        for (sequence, (amount, on)) in payments.iter().enumerate() {
            let totals = ledger.totals();
            let ctx = AllocationContext {
                terms,
                schedule: &schedule,
                totals: &totals,
                status: ledger.status,
                today: *on,
            };
            let request = PaymentRequest::new(terms.loan_id, Money::from_major(*amount), *on);
            let payment = PaymentAllocator::new(config)
                .allocate(&ctx, &request)
                .unwrap()
                .into_payment(Uuid::new_v4(), sequence as u64, String::new());

            ledger = ledger
                .apply(&LedgerEvent::Payment((&payment).into()), config)
                .unwrap()
                .apply(&LedgerEvent::Assess { as_of: *on }, config)
                .unwrap();
            installments::apply_payment(&mut schedule, &payment);
            installments::refresh_statuses(&mut schedule, *on);
            history.push(payment);
        }
        (ledger, schedule, history)
    }

    fn payments() -> Vec<(i64, NaiveDate)> {
        vec![
            (2_500, date(2024, 2, 1)),
            (2_200, date(2024, 3, 10)),
            (3_000, date(2024, 4, 1)),
            (2_200, date(2024, 5, 2)),
        ]
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let config = EngineConfig::default();
        let terms = terms();
        let (_, schedule, history) = incremental(&terms, &payments(), &config);

        let first = Reconciler::rebuild(&schedule, &history).unwrap();
        let second = Reconciler::rebuild(&schedule, &history).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.replayed, 4);
        assert_eq!(first.skipped, 0);
    }

    #[test]
    fn test_incremental_converges_with_rebuild() {
        let config = EngineConfig::default();
        let terms = terms();
        let (ledger, mut schedule, history) = incremental(&terms, &payments(), &config);

        let as_of = date(2024, 5, 2);
        installments::refresh_statuses(&mut schedule, as_of);
        let incremental = ledger.apply(&LedgerEvent::Assess { as_of }, &config).unwrap();
        let rebuilt = Reconciler::rebuild_as_of(&schedule, &history, as_of, &config).unwrap();

        assert_eq!(rebuilt.ledger, incremental);
        assert_eq!(rebuilt.schedule.installments, schedule.installments);
        // the late payment on 2024-03-10 carried a late fee
        assert_eq!(incremental.cumulative_penalty, Money::from_major(50));
        assert_eq!(incremental.late_payments, 1);
    }

    #[test]
    fn test_reconcile_from_terms() {
        let config = EngineConfig::default();
        let terms = terms();
        let (ledger, _, history) = incremental(&terms, &payments(), &config);

        let rebuilt = Reconciler::reconcile(&terms, &history).unwrap();
        assert_eq!(rebuilt.cumulative_payment, ledger.cumulative_payment);
        assert_eq!(rebuilt.outstanding_balance, ledger.outstanding_balance);
    }

    #[test]
    fn test_skips_cancelled_reversed_and_non_positive() {
        let config = EngineConfig::default();
        let terms = terms();
        let (_, schedule, mut history) = incremental(&terms, &payments(), &config);
        let full = Reconciler::rebuild(&schedule, &history).unwrap();

        history[1].status = PaymentStatus::Cancelled;
        history[2].status = PaymentStatus::Reversed;
        let mut zero = history[0].clone();
        zero.id = Uuid::new_v4();
        zero.amount = Money::ZERO;
        history.push(zero);

        let partial = Reconciler::rebuild(&schedule, &history).unwrap();
        assert_eq!(partial.replayed, 2);
        assert_eq!(partial.skipped, 3);
        assert!(partial.ledger.cumulative_payment < full.ledger.cumulative_payment);
        assert_eq!(partial.ledger.installments_paid, 2);
    }

    #[test]
    fn test_replay_order_breaks_ties_by_sequence() {
        let config = EngineConfig::default();
        let terms = terms();
        let (_, _, mut history) = incremental(&terms, &payments(), &config);
        history[1].payment_date = history[0].payment_date;
        history.swap(0, 1);

        let order: Vec<u64> = Reconciler::replay_order(&history).iter().map(|p| p.sequence).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_rejects_foreign_payments() {
        let config = EngineConfig::default();
        let terms = terms();
        let (_, schedule, mut history) = incremental(&terms, &payments(), &config);
        history[0].loan_id = Uuid::new_v4();

        assert!(matches!(
            Reconciler::rebuild(&schedule, &history),
            Err(LedgerError::InvalidPayment { payment: Some(_), .. })
        ));
    }

    #[test]
    fn test_audit_reports_drift() {
        let config = EngineConfig::default();
        let terms = terms();
        let (ledger, schedule, history) = incremental(&terms, &payments(), &config);

        let clean = Reconciler::audit(&ledger, &schedule, &history, &config).unwrap();
        assert!(clean.is_clean(), "{:?}", clean.drifts);

        let mut tampered = ledger.clone();
        tampered.cumulative_interest += Money::from_major(10);
        tampered.late_payments = 0;
        let report = Reconciler::audit(&tampered, &schedule, &history, &config).unwrap();

        let fields: Vec<&str> = report.drifts.iter().map(|d| d.field.as_str()).collect();
        assert!(fields.contains(&"cumulative_interest"));
        assert!(fields.contains(&"late_payments"));
        assert!(!fields.contains(&"cumulative_principal"));
    }

    #[test]
    fn test_audit_sees_payment_recency_and_installment_state() {
        let config = EngineConfig::default();
        let terms = terms();
        let (ledger, mut schedule, history) = incremental(&terms, &payments(), &config);

        let mut tampered = ledger.clone();
        tampered.last_payment_date = Some(date(2024, 2, 1));
        tampered.last_payment_amount = Some(Money::from_major(2_500));
        tampered.has_partial_payment = !ledger.has_partial_payment;
        if let Some(installment) = schedule.installments.first_mut() {
            installment.paid_date = Some(date(2024, 1, 15));
            installment.is_late = true;
        }

        let report = Reconciler::audit(&tampered, &schedule, &history, &config).unwrap();
        let fields: Vec<&str> = report.drifts.iter().map(|d| d.field.as_str()).collect();
        assert!(fields.contains(&"last_payment_date"));
        assert!(fields.contains(&"last_payment_amount"));
        assert!(fields.contains(&"has_partial_payment"));
        assert!(fields.contains(&"installment[1]"));
        assert!(!fields.contains(&"installment[2]"));
    }

    #[test]
    fn test_out_of_order_history_rebuilds_in_date_order() {
        let config = EngineConfig::default();
        let terms = terms();
        let (_, schedule, mut history) = incremental(&terms, &payments(), &config);

        // the 2024-02-01 payment arrives last
        let first = history.remove(0);
        history.push(first);
        let rebuilt = Reconciler::rebuild(&schedule, &history).unwrap();
        assert_eq!(rebuilt.ledger.last_payment_date, Some(date(2024, 5, 2)));
        assert_eq!(rebuilt.ledger.last_payment_amount, Some(Money::from_major(2_200)));
    }

    #[test]
    fn test_empty_history_rebuilds_opening_ledger() {
        let terms = terms();
        let schedule = ScheduleGenerator::generate(&terms).unwrap();
        let rebuilt = Reconciler::rebuild(&schedule, &[]).unwrap();

        assert_eq!(rebuilt.ledger, LedgerAggregate::initialize(&schedule));
        assert_eq!(rebuilt.ledger.status, LoanStatus::Open);
    }
}
