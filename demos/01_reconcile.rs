/// reconcile - late payments, a reversal and a ledger audit with controlled time
use chrono::{Duration, TimeZone, Utc};
use loan_ledger_rs::{
    InterestMethodKind, LoanBook, LoanTerms, Money, PaymentRequest, PenaltyPolicy, Rate,
    SafeTimeProvider, TimeSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== reconcile example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();
    let today = || time.now().date_naive();

    // weekly group loan, 2% a month on the reducing balance
    let mut terms = LoanTerms::weekly_group(
        Money::from_major(50_000),
        Rate::from_percentage(2),
        12,
        today(),
    );
    terms.grace_period_days = 2;
    terms.penalty_policy = PenaltyPolicy::DailyRate {
        rate: Rate::from_percentage_decimal(rust_decimal_macros::dec!(0.1)),
    };
    terms.interest_method = InterestMethodKind::Reducing;

    let book = LoanBook::default();
    let loan_id = book.open(terms)?;
    book.disburse(loan_id, today())?;
    let weekly = book.with_loan(loan_id, |loan| Ok(loan.schedule.installments[0].scheduled_amount))?;
    println!("weekly installment: {}", weekly);

    // two on time, one five days late
    let mut payments = Vec::new();
    for delay in [0, 0, 5] {
        controller.advance(Duration::days(7 + delay));
        let request = PaymentRequest::new(loan_id, weekly, today());
        let payment = book.record_payment_at(&request, &time)?;
        println!(
            "{}: paid {} (late: {}, penalty {})",
            payment.payment_date, payment.amount, payment.is_late, payment.penalty_paid
        );
        payments.push(payment);
    }

    // the second payment bounced
    book.reverse_payment(loan_id, payments[1].id, today())?;

    let ledger = book.ledger(loan_id)?;
    println!("\noutstanding: {}", ledger.outstanding_balance);
    println!("behaviour score: {}", ledger.payment_behavior_score);
    println!("default risk: {}", ledger.default_risk_score);

    // a month later nothing more has arrived
    controller.advance(Duration::days(30));
    for (id, status) in book.refresh_all(today()) {
        println!("{} -> {:?}", id, status?);
    }
    for (id, report) in book.recalculate_all(today()) {
        println!("{} drift-free: {}", id, report?.is_clean());
    }

    for event in book.drain_events() {
        println!("{:?}", event);
    }
    Ok(())
}
