/// quick start - schedule a loan, disburse it and take a payment
use loan_ledger_rs::chrono::NaiveDate;
use loan_ledger_rs::{
    EngineConfig, InterestMethodKind, LoanAccount, LoanTerms, Money, PaymentRequest, Rate,
    RepaymentFrequency, TimeUnit,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("bad date")?;

    // 1,000,000 at 20% flat, six monthly installments
    let terms = LoanTerms::builder()
        .principal(Money::from_major(1_000_000))
        .rate(Rate::from_percentage(20), TimeUnit::Year)
        .method(InterestMethodKind::Flat)
        .frequency(RepaymentFrequency::Monthly)
        .installments(6)
        .processing_fee(Money::from_major(30_000))
        .late_fee(Money::from_major(5_000))
        .grace_period_days(5)
        .disbursement_date(start)
        .build()?;

    let mut loan = LoanAccount::originate(terms)?;
    for installment in &loan.schedule.installments {
        println!(
            "#{} due {}: {} (principal {}, interest {}, fee {})",
            installment.number,
            installment.due_date,
            installment.scheduled_amount,
            installment.principal,
            installment.interest,
            installment.fee
        );
    }

    loan.disburse(start)?;

    // first installment, paid on its due date
    let config = EngineConfig::default();
    let due = loan.schedule.installments[0].due_date;
    let request = PaymentRequest::new(loan.id(), Money::from_major(205_000), due);
    let payment = loan.record_payment(&request, &config, due)?;
    println!(
        "\npaid {}: fees {}, interest {}, principal {}",
        payment.amount, payment.fees_paid, payment.interest_paid, payment.principal_paid
    );

    println!("\n{}", serde_json::to_string_pretty(loan.ledger()?)?);
    Ok(())
}
