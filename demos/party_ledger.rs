//! Party ledger walkthrough: bills, payments, returns and aging

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use gst_ledger_core::utils::MemoryStorage;
use gst_ledger_core::{
    Document, DocumentBuilder, DocumentType, EngineConfig, EngineError, EntryType, GstCategory,
    LedgerEngine, LineInput, Party, PartyKind, ReturnRequest,
};
use tracing_subscriber::EnvFilter;

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("🧾 GST Ledger Core - Party Ledger Example\n");

    // GST_LEDGER_* variables override the defaults; the home state falls back to 27
    let mut config = EngineConfig::from_env()?;
    config.home_state_code.get_or_insert_with(|| "27".to_string());

    let storage = MemoryStorage::new();
    let mut engine = LedgerEngine::new(storage, config)?;

    // 1. Register a vendor carrying an opening balance
    println!("📊 Registering vendor...");
    let ledger = engine
        .register_party(
            Party::new(
                "acme".to_string(),
                "Acme Supplies".to_string(),
                PartyKind::Vendor,
                "27".to_string(),
                date(4, 1),
            )
            .with_opening_balance(BigDecimal::from(2500), EntryType::Credit)
            .with_payment_terms(30),
        )
        .await?;
    println!("  ✓ Opening balance: ₹{}", ledger.balance());
    println!();

    // 2. Bills
    println!("💰 Posting bills...");
    let ctx = engine.tax_context("acme").await?;
    let bill = DocumentBuilder::new(
        "BILL-001".to_string(),
        DocumentType::Bill,
        "acme".to_string(),
        date(4, 10),
    )
    .reference("ACME/INV/778".to_string())
    .line(
        LineInput::new(
            "ITEM-A",
            "Widget",
            BigDecimal::from(10),
            BigDecimal::from(100),
            GstCategory::Higher.tax_rate(),
        )
        .with_discount(BigDecimal::from(10)),
    )
    .line(LineInput::new(
        "ITEM-B",
        "Gasket",
        BigDecimal::from(20),
        BigDecimal::from(25),
        GstCategory::Standard.tax_rate(),
    ))
    .build(&ctx)?;
    engine.save_draft(&bill).await?;
    let entry = engine.finalize_and_post("BILL-001").await?;
    println!(
        "  ✓ BILL-001 posted: ₹{} (balance ₹{})",
        entry.amount, entry.running_balance
    );

    let second = DocumentBuilder::new(
        "BILL-002".to_string(),
        DocumentType::Bill,
        "acme".to_string(),
        date(5, 2),
    )
    .line(LineInput::new(
        "ITEM-C",
        "Spring",
        BigDecimal::from(50),
        BigDecimal::from(12),
        GstCategory::Reduced.tax_rate(),
    ))
    .build_posted(&ctx)?;
    let entry = engine.post_document(&second).await?;
    println!(
        "  ✓ BILL-002 posted: ₹{} (balance ₹{})",
        entry.amount, entry.running_balance
    );
    println!();

    // 3. Payment, applied oldest bill first
    println!("💳 Recording payment...");
    let mut payment = Document::payment(
        "PAY-001".to_string(),
        "acme".to_string(),
        date(5, 5),
        BigDecimal::from(1000),
    );
    payment.finalize(&engine.config().rounding)?;
    let entry = engine.post_document(&payment).await?;
    for allocation in &entry.allocations {
        println!(
            "  ✓ Applied ₹{} to {}",
            allocation.amount, allocation.document_id
        );
    }
    println!("  Balance: ₹{}", entry.running_balance);
    println!();

    // 4. Purchase return at the bill's own terms
    println!("↩️  Returning goods...");
    let request = ReturnRequest::new("PR-001", date(5, 8))
        .item("ITEM-A", BigDecimal::from(4))
        .reference("damaged in transit");
    let purchase_return = engine.create_return("BILL-001", &request).await?;
    println!(
        "  ✓ PR-001 for ₹{}",
        purchase_return.ledger_amount().unwrap_or_default()
    );

    let too_many = ReturnRequest::new("PR-002", date(5, 9)).item("ITEM-A", BigDecimal::from(7));
    match engine.create_return("BILL-001", &too_many).await {
        Err(EngineError::OverReturn { max_returnable, .. }) => {
            println!("  ✗ PR-002 refused: only {} left to return", max_returnable)
        }
        Err(e) => return Err(e.into()),
        Ok(_) => println!("  Unexpectedly accepted PR-002"),
    }
    println!();

    // 5. Statement and aging
    println!("📈 Statement for May:");
    let period = engine
        .period_summary("acme", date(5, 1), date(5, 31))
        .await?;
    println!("  Opening:  ₹{}", period.opening_balance);
    println!("  Billed:   ₹{}", period.total_billed);
    println!("  Paid:     ₹{}", period.total_paid);
    println!("  Returned: ₹{}", period.total_returned);
    println!("  Closing:  ₹{}", period.closing_balance);
    println!();

    println!("⏰ Aging as of 2024-06-15:");
    let exposure = engine.overdue_exposure("acme", date(6, 15)).await?;
    for bucket in &exposure.buckets {
        println!(
            "  {:>6} days: ₹{} ({} documents)",
            bucket.label, bucket.amount, bucket.documents
        );
    }
    println!("  Total overdue: ₹{}", exposure.total);
    println!();

    engine.verify_party("acme").await?;
    println!("✅ Ledger replays to its running balances");
    Ok(())
}
