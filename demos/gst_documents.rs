//! GST document examples

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use gst_ledger_core::{
    DocumentBuilder, DocumentType, EngineConfig, GstCategory, LineInput, RoundingPolicy,
    RoundingRule, TaxContext, TaxRate,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("🧾 GST Ledger Core - GST Document Examples\n");

    // 1. Standard slabs
    println!("📊 Standard GST Rates by Category:");
    let categories = [
        (GstCategory::Essential, "Essential items (medicines, food)"),
        (GstCategory::Reduced, "Reduced rate items"),
        (GstCategory::Standard, "Standard rate items"),
        (GstCategory::Higher, "Higher rate items (most services)"),
        (GstCategory::Luxury, "Luxury/Sin goods"),
    ];
    for (category, description) in categories.iter() {
        println!("  {:?}: {}% - {}", category, category.rate(), description);
    }
    println!();

    let config = EngineConfig::for_home_state("27");
    let widget = LineInput::new(
        "ITEM-A",
        "Widget",
        BigDecimal::from(10),
        BigDecimal::from(100),
        GstCategory::Higher.tax_rate(),
    )
    .with_discount(BigDecimal::from(10));

    // 2. Same line, two jurisdictions
    for (title, seller, buyer) in [
        ("🏢 Intrastate line (CGST + SGST):", "27", "27"),
        ("🌍 Interstate line (IGST only):", "29", "27"),
    ] {
        println!("{}", title);
        let line = TaxContext::new(seller, buyer, &config).compute_line(&widget)?;
        println!("  Line Amount: ₹{}", line.line_amount);
        println!("  Discount:    ₹{}", line.discount_amount);
        println!("  Taxable:     ₹{}", line.taxable_amount);
        println!("  CGST:        ₹{}", line.cgst_amount);
        println!("  SGST:        ₹{}", line.sgst_amount);
        println!("  IGST:        ₹{}", line.igst_amount);
        println!("  Line Total:  ₹{}", line.line_total);
        println!();
    }

    // 3. Multi-rate bill with cess
    println!("🧾 Multi-item Bill with Different GST Rates:");
    let ctx = TaxContext::new("27", "27", &config);
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let bill = DocumentBuilder::new(
        "BILL/2024-25/001".to_string(),
        DocumentType::Bill,
        "v1".to_string(),
        date,
    )
    .line(LineInput::new(
        "RICE",
        "Rice (25kg)",
        BigDecimal::from(4),
        BigDecimal::from(1250),
        GstCategory::Essential.tax_rate(),
    ))
    .line(LineInput::new(
        "SOAP",
        "Soap carton",
        BigDecimal::from(3),
        BigDecimal::from(333),
        GstCategory::Reduced.tax_rate(),
    ))
    .line(
        LineInput::new(
            "AERATED",
            "Aerated drinks crate",
            BigDecimal::from(2),
            BigDecimal::from(480),
            TaxRate::new("GST 28% + cess 12%", BigDecimal::from(28))
                .with_cess(BigDecimal::from(12)),
        )
        .with_discount(BigDecimal::from(5)),
    )
    .build_posted(&ctx)?;

    for line in &bill.lines {
        println!(
            "  {:<22} qty {:>3} taxable ₹{:>9} tax ₹{:>8} total ₹{:>9}",
            line.description,
            line.quantity,
            line.taxable_amount,
            line.tax_amount(),
            line.line_total
        );
    }

    if let Some(totals) = &bill.totals {
        println!("  Subtotal:    ₹{}", totals.subtotal);
        println!("  Discount:    ₹{}", totals.total_discount);
        println!("  CGST Total:  ₹{}", totals.cgst_total);
        println!("  SGST Total:  ₹{}", totals.sgst_total);
        println!("  Cess Total:  ₹{}", totals.cess_total);
        println!("  Round Off:   ₹{}", totals.round_off);
        println!("  Grand Total: ₹{}", totals.grand_total);
    }
    println!();

    // 4. Rounding to the rupee
    println!("🔄 Rupee Rounding:");
    let rupee_config = EngineConfig {
        rounding: RoundingPolicy::rupee(RoundingRule::HalfUp),
        ..config.clone()
    };
    let rupee_ctx = TaxContext::new("27", "27", &rupee_config);
    let rounded = DocumentBuilder::new(
        "BILL/2024-25/002".to_string(),
        DocumentType::Bill,
        "v1".to_string(),
        date,
    )
    .line(LineInput::new(
        "SOAP",
        "Soap carton",
        BigDecimal::from(3),
        BigDecimal::from(333),
        GstCategory::Reduced.tax_rate(),
    ))
    .build_posted(&rupee_ctx)?;
    if let Some(totals) = &rounded.totals {
        println!("  Before rounding: ₹{}", totals.unrounded_total());
        println!("  Round Off:       ₹{}", totals.round_off);
        println!("  Grand Total:     ₹{}", totals.grand_total);
    }
    println!();

    // 5. Inconsistent rate records are rejected
    println!("⚠️  Rate Validation:");
    let mut broken = GstCategory::Higher.tax_rate();
    broken.cgst_rate = BigDecimal::from(5);
    let bad_line = LineInput::new(
        "ITEM-B",
        "Mislabelled item",
        BigDecimal::from(1),
        BigDecimal::from(100),
        broken,
    );
    match ctx.compute_line(&bad_line) {
        Ok(_) => println!("  Unexpectedly accepted"),
        Err(e) => println!("  Rejected: {}", e),
    }

    println!("\n✅ GST document examples completed!");
    Ok(())
}
