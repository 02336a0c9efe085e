//! Integration tests for gst-ledger-core

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use gst_ledger_core::{
    utils::{EnhancedDocumentValidator, EnhancedPartyValidator, MemoryStorage},
    Document, DocumentBuilder, DocumentType, EngineConfig, EngineError, EntryKind, EntryType,
    GstCategory, LedgerEngine, LedgerStorage, LineInput, Party, PartyKind, PartyLedger,
    ReturnRequest, TaxContext,
};
use proptest::prelude::*;
use std::str::FromStr;

fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

fn day(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

fn widget(quantity: i64) -> LineInput {
    LineInput::new(
        "ITEM-A",
        "Widget",
        BigDecimal::from(quantity),
        BigDecimal::from(100),
        GstCategory::Higher.tax_rate(),
    )
    .with_discount(BigDecimal::from(10))
}

fn vendor(state_code: &str) -> Party {
    Party::new(
        "v1".to_string(),
        "Acme Supplies".to_string(),
        PartyKind::Vendor,
        state_code.to_string(),
        day(6, 1),
    )
    .with_payment_terms(30)
}

fn customer() -> Party {
    Party::new(
        "c1".to_string(),
        "Retail Co".to_string(),
        PartyKind::Customer,
        "29".to_string(),
        day(6, 1),
    )
}

async fn engine_with_vendor() -> LedgerEngine<MemoryStorage> {
    let mut engine =
        LedgerEngine::new(MemoryStorage::new(), EngineConfig::for_home_state("27")).unwrap();
    engine.register_party(vendor("27")).await.unwrap();
    engine
}

async fn post_bill(
    engine: &mut LedgerEngine<MemoryStorage>,
    id: &str,
    date: NaiveDate,
    quantity: i64,
) {
    let ctx = engine.tax_context("v1").await.unwrap();
    let bill = DocumentBuilder::new(id.to_string(), DocumentType::Bill, "v1".to_string(), date)
        .line(widget(quantity))
        .build_posted(&ctx)
        .unwrap();
    engine.post_document(&bill).await.unwrap();
}

async fn post_payment(
    engine: &mut LedgerEngine<MemoryStorage>,
    id: &str,
    date: NaiveDate,
    amount: &str,
) {
    let mut payment = Document::payment(id.to_string(), "v1".to_string(), date, dec(amount));
    payment.finalize(&engine.config().rounding).unwrap();
    engine.post_document(&payment).await.unwrap();
}

#[test]
fn test_scenario_a_and_b_intrastate_and_interstate_lines() {
    let config = EngineConfig::default();

    let intrastate = TaxContext::new("27", "27", &config)
        .compute_line(&widget(10))
        .unwrap();
    assert_eq!(intrastate.taxable_amount, BigDecimal::from(900));
    assert_eq!(intrastate.cgst_amount, BigDecimal::from(81));
    assert_eq!(intrastate.sgst_amount, BigDecimal::from(81));
    assert_eq!(intrastate.igst_amount, BigDecimal::from(0));
    assert_eq!(intrastate.line_total, BigDecimal::from(1062));

    let interstate = TaxContext::new("27", "29", &config)
        .compute_line(&widget(10))
        .unwrap();
    assert_eq!(interstate.taxable_amount, BigDecimal::from(900));
    assert_eq!(interstate.igst_amount, BigDecimal::from(162));
    assert_eq!(interstate.cgst_amount, BigDecimal::from(0));
    assert_eq!(interstate.sgst_amount, BigDecimal::from(0));
    assert_eq!(interstate.line_total, BigDecimal::from(1062));
    assert_eq!(interstate.tax_amount(), intrastate.tax_amount());
}

#[tokio::test]
async fn test_scenario_c_overdue_bill_lands_in_8_to_30_bucket() {
    let mut engine = engine_with_vendor().await;
    let ctx = engine.tax_context("v1").await.unwrap();
    let bill = DocumentBuilder::new(
        "BILL-1".to_string(),
        DocumentType::Bill,
        "v1".to_string(),
        day(6, 1),
    )
    .due_date(day(7, 1))
    .line(widget(10))
    .build_posted(&ctx)
    .unwrap();
    engine.post_document(&bill).await.unwrap();

    let exposure = engine.overdue_exposure("v1", day(7, 11)).await.unwrap();

    assert_eq!(exposure.total, BigDecimal::from(1062));
    assert_eq!(exposure.items.len(), 1);
    assert_eq!(exposure.items[0].days_overdue, 10);
    assert_eq!(exposure.items[0].bucket, "8-30");
    assert_eq!(exposure.items[0].balance_amount, BigDecimal::from(1062));
    assert_eq!(
        exposure.bucket("8-30").unwrap().amount,
        BigDecimal::from(1062)
    );
    assert_eq!(exposure.bucket("0-7").unwrap().documents, 0);

    let not_yet_due = engine.overdue_exposure("v1", day(7, 1)).await.unwrap();
    assert_eq!(not_yet_due.total, BigDecimal::from(0));
}

#[tokio::test]
async fn test_scenario_d_and_e_returns() {
    let mut engine = engine_with_vendor().await;
    post_bill(&mut engine, "BILL-1", day(6, 2), 10).await;
    assert_eq!(engine.balance("v1").await.unwrap(), BigDecimal::from(1062));

    let request = ReturnRequest::new("PR-1", day(6, 5)).item("ITEM-A", BigDecimal::from(4));
    let purchase_return = engine.create_return("BILL-1", &request).await.unwrap();

    let line = &purchase_return.lines[0];
    assert_eq!(line.taxable_amount, BigDecimal::from(360));
    assert_eq!(line.cgst_amount, dec("32.4"));
    assert_eq!(line.sgst_amount, dec("32.4"));
    assert_eq!(purchase_return.ledger_amount(), Some(dec("424.8")));
    assert_eq!(purchase_return.document_type, DocumentType::PurchaseReturn);
    assert_eq!(engine.balance("v1").await.unwrap(), dec("637.2"));

    let ledger = engine.ledger("v1").await.unwrap();
    let entry = ledger.last_entry().unwrap();
    assert_eq!(entry.entry_type, EntryType::Debit);
    assert_eq!(entry.delta, dec("-424.8"));
    assert_eq!(
        ledger.open_item("BILL-1").unwrap().returned_amount,
        dec("424.8")
    );

    let second = ReturnRequest::new("PR-2", day(6, 6)).item("ITEM-A", BigDecimal::from(7));
    match engine.create_return("BILL-1", &second).await {
        Err(EngineError::OverReturn {
            item_id,
            max_returnable,
            ..
        }) => {
            assert_eq!(item_id, "ITEM-A");
            assert_eq!(max_returnable, BigDecimal::from(6));
        }
        other => panic!("expected OverReturn, got {:?}", other),
    }

    // The failed attempt leaves nothing behind
    assert_eq!(engine.balance("v1").await.unwrap(), dec("637.2"));
    assert!(engine.get_document("PR-2").await.unwrap().is_none());
    assert_eq!(
        engine.returnable_quantities("BILL-1").await.unwrap()["ITEM-A"],
        BigDecimal::from(6)
    );
}

#[tokio::test]
async fn test_complete_purchase_workflow() {
    let mut engine = engine_with_vendor().await;

    let ctx = engine.tax_context("v1").await.unwrap();
    let mut po = DocumentBuilder::new(
        "PO-1".to_string(),
        DocumentType::PurchaseOrder,
        "v1".to_string(),
        day(6, 1),
    )
    .line(widget(10))
    .build(&ctx)
    .unwrap();
    engine.save_draft(&po).await.unwrap();
    po.finalize(&engine.config().rounding).unwrap();
    assert!(matches!(
        engine.post_document(&po).await,
        Err(EngineError::NotPostable { .. })
    ));

    post_bill(&mut engine, "BILL-1", day(6, 2), 10).await;
    post_bill(&mut engine, "BILL-2", day(6, 3), 5).await;
    post_payment(&mut engine, "PAY-1", day(6, 10), "1200").await;

    let ledger = engine.ledger("v1").await.unwrap();
    assert!(ledger.open_item("BILL-1").unwrap().is_settled());
    assert_eq!(
        ledger.open_item("BILL-2").unwrap().balance_amount(),
        BigDecimal::from(393)
    );

    let summary = engine.recompute_balance("v1", None).await.unwrap();
    assert_eq!(summary.total_billed, BigDecimal::from(1593));
    assert_eq!(summary.total_paid, BigDecimal::from(1200));
    assert_eq!(summary.total_returned, BigDecimal::from(0));
    assert_eq!(summary.balance, BigDecimal::from(393));
    assert_eq!(summary.entry_count, 4);

    let as_of = engine.recompute_balance("v1", Some(day(6, 2))).await.unwrap();
    assert_eq!(as_of.balance, BigDecimal::from(1062));

    let documents = engine.get_party_documents("v1", None, None).await.unwrap();
    let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["PO-1", "BILL-1", "BILL-2", "PAY-1"]);

    assert!(engine.verify_party("v1").await.is_ok());
}

#[tokio::test]
async fn test_return_beyond_balance_leaves_party_credit() {
    let mut engine = engine_with_vendor().await;
    post_bill(&mut engine, "BILL-1", day(6, 2), 10).await;
    post_payment(&mut engine, "PAY-1", day(6, 3), "800").await;

    engine
        .create_return(
            "BILL-1",
            &ReturnRequest::new("PR-1", day(6, 4)).item("ITEM-A", BigDecimal::from(4)),
        )
        .await
        .unwrap();

    let ledger = engine.ledger("v1").await.unwrap();
    assert_eq!(ledger.balance(), dec("-162.8"));
    let item = ledger.open_item("BILL-1").unwrap();
    assert_eq!(item.returned_amount, BigDecimal::from(262));
    assert_eq!(item.excess_returned, dec("162.8"));
    assert!(item.is_settled());

    // Settled bills take no further returns by default
    let again = engine
        .create_return(
            "BILL-1",
            &ReturnRequest::new("PR-2", day(6, 5)).item("ITEM-A", BigDecimal::from(1)),
        )
        .await;
    assert!(matches!(again, Err(EngineError::Validation { .. })));
}

#[tokio::test]
async fn test_bounced_payment_restores_full_return_credit() {
    let mut engine = engine_with_vendor().await;
    post_bill(&mut engine, "BILL-1", day(6, 2), 10).await;
    post_payment(&mut engine, "PAY-1", day(6, 3), "800").await;
    engine
        .create_return(
            "BILL-1",
            &ReturnRequest::new("PR-1", day(6, 4)).item("ITEM-A", BigDecimal::from(4)),
        )
        .await
        .unwrap();

    let reversal = engine
        .compensate("v1", 3, day(6, 5), "payment bounced")
        .await
        .unwrap();
    assert_eq!(reversal.running_balance, dec("637.2"));

    let ledger = engine.ledger("v1").await.unwrap();
    let item = ledger.open_item("BILL-1").unwrap();
    assert_eq!(item.returned_amount, dec("424.8"));
    assert_eq!(item.balance_amount(), ledger.balance());

    // BILL-1 fell due on 2024-07-02
    let exposure = engine.overdue_exposure("v1", day(7, 12)).await.unwrap();
    assert_eq!(exposure.total, dec("637.2"));
    assert_eq!(exposure.total, engine.balance("v1").await.unwrap());
}

#[tokio::test]
async fn test_concurrent_postings_conflict() {
    let storage = MemoryStorage::new();
    let config = EngineConfig::for_home_state("27");
    let mut first = LedgerEngine::new(storage.clone(), config.clone()).unwrap();
    let mut second = LedgerEngine::new(storage, config).unwrap();
    first.register_party(vendor("27")).await.unwrap();

    let ctx = first.tax_context("v1").await.unwrap();
    let bill_a = DocumentBuilder::new(
        "BILL-A".to_string(),
        DocumentType::Bill,
        "v1".to_string(),
        day(6, 2),
    )
    .line(widget(10))
    .build_posted(&ctx)
    .unwrap();
    let bill_b = DocumentBuilder::new(
        "BILL-B".to_string(),
        DocumentType::Bill,
        "v1".to_string(),
        day(6, 2),
    )
    .line(widget(1))
    .build_posted(&ctx)
    .unwrap();

    let prepared_a = first.prepare_posting(&bill_a).await.unwrap();
    let prepared_b = second.prepare_posting(&bill_b).await.unwrap();

    first.commit_posting(&prepared_a).await.unwrap();
    match second.commit_posting(&prepared_b).await {
        Err(EngineError::ConcurrentModification {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("expected ConcurrentModification, got {:?}", other),
    }
    assert!(second.get_document("BILL-B").await.unwrap().is_none());

    // Retrying from a fresh snapshot succeeds
    let entry = second.post_document(&bill_b).await.unwrap();
    assert_eq!(entry.sequence, 3);
    assert_eq!(entry.running_balance, dec("1168.2"));
    assert!(first.verify_party("v1").await.is_ok());
}

#[tokio::test]
async fn test_racing_registrations_keep_one_opening_balance() {
    let storage = MemoryStorage::new();
    let config = EngineConfig::for_home_state("27");
    let mut first = LedgerEngine::new(storage.clone(), config.clone()).unwrap();
    let mut second = LedgerEngine::new(storage, config).unwrap();

    let payable = vendor("27").with_opening_balance(BigDecimal::from(500), EntryType::Credit);
    let advance = vendor("27").with_opening_balance(BigDecimal::from(300), EntryType::Debit);

    let registered = first.register_party(payable).await.unwrap();
    let rival = second.register_party(advance).await;
    assert!(matches!(rival, Err(EngineError::Validation { .. })));

    let ledger = second.ledger("v1").await.unwrap();
    assert_eq!(ledger.party(), registered.party());
    assert_eq!(ledger.balance(), BigDecimal::from(500));
    assert_eq!(ledger.entries().len(), 1);
    assert!(second.verify_party("v1").await.is_ok());
}

#[tokio::test]
async fn test_concurrent_returns_cannot_jointly_over_return() {
    let storage = MemoryStorage::new();
    let config = EngineConfig::for_home_state("27");
    let mut first = LedgerEngine::new(storage.clone(), config.clone()).unwrap();
    let mut second = LedgerEngine::new(storage, config).unwrap();
    first.register_party(vendor("27")).await.unwrap();
    post_bill(&mut first, "BILL-1", day(6, 2), 10).await;

    let request_a = ReturnRequest::new("PR-A", day(6, 5)).item("ITEM-A", BigDecimal::from(6));
    let request_b = ReturnRequest::new("PR-B", day(6, 5)).item("ITEM-A", BigDecimal::from(6));

    // Each passes on its own snapshot
    let prepared_a = first.prepare_return("BILL-1", &request_a).await.unwrap();
    let prepared_b = second.prepare_return("BILL-1", &request_b).await.unwrap();

    first.commit_return(&prepared_a).await.unwrap();
    assert!(matches!(
        second.commit_return(&prepared_b).await,
        Err(EngineError::ConcurrentModification { .. })
    ));

    match second.create_return("BILL-1", &request_b).await {
        Err(EngineError::OverReturn { max_returnable, .. }) => {
            assert_eq!(max_returnable, BigDecimal::from(4));
        }
        other => panic!("expected OverReturn, got {:?}", other),
    }
}

#[tokio::test]
async fn test_customer_invoice_credit_note_and_allocation() {
    let mut engine =
        LedgerEngine::new(MemoryStorage::new(), EngineConfig::for_home_state("27")).unwrap();
    engine.register_party(customer()).await.unwrap();

    let ctx = engine.tax_context("c1").await.unwrap();
    assert_eq!(ctx.seller_state, "27");
    assert_eq!(ctx.buyer_state, "29");

    for (id, date, quantity) in [("INV-1", day(6, 2), 10), ("INV-2", day(6, 3), 5)] {
        let invoice =
            DocumentBuilder::new(id.to_string(), DocumentType::Invoice, "c1".to_string(), date)
                .line(widget(quantity))
                .build_posted(&ctx)
            .unwrap();
        engine.post_document(&invoice).await.unwrap();
    }
    assert_eq!(engine.balance("c1").await.unwrap(), BigDecimal::from(1593));

    let credit_note = engine
        .create_return(
            "INV-1",
            &ReturnRequest::new("CN-1", day(6, 4))
                .item("ITEM-A", BigDecimal::from(2))
                .as_type(DocumentType::CreditNote),
        )
        .await
        .unwrap();
    assert_eq!(credit_note.lines[0].igst_amount, dec("32.4"));
    assert_eq!(credit_note.ledger_amount(), Some(dec("212.4")));

    let mut payment = Document::payment(
        "REC-1".to_string(),
        "c1".to_string(),
        day(6, 5),
        BigDecimal::from(531),
    )
    .with_allocation("INV-2", BigDecimal::from(531));
    payment.finalize(&engine.config().rounding).unwrap();
    let entry = engine.post_document(&payment).await.unwrap();
    assert_eq!(entry.entry_type, EntryType::Credit);

    let ledger = engine.ledger("c1").await.unwrap();
    assert!(ledger.open_item("INV-2").unwrap().is_settled());
    assert_eq!(
        ledger.open_item("INV-1").unwrap().balance_amount(),
        dec("849.6")
    );
    assert_eq!(ledger.balance(), dec("849.6"));
}

#[tokio::test]
async fn test_returns_must_go_through_reconciliation() {
    let mut engine = engine_with_vendor().await;
    post_bill(&mut engine, "BILL-1", day(6, 2), 10).await;

    let ctx = engine.tax_context("v1").await.unwrap();
    let forged = DocumentBuilder::new(
        "PR-X".to_string(),
        DocumentType::PurchaseReturn,
        "v1".to_string(),
        day(6, 3),
    )
    .origin("BILL-1".to_string())
    .line(widget(50))
    .build_posted(&ctx)
    .unwrap();

    assert!(matches!(
        engine.post_document(&forged).await,
        Err(EngineError::NotPostable { .. })
    ));
}

#[tokio::test]
async fn test_compensation_and_period_statement() {
    let mut engine = engine_with_vendor().await;
    post_bill(&mut engine, "BILL-1", day(6, 2), 10).await;
    post_payment(&mut engine, "PAY-1", day(6, 10), "500").await;
    post_bill(&mut engine, "BILL-2", day(6, 20), 1).await;

    let reversal = engine
        .compensate("v1", 3, day(6, 21), "cheque returned unpaid")
        .await
        .unwrap();
    assert_eq!(reversal.kind, EntryKind::Compensation);
    assert_eq!(reversal.reverses, Some(3));
    assert_eq!(reversal.delta, BigDecimal::from(500));
    assert_eq!(reversal.running_balance, dec("1168.2"));

    assert!(engine
        .compensate("v1", 3, day(6, 22), "twice")
        .await
        .is_err());
    assert!(engine
        .compensate("v1", 1, day(6, 22), "opening")
        .await
        .is_err());

    let period = engine
        .period_summary("v1", day(6, 5), day(6, 30))
        .await
        .unwrap();
    assert_eq!(period.opening_balance, BigDecimal::from(1062));
    assert_eq!(period.total_paid, BigDecimal::from(500));
    assert_eq!(period.total_billed, dec("106.2"));
    assert_eq!(period.total_adjusted, BigDecimal::from(500));
    assert_eq!(period.closing_balance, dec("1168.2"));
    assert_eq!(period.entries.len(), 3);

    // History is never rewritten
    let entries = engine.ledger("v1").await.unwrap().entries().to_vec();
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[2].delta, BigDecimal::from(-500));
    assert!(engine.verify_party("v1").await.is_ok());
}

#[tokio::test]
async fn test_enhanced_validators() {
    let mut engine = LedgerEngine::with_validators(
        MemoryStorage::new(),
        EngineConfig::for_home_state("27"),
        Box::new(EnhancedPartyValidator),
        Box::new(EnhancedDocumentValidator),
    )
    .unwrap();

    let bad_id = Party::new(
        "v 1!".to_string(),
        "Acme".to_string(),
        PartyKind::Vendor,
        "27".to_string(),
        day(6, 1),
    );
    assert!(matches!(
        engine.register_party(bad_id).await,
        Err(EngineError::Validation { .. })
    ));

    engine.register_party(vendor("27")).await.unwrap();
    assert!(engine.register_party(vendor("27")).await.is_err());

    let ctx = engine.tax_context("v1").await.unwrap();
    let spaced_id = DocumentBuilder::new(
        "BILL 1!".to_string(),
        DocumentType::Bill,
        "v1".to_string(),
        day(6, 2),
    )
    .line(widget(1))
    .build_posted(&ctx)
    .unwrap();
    assert!(matches!(
        engine.post_document(&spaced_id).await,
        Err(EngineError::Validation { .. })
    ));
    assert_eq!(engine.ledger("v1").await.unwrap().version(), 1);
}

#[tokio::test]
async fn test_bill_with_repeated_item_is_refused() {
    let mut engine = engine_with_vendor().await;
    let ctx = engine.tax_context("v1").await.unwrap();

    let duplicated = DocumentBuilder::new(
        "BILL-1".to_string(),
        DocumentType::Bill,
        "v1".to_string(),
        day(6, 2),
    )
    .line(widget(6))
    .line(widget(4))
    .build_posted(&ctx);
    assert!(matches!(
        duplicated,
        Err(EngineError::Validation { ref field, .. }) if field == "document.lines"
    ));

    // A posted document assembled by hand goes through the same check
    let mut bill = DocumentBuilder::new(
        "BILL-1".to_string(),
        DocumentType::Bill,
        "v1".to_string(),
        day(6, 2),
    )
    .line(widget(6))
    .build_posted(&ctx)
    .unwrap();
    bill.lines.push(bill.lines[0].clone());
    assert!(matches!(
        engine.post_document(&bill).await,
        Err(EngineError::Validation { .. })
    ));
    assert!(engine.get_document("BILL-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_jurisdiction_and_back_dating() {
    let mut engine = engine_with_vendor().await;

    let no_state = Party::new(
        "v2".to_string(),
        "Nowhere Ltd".to_string(),
        PartyKind::Vendor,
        String::new(),
        day(6, 1),
    );
    assert!(matches!(
        engine.register_party(no_state).await,
        Err(EngineError::Validation { .. })
    ));

    let mut unconfigured =
        LedgerEngine::new(MemoryStorage::new(), EngineConfig::default()).unwrap();
    unconfigured.register_party(vendor("29")).await.unwrap();
    assert!(unconfigured.tax_context("v1").await.is_err());

    post_bill(&mut engine, "BILL-1", day(6, 10), 1).await;
    let ctx = engine.tax_context("v1").await.unwrap();
    let late = DocumentBuilder::new(
        "BILL-0".to_string(),
        DocumentType::Bill,
        "v1".to_string(),
        day(6, 5),
    )
    .line(widget(1))
    .build_posted(&ctx)
    .unwrap();
    assert!(matches!(
        engine.post_document(&late).await,
        Err(EngineError::Validation { ref field, .. }) if field == "entry.date"
    ));
}

#[tokio::test]
async fn test_stored_history_replays() {
    let mut engine = engine_with_vendor().await;
    post_bill(&mut engine, "BILL-1", day(6, 2), 10).await;
    post_payment(&mut engine, "PAY-1", day(6, 3), "62").await;

    let storage = MemoryStorage::new();
    let mut copy = storage.clone();
    let ledger = engine.ledger("v1").await.unwrap();
    copy.save_party(ledger.party()).await.unwrap();
    for (i, entry) in ledger.entries().iter().enumerate() {
        copy.append_entry(entry, i as u64).await.unwrap();
    }

    let entries = storage.get_party_entries("v1").await.unwrap();
    let replayed = PartyLedger::from_entries(ledger.party().clone(), entries).unwrap();
    assert_eq!(replayed.balance(), BigDecimal::from(1000));
    assert_eq!(replayed.open_items(), ledger.open_items());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_replay_is_idempotent(
        events in prop::collection::vec((any::<bool>(), 1i64..20i64, 1u32..4u32), 1..25),
    ) {
        let ctx = TaxContext::new("27", "27", &EngineConfig::default());
        let mut ledger = PartyLedger::open(
            vendor("27").with_opening_balance(BigDecimal::from(75), EntryType::Credit),
        )
        .unwrap();
        let mut date = day(6, 1);

        for (i, (is_bill, quantity, gap)) in events.iter().enumerate() {
            date = date + chrono::Days::new(u64::from(*gap));
            let document = if *is_bill {
                DocumentBuilder::new(
                    format!("BILL-{}", i),
                    DocumentType::Bill,
                    "v1".to_string(),
                    date,
                )
                .line(widget(*quantity))
                .build_posted(&ctx)
                .unwrap()
            } else {
                let mut payment = Document::payment(
                    format!("PAY-{}", i),
                    "v1".to_string(),
                    date,
                    BigDecimal::from(*quantity * 37),
                );
                payment.finalize(&ctx.rounding).unwrap();
                payment
            };
            ledger.append_entry(&document).unwrap();

            let first = ledger.recompute_balance(None);
            let second = ledger.recompute_balance(None);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(&first.balance, &ledger.balance());
        }

        for entry in ledger.entries() {
            let replayed = ledger.recompute_balance(Some(entry.date));
            let stored = ledger
                .entries()
                .iter()
                .filter(|e| e.date <= entry.date)
                .last()
                .map(|e| e.running_balance.clone())
                .unwrap();
            prop_assert_eq!(replayed.balance, stored);
        }

        let rebuilt =
            PartyLedger::from_entries(ledger.party().clone(), ledger.entries().to_vec()).unwrap();
        prop_assert_eq!(rebuilt.balance(), ledger.balance());
        prop_assert!(ledger.verify().is_ok());
    }
}
