mod support;

use chrono::Duration;
use settlement_engine::{db_types::NewGatewayEvent, EventLedger};
use support::fresh_db;

fn event(id: &str) -> NewGatewayEvent {
    NewGatewayEvent::new(id, "payment.captured", format!(r#"{{"id":"{id}","event":"payment.captured"}}"#))
}

#[tokio::test]
async fn first_delivery_is_new_and_redeliveries_are_counted() {
    let db = fresh_db(2).await;
    let (record, existed) = db.record_if_new(event("evt_A")).await.unwrap();
    assert!(!existed);
    assert!(!record.processed);
    assert_eq!(record.retry_count, 0);
    assert_eq!(record.event_type, "payment.captured");

    let (record, existed) = db.record_if_new(event("evt_A")).await.unwrap();
    assert!(existed);
    assert_eq!(record.retry_count, 1);
    let (record, _) = db.record_if_new(event("evt_A")).await.unwrap();
    assert_eq!(record.retry_count, 2);
    assert_eq!(db.count_events().await.unwrap(), 1);
}

#[tokio::test]
async fn redelivery_keeps_the_original_payload() {
    let db = fresh_db(2).await;
    db.record_if_new(NewGatewayEvent::new("evt_B", "refund.processed", "first".into())).await.unwrap();
    let (record, existed) =
        db.record_if_new(NewGatewayEvent::new("evt_B", "refund.processed", "second".into())).await.unwrap();
    assert!(existed);
    assert_eq!(record.payload, "first");
}

#[tokio::test]
async fn concurrent_deliveries_record_once() {
    let db = fresh_db(8).await;
    let mut tasks = Vec::new();
    for _ in 0..16 {
        let db = db.clone();
        tasks.push(tokio::spawn(async move { db.record_if_new(event("evt_race")).await.unwrap().1 }));
    }
    let mut fresh = 0;
    for task in tasks {
        if !task.await.unwrap() {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 1);
    let stored = db.fetch_event("evt_race").await.unwrap().unwrap();
    assert_eq!(stored.retry_count, 15);
}

#[tokio::test]
async fn processing_outcome_is_recorded() {
    let db = fresh_db(2).await;
    db.record_if_new(event("evt_C")).await.unwrap();
    db.mark_processed("evt_C", Some("Order 12 is FAILED")).await.unwrap();
    let stored = db.fetch_event("evt_C").await.unwrap().unwrap();
    assert!(stored.processed);
    assert!(stored.processed_at.is_some());
    assert!(!stored.is_settled());

    db.mark_processed("evt_C", None).await.unwrap();
    let stored = db.fetch_event("evt_C").await.unwrap().unwrap();
    assert!(stored.is_settled());
    assert_eq!(stored.error, None);

    // unknown ids are not an error
    db.mark_processed("evt_nope", None).await.unwrap();
    assert!(db.fetch_event("evt_nope").await.unwrap().is_none());
}

#[tokio::test]
async fn ledger_is_append_only() {
    let db = fresh_db(1).await;
    db.record_if_new(event("evt_D")).await.unwrap();
    let delete = sqlx::query("DELETE FROM gateway_events WHERE event_id = 'evt_D'").execute(db.pool()).await;
    assert!(delete.is_err());
    let rewrite = sqlx::query("UPDATE gateway_events SET payload = 'forged' WHERE event_id = 'evt_D'")
        .execute(db.pool())
        .await;
    assert!(rewrite.is_err());
    assert_eq!(db.count_events().await.unwrap(), 1);
}

#[tokio::test]
async fn only_one_delivery_holds_the_claim() {
    let db = fresh_db(8).await;
    db.record_if_new(event("evt_E")).await.unwrap();
    let lease = Duration::minutes(5);
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let db = db.clone();
        tasks.push(tokio::spawn(async move { db.claim_event("evt_E", lease).await.unwrap().is_some() }));
    }
    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    let stored = db.fetch_event("evt_E").await.unwrap().unwrap();
    assert!(stored.claimed_at.is_some());

    // A clean run is final
    db.mark_processed("evt_E", None).await.unwrap();
    assert!(db.claim_event("evt_E", lease).await.unwrap().is_none());
    assert!(db.fetch_event("evt_E").await.unwrap().unwrap().is_settled());
}

#[tokio::test]
async fn errored_events_are_reclaimed_once() {
    let db = fresh_db(2).await;
    let lease = Duration::minutes(5);
    db.record_if_new(event("evt_F")).await.unwrap();
    assert!(db.claim_event("evt_F", lease).await.unwrap().is_some());
    db.mark_processed("evt_F", Some("No order for payment pay_F")).await.unwrap();

    let reclaimed = db.claim_event("evt_F", lease).await.unwrap().unwrap();
    assert!(!reclaimed.processed);
    assert!(db.claim_event("evt_F", lease).await.unwrap().is_none());
}

#[tokio::test]
async fn abandoned_claims_expire() {
    let db = fresh_db(1).await;
    let lease = Duration::minutes(5);
    db.record_if_new(event("evt_G")).await.unwrap();
    assert!(db.claim_event("evt_G", lease).await.unwrap().is_some());
    assert!(db.claim_event("evt_G", lease).await.unwrap().is_none());

    sqlx::query("UPDATE gateway_events SET claimed_at = datetime('now', '-1 hour') WHERE event_id = 'evt_G'")
        .execute(db.pool())
        .await
        .unwrap();
    assert!(db.claim_event("evt_G", lease).await.unwrap().is_some());
}
