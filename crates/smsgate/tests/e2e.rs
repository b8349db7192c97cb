// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end pipeline tests: account funding, send, queue routing and
//! asynchronous delivery against an in-memory broker and scripted provider.

use std::time::Duration;

use smsgate_config::model::DeclinePolicy;
use smsgate_core::{LedgerStatus, MessageStatus, SmsGateError};
use smsgate_pipeline::HistoryPage;
use smsgate_test_utils::{MockOutcome, TestHarness};

const DRAIN: Duration = Duration::from_secs(10);

#[tokio::test]
async fn funded_send_is_billed_queued_and_delivered() {
    let harness = TestHarness::builder()
        .with_sms_cost(1000)
        .build()
        .await
        .unwrap();
    let user = harness.funded_user(5000).await.unwrap();
    let main = harness.config.broker.main_queue.clone();
    assert_eq!(harness.broker.ready(&main), 0);

    let receipt = harness
        .send
        .send(user.id, "09350000000", "hello world")
        .await
        .unwrap();
    assert_eq!(receipt.queue, main);
    assert_eq!(receipt.cost, 1000);

    let user = harness.accounts.get_user(user.id).await.unwrap();
    assert_eq!(user.credit, 4000);
    let message = harness
        .storage
        .get_message_by_id(receipt.message_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.status, MessageStatus::Pending);
    let entry = harness
        .storage
        .get_ledger_entry_by_message_id(receipt.message_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, LedgerStatus::Pending);
    let published = harness.broker.published(&main);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].body, receipt.message_id.to_string().into_bytes());

    harness.drain(DRAIN).await.unwrap();

    let message = harness
        .storage
        .get_message_by_id(receipt.message_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.status, MessageStatus::Sent);
    let entry = harness
        .storage
        .get_ledger_entry_by_message_id(receipt.message_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, LedgerStatus::Success);
    assert_eq!(harness.provider.call_count().await, 1);
}

#[tokio::test]
async fn insufficient_credit_leaves_no_trace() {
    let harness = TestHarness::builder()
        .with_sms_cost(1000)
        .build()
        .await
        .unwrap();
    let user = harness.funded_user(999).await.unwrap();

    let err = harness
        .send
        .send(user.id, "09350000000", "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, SmsGateError::InsufficientCredit { .. }));

    let history = harness
        .send
        .history(user.id, HistoryPage::default())
        .await
        .unwrap();
    assert!(history.is_empty());
    assert!(harness.broker.published(&harness.config.broker.main_queue).is_empty());
    assert_eq!(harness.accounts.get_user(user.id).await.unwrap().credit, 999);
}

#[tokio::test]
async fn backlogged_main_queue_spills_to_overflow() {
    let harness = TestHarness::builder()
        .with_overflow_threshold(2)
        .build()
        .await
        .unwrap();
    let user = harness.funded_user(10_000).await.unwrap();
    let broker = &harness.config.broker;

    let first = harness.send.send(user.id, "09350000000", "1").await.unwrap();
    let second = harness.send.send(user.id, "09350000000", "2").await.unwrap();
    assert_eq!(first.queue, broker.main_queue);
    assert_eq!(second.queue, broker.main_queue);

    let third = harness.send.send(user.id, "09350000000", "3").await.unwrap();
    assert!(
        third.queue == broker.overflow_a_queue || third.queue == broker.overflow_b_queue,
        "expected an overflow queue, got {}",
        third.queue
    );

    harness.drain(DRAIN).await.unwrap();
    for receipt in [first, second, third] {
        let message = harness
            .storage
            .get_message_by_id(receipt.message_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
    }
}

#[tokio::test]
async fn unavailable_provider_is_retried_until_delivered() {
    let harness = TestHarness::builder()
        .with_provider_outcomes(vec![
            MockOutcome::Unavailable("connection reset".into()),
            MockOutcome::Accept,
        ])
        .build()
        .await
        .unwrap();
    let user = harness.funded_user(5000).await.unwrap();
    let receipt = harness.send.send(user.id, "09350000000", "retry").await.unwrap();

    harness.drain(DRAIN).await.unwrap();

    assert_eq!(
        harness.provider.calls().await,
        vec![receipt.message_id, receipt.message_id]
    );
    let entry = harness
        .storage
        .get_ledger_entry_by_message_id(receipt.message_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, LedgerStatus::Success);
}

#[tokio::test]
async fn declined_message_is_failed_and_acknowledged() {
    let harness = TestHarness::builder()
        .with_decline_policy(DeclinePolicy::Acknowledge)
        .with_provider_outcomes(vec![MockOutcome::Decline("invalid receiver".into())])
        .build()
        .await
        .unwrap();
    let user = harness.funded_user(5000).await.unwrap();
    let receipt = harness.send.send(user.id, "09350000000", "nope").await.unwrap();

    harness.drain(DRAIN).await.unwrap();

    assert_eq!(harness.provider.call_count().await, 1);
    let message = harness
        .storage
        .get_message_by_id(receipt.message_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.status, MessageStatus::Failed);
    let entry = harness
        .storage
        .get_ledger_entry_by_message_id(receipt.message_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, LedgerStatus::Failed);
}

#[tokio::test]
async fn publisher_reconnects_after_broker_drop() {
    let harness = TestHarness::new().await.unwrap();
    let user = harness.funded_user(1_000_000).await.unwrap();
    let cancel = tokio_util::sync::CancellationToken::new();
    let supervisor = tokio::spawn(harness.publisher.clone().run_supervisor(cancel.clone()));

    harness.broker.force_disconnect();
    let receipt = tokio::time::timeout(DRAIN, async {
        loop {
            match harness.send.send(user.id, "09350000000", "again").await {
                Ok(receipt) => break receipt,
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
    })
    .await
    .expect("publish succeeds after reconnect");

    cancel.cancel();
    supervisor.await.unwrap();
    harness.drain(DRAIN).await.unwrap();
    let message = harness
        .storage
        .get_message_by_id(receipt.message_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.status, MessageStatus::Sent);
}
