// SPDX-FileCopyrightText: 2026 SmsGate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The HTTP provider against a live mock provider server.

use smsgate_config::model::ProviderConfig;
use smsgate_core::{DeliveryProvider, Message, MessageStatus, SmsGateError};
use smsgate_provider::{HttpDeliveryProvider, mock_router};

fn message(id: i64) -> Message {
    Message {
        id,
        user_id: 1,
        receiver: "09120000000".into(),
        body: "hello".into(),
        cost: 1000,
        status: MessageStatus::Pending,
        created_at: "2026-01-01T00:00:00Z".into(),
        updated_at: "2026-01-01T00:00:00Z".into(),
    }
}

#[tokio::test]
async fn provider_sees_rate_limit_as_transport_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, mock_router(2)).await.unwrap();
    });

    let provider = HttpDeliveryProvider::new(&ProviderConfig {
        base_url: format!("http://{addr}"),
        ..ProviderConfig::default()
    })
    .unwrap();

    for id in 1..=2 {
        assert!(provider.send(&message(id)).await.unwrap().is_success());
    }
    let err = provider.send(&message(3)).await.unwrap_err();
    assert!(matches!(err, SmsGateError::ProviderTransport { .. }));

    let report = provider.delivery_report(&message(1)).await.unwrap();
    assert_eq!(report.message_id, 1);
}
