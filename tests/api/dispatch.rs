use crate::helpers::{subscriber, weather_body, TestApp, BOT_TOKEN, DELIVERY_DELAY_MILLISECONDS};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, ResponseTemplate,
};

async fn report(response: reqwest::Response) -> Value {
    assert_eq!(response.status().as_u16(), 200);
    response.json().await.expect("Failed to parse delivery report")
}

#[tokio::test]
async fn every_eligible_subscriber_gets_the_daily_update() {
    // given
    let app = TestApp::spawn().await;
    app.mount_telegram_accepting_messages().await;
    app.mount_weather("New York", weather_body("New York", 21.6, 20.2, "Clear"))
        .await;
    app.store.insert(subscriber(1, true, false));
    app.store.insert(subscriber(2, true, false));
    app.store.insert(subscriber(3, true, false));

    // when
    let report = report(app.post_dispatch().await).await;

    // then
    assert_eq!(
        report,
        json!({ "attempted": 3, "delivered": 3, "failed": 0 })
    );
    let sent = app.sent_messages().await;
    let recipients: Vec<i64> = sent.iter().map(|(chat_id, _)| *chat_id).collect();
    assert_eq!(recipients, vec![1, 2, 3]);
    for (_, text) in &sent {
        assert!(text.starts_with("🌅 Good morning!"), "{text}");
        assert!(text.contains("☀️ Weather in New York"), "{text}");
        assert!(text.contains("Temperature: 22°C (feels like 20°C)"), "{text}");
    }
}

#[tokio::test]
async fn unsubscribed_and_blocked_users_are_skipped() {
    // given
    let app = TestApp::spawn().await;
    app.mount_telegram_accepting_messages().await;
    app.mount_weather("New York", weather_body("New York", 10.0, 9.0, "Clouds"))
        .await;
    app.store.insert(subscriber(1, true, false));
    app.store.insert(subscriber(2, true, true));
    app.store.insert(subscriber(3, false, false));

    // when
    let report = report(app.post_dispatch().await).await;

    // then
    assert_eq!(report["attempted"], 1);
    let recipients: Vec<i64> = app
        .sent_messages()
        .await
        .into_iter()
        .map(|(chat_id, _)| chat_id)
        .collect();
    assert_eq!(recipients, vec![1]);
}

#[tokio::test]
async fn a_failing_recipient_does_not_stop_the_run() {
    // given
    let app = TestApp::spawn().await;
    Mock::given(path(format!("/bot{BOT_TOKEN}/sendMessage")))
        .and(method("POST"))
        .and(body_partial_json(json!({ "chat_id": 2 })))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        })))
        .with_priority(1)
        .expect(1)
        .mount(&app.telegram_server)
        .await;
    app.mount_telegram_accepting_messages().await;
    app.mount_weather("New York", weather_body("New York", 10.0, 9.0, "Rain"))
        .await;

    let mut lost = subscriber(4, true, false);
    lost.location = Some("Atlantis".into());
    for chat_id in 1..=3 {
        app.store.insert(subscriber(chat_id, true, false));
    }
    app.store.insert(lost);

    // when
    let report = report(app.post_dispatch().await).await;

    // then
    assert_eq!(
        report,
        json!({ "attempted": 4, "delivered": 2, "failed": 2 })
    );
}

#[tokio::test]
async fn deliveries_are_spaced_by_the_configured_delay() {
    // given
    let app = TestApp::spawn().await;
    app.mount_telegram_accepting_messages().await;
    app.mount_weather("New York", weather_body("New York", 10.0, 9.0, "Mist"))
        .await;
    for chat_id in 1..=4 {
        app.store.insert(subscriber(chat_id, true, false));
    }

    // when
    let started = Instant::now();
    let report = report(app.post_dispatch().await).await;
    let elapsed = started.elapsed();

    // then
    assert_eq!(report["attempted"], 4);
    assert!(
        elapsed >= Duration::from_millis(3 * DELIVERY_DELAY_MILLISECONDS),
        "{elapsed:?}"
    );
}

#[tokio::test]
async fn dispatch_without_subscribers_sends_nothing() {
    // given
    let app = TestApp::spawn().await;
    Mock::given(path(format!("/bot{BOT_TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.telegram_server)
        .await;

    // when
    let report = report(app.post_dispatch().await).await;

    // then
    assert_eq!(
        report,
        json!({ "attempted": 0, "delivered": 0, "failed": 0 })
    );
}

#[tokio::test]
async fn a_second_dispatch_during_a_running_one_is_rejected() {
    // given
    let app = TestApp::spawn().await;
    app.mount_telegram_accepting_messages().await;
    Mock::given(path("/data/2.5/weather"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(weather_body("New York", 10.0, 9.0, "Snow"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&app.weather_server)
        .await;
    app.store.insert(subscriber(1, true, false));

    // when
    let (first, second) = tokio::join!(app.post_dispatch(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        app.post_dispatch().await
    });

    // then
    assert_eq!(first.status().as_u16(), 200);
    assert_eq!(second.status().as_u16(), 409);
    assert_eq!(app.sent_messages().await.len(), 1);
}

#[tokio::test]
async fn dispatch_returns_500_when_subscribers_cannot_be_listed() {
    // given
    let app = TestApp::spawn().await;
    Mock::given(path(format!("/bot{BOT_TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.telegram_server)
        .await;
    app.store.make_unavailable();

    // when
    let response = app.post_dispatch().await;

    // then
    assert_eq!(response.status().as_u16(), 500);
}
