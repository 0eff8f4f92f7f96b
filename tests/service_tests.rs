//! Service start/stop and status polling over a scripted transport

mod common;

use common::{Call, CountingSleeper, MockTransport, instance, rest};
use nio_client::{
    ClientConfig, Instance, NioError, PollPolicy, Status, TransitionError, TransportError,
};
use serde_json::json;
use std::time::Duration;

const STATUS: &str = "services/s/status";

fn with_service() -> MockTransport {
    let mock = MockTransport::new();
    mock.on_get("services", json!({ "s": { "name": "s", "type": "Service" } }));
    mock
}

#[test]
fn test_start_polls_until_started() {
    let mock = with_service();
    let sleeper = CountingSleeper::default();
    let instance = instance(&mock, &sleeper);
    mock.queue(STATUS, Ok(json!("stopped")));
    mock.queue(STATUS, Ok(json!({ "status": "starting" })));
    mock.queue(STATUS, Ok(json!("started")));

    let outcome = instance.service("s").expect("loaded").start().expect("started");

    assert_eq!(outcome.polls, 3);
    assert!(outcome.saw_transition);
    assert_eq!(sleeper.count(), 2);
    assert_eq!(
        mock.gets(),
        vec!["services/s/start", STATUS, STATUS, STATUS]
    );
}

#[test]
fn test_start_tolerates_action_status_error() {
    let mock = with_service();
    let sleeper = CountingSleeper::default();
    let instance = instance(&mock, &sleeper);
    mock.fail_get("services/s/start", TransportError::status("services/s/start", 500));
    mock.on_get(STATUS, json!("started"));

    instance.service("s").expect("loaded").start().expect("started");
    assert_eq!(sleeper.count(), 0);
}

#[test]
fn test_start_retries_action_connection_errors() {
    let mock = with_service();
    let sleeper = CountingSleeper::default();
    let instance = instance(&mock, &sleeper);
    mock.fail_get(
        "services/s/start",
        TransportError::connection("services/s/start", "refused"),
    );

    let err = instance.service("s").expect("loaded").start().unwrap_err();

    assert!(err.is_connection());
    assert_eq!(sleeper.count(), 5);
    assert_eq!(mock.gets().len(), 6);
}

#[test]
fn test_start_invalid_transition() {
    let mock = with_service();
    let instance = instance(&mock, &CountingSleeper::default());
    mock.queue(STATUS, Ok(json!("starting")));
    mock.queue(STATUS, Ok(json!("error")));

    let err = instance.service("s").expect("loaded").start().unwrap_err();
    assert!(matches!(
        err,
        NioError::Transition(TransitionError::InvalidTransition { ref observed, expected: Status::Started })
            if observed == "error"
    ));
}

#[test]
fn test_await_status_times_out() {
    let mock = with_service();
    mock.on_get(STATUS, json!("stopping"));
    let sleeper = CountingSleeper::default();
    let policy = PollPolicy {
        interval: Duration::from_millis(500),
        max_wait: Some(Duration::from_secs(2)),
        ..PollPolicy::default()
    };
    let instance = Instance::from_rest(
        ClientConfig::default(),
        rest(&mock, &sleeper).with_poll_policy(policy),
    )
    .expect("loads");

    let err = instance
        .service("s")
        .expect("loaded")
        .await_status(Status::Stopped)
        .unwrap_err();

    assert!(matches!(err, NioError::Transition(TransitionError::TimedOut { .. })));
    assert_eq!(sleeper.count(), 4);
}

#[test]
fn test_stop_only_issues_action() {
    let mock = with_service();
    let sleeper = CountingSleeper::default();
    let instance = instance(&mock, &sleeper);

    instance.service("s").expect("loaded").stop().expect("stopped");

    assert_eq!(mock.calls(), vec![Call::Get("services/s/stop".into())]);
}

#[test]
fn test_bulk_start_in_order() {
    let mock = MockTransport::new();
    mock.on_get("services", json!(["b", "a"]));
    mock.on_get("services/a/status", json!("started"));
    mock.on_get("services/b/status", json!("started"));
    let instance = instance(&mock, &CountingSleeper::default());

    let order = [
        instance.service("b").expect("loaded"),
        instance.service("a").expect("loaded"),
    ];
    instance.start(order).expect("started");

    assert_eq!(
        mock.gets(),
        vec![
            "services/b/start",
            "services/b/status",
            "services/a/start",
            "services/a/status"
        ]
    );
}

#[test]
fn test_status() {
    let mock = with_service();
    let instance = instance(&mock, &CountingSleeper::default());
    let service = instance.service("s").expect("loaded");

    mock.queue(STATUS, Ok(json!({ "status": "configured" })));
    assert_eq!(service.status().expect("known"), Some(Status::Configured));

    mock.queue(STATUS, Ok(json!(null)));
    assert_eq!(service.status().expect("unreported"), None);

    mock.queue(STATUS, Ok(json!("exploded")));
    assert!(matches!(service.status(), Err(NioError::UnexpectedResponse { .. })));
}

#[test]
fn test_connect_and_save() {
    let mock = MockTransport::new();
    let mut instance = instance(&mock, &CountingSleeper::default());
    let service = instance.create_service("pipeline").expect("created");
    service.connect_names("one", "two");
    service.connect_names("one", "three");
    service.save().expect("saved");

    let (_, body) = mock.puts().pop().expect("put");
    assert_eq!(
        body["execution"],
        json!([{ "name": "one", "receivers": ["two", "three"] }])
    );
}
