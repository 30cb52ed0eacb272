//! End-to-end tests for the wired stack.
//!
//! Each test builds a thing with the JSON Schema validator, attaches it to
//! the in-process message bus and drives it through the public API or a
//! subscriber session, the way `webthingd` does.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value as Json, json};

use webthing_adapter_jsonschema::JsonSchemaValidator;
use webthing_app::action_runner::ActionRunner;
use webthing_app::message_bus::InProcessMessageBus;
use webthing_app::session::ThingSession;
use webthing_domain::action::{
    Action, ActionFactory, ActionRequest, ActionStatus, CancellationToken,
};
use webthing_domain::error::{ActionError, PropertyError};
use webthing_domain::message::Message;
use webthing_domain::property::ValueKind;
use webthing_domain::storage::StorageConfig;
use webthing_domain::thing::Thing;
use webthing_domain::value::Value;

/// A lamp validated by the JSON Schema adapter and attached to `bus`.
fn lamp(bus: &InProcessMessageBus) -> Arc<Thing> {
    let thing = Thing::builder()
        .id("lamp")
        .title("Lamp")
        .validator(Arc::new(JsonSchemaValidator::new()))
        .event_storage(StorageConfig::bounded(3))
        .build();
    thing
        .link_property("on", Value::new(false), json!({"type": "boolean"}))
        .unwrap();
    thing
        .link_property("level", Value::new(5_i64), json!({"type": "integer", "readOnly": true}))
        .unwrap();
    thing
        .link_property(
            "voltage",
            Value::new(1000_i64),
            json!({"type": "integer", "minimum": 555}),
        )
        .unwrap();
    thing
        .link_property("ratio", Value::new(0.0_f64), json!({"type": "number"}))
        .unwrap();
    thing
        .link_action(
            "fade",
            json!({"input": {"type": "integer", "minimum": 42, "maximum": 666}}),
            |action: &Action, token: &CancellationToken| {
                let millis = action.input().and_then(Json::as_u64).unwrap_or(0);
                let _ = token.sleep(Duration::from_millis(millis));
            },
        )
        .unwrap();
    thing.link_event("overheated", json!({"type": "number"})).unwrap();
    bus.attach(&thing);
    thing
}

fn action_status(message: &Message) -> Option<(String, Json)> {
    match message {
        Message::ActionStatus(data) => data
            .iter()
            .next()
            .map(|(name, body)| (name.clone(), body["status"].clone())),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn should_notify_every_concurrent_write() {
    const THREADS: usize = 8;
    const WRITES: usize = 100;

    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);
    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);
    thing.add_message_observer(move |topic, message| {
        if topic == "lamp/properties" && matches!(message, Message::PropertyStatus(_)) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let thing = &thing;
            scope.spawn(move || {
                for m in 0..WRITES {
                    // distinct and never the initial 0.0, so every write is a change
                    #[allow(clippy::cast_precision_loss)]
                    let value = (t * WRITES + m + 1) as f64;
                    thing.set_property("ratio", value).unwrap();
                }
            });
        }
    });

    assert_eq!(received.load(Ordering::SeqCst), THREADS * WRITES);
    let last = thing.property::<f64>("ratio").unwrap().unwrap();
    #[allow(clippy::cast_precision_loss)]
    let upper = (THREADS * WRITES) as f64;
    assert!(last >= 1.0 && last <= upper);
}

#[test]
fn should_accept_property_write_from_message_observer() {
    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);
    let clamped = Arc::downgrade(&thing);
    thing.add_message_observer(move |_, message| {
        let Message::PropertyStatus(data) = message else {
            return;
        };
        if data.get("ratio").and_then(Json::as_f64).is_some_and(|ratio| ratio > 10.0) {
            if let Some(thing) = clamped.upgrade() {
                thing.set_property("ratio", 10.0).unwrap();
            }
        }
    });
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    thing.add_message_observer(move |_, message| {
        if let Message::PropertyStatus(data) = message {
            sink.lock().unwrap().push(data["ratio"].clone());
        }
    });

    let (done, finished) = std::sync::mpsc::channel();
    let writer = Arc::clone(&thing);
    std::thread::spawn(move || {
        writer.set_property("ratio", 50.0).unwrap();
        done.send(()).unwrap();
    });

    finished.recv_timeout(Duration::from_secs(3)).unwrap();
    assert_eq!(thing.property::<f64>("ratio").unwrap(), Some(10.0));
    assert_eq!(*seen.lock().unwrap(), vec![json!(50.0), json!(10.0)]);
}

#[tokio::test]
async fn should_keep_read_only_property_unchanged() {
    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);
    let mut sub = bus.subscribe();
    sub.subscribe("lamp/properties");

    let err = thing.set_property("level", 9_i64).unwrap_err();

    assert_eq!(err, PropertyError::ReadOnly);
    assert_eq!(thing.property::<i64>("level").unwrap(), Some(5));
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn should_enforce_schema_minimum() {
    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);
    let mut sub = bus.subscribe();
    sub.subscribe("lamp/properties");

    let err = thing.set_property("voltage", 123_i64).unwrap_err();
    assert!(matches!(err, PropertyError::InvalidValue(_)));
    assert!(err.to_string().starts_with("invalid property value - "));
    assert_eq!(thing.property::<i64>("voltage").unwrap(), Some(1000));
    assert!(sub.try_recv().is_none());

    thing.set_property("voltage", 555_i64).unwrap();
    let received = sub.recv().await.unwrap();
    assert_eq!(received.message, Message::property_status("voltage", json!(555)));
}

#[test]
fn should_reject_mismatched_value_type() {
    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);

    let err = thing.set_property("on", "yes").unwrap_err();

    assert_eq!(
        err,
        PropertyError::TypeMismatch {
            expected: ValueKind::Boolean,
            actual: ValueKind::String,
        }
    );
    assert_eq!(thing.property::<bool>("on").unwrap(), Some(false));
}

#[test]
fn should_widen_integer_writes_to_number_properties() {
    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);

    thing.set_property("ratio", 3_i64).unwrap();

    assert_eq!(thing.property::<f64>("ratio").unwrap(), Some(3.0));
    assert_eq!(thing.get_properties()["ratio"], json!(3.0));
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_publish_action_transitions_in_order() {
    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);
    let mut sub = bus.subscribe();
    sub.subscribe("lamp/actions");

    let action = thing.perform_action("fade", Some(json!(50))).unwrap();
    ActionRunner::current().spawn(Arc::clone(&action)).await.unwrap();

    let mut statuses = Vec::new();
    while let Some(received) = sub.try_recv() {
        if let Some((name, status)) = action_status(&received.message) {
            assert_eq!(name, "fade");
            statuses.push(status);
        }
    }
    assert_eq!(statuses, vec![json!("created"), json!("pending"), json!("completed")]);
    assert_eq!(action.status(), ActionStatus::Completed);
}

#[tokio::test]
async fn should_not_notify_unregistered_action() {
    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);
    let mut sub = bus.subscribe();
    sub.subscribe("lamp/actions");

    assert!(thing.perform_action("explode", None).is_none());

    assert!(sub.try_recv().is_none());
    assert_eq!(thing.get_action_descriptions(None), json!([]));
}

#[tokio::test]
async fn should_refuse_action_input_outside_schema() {
    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);
    let mut sub = bus.subscribe();
    sub.subscribe("lamp/actions");

    assert!(thing.perform_action("fade", Some(json!(41))).is_none());
    assert!(thing.perform_action("fade", Some(json!(667))).is_none());
    assert!(thing.perform_action("fade", None).is_none());
    assert!(sub.try_recv().is_none());

    assert!(thing.perform_action("fade", Some(json!(42))).is_some());
    assert_eq!(thing.get_action_descriptions(Some("fade")).as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn should_drop_request_whose_factory_refuses_the_input() {
    #[derive(serde::Deserialize)]
    struct Blink {
        times: u32,
    }

    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);
    let factory: ActionFactory = Arc::new(|request: ActionRequest| -> Result<Action, ActionError> {
        let blink: Blink = request.parse_input()?;
        let times = blink.times;
        let handler = move |_: &Action, _: &CancellationToken| {
            tracing::debug!(times, "blinking");
        };
        Ok(request.into_action(Arc::new(handler)))
    });
    thing.add_available_action("blink", json!({}), factory).unwrap();
    let mut sub = bus.subscribe();
    sub.subscribe("lamp/actions");

    assert!(thing.perform_action("blink", Some(json!({"times": "twice"}))).is_none());
    assert!(thing.perform_action("blink", None).is_none());
    assert!(sub.try_recv().is_none());

    let action = thing.perform_action("blink", Some(json!({"times": 2}))).unwrap();
    let received = sub.recv().await.unwrap();
    assert_eq!(action_status(&received.message), Some(("blink".to_string(), json!("created"))));
}

#[tokio::test]
async fn should_cancel_running_action_on_removal() {
    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);

    let action = thing.perform_action("fade", Some(json!(600))).unwrap();
    let task = ActionRunner::current().spawn(Arc::clone(&action));

    assert!(thing.remove_action("fade", action.id()));
    tokio::time::timeout(Duration::from_millis(500), task)
        .await
        .unwrap()
        .unwrap();

    assert!(action.cancellation_token().is_cancelled());
    assert!(thing.get_action("fade", action.id()).is_none());
    assert!(!thing.remove_action("fade", action.id()));
}

#[tokio::test]
async fn should_run_many_actions_concurrently() {
    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);
    let runner = ActionRunner::current();

    let actions: Vec<Arc<Action>> = (0..5)
        .map(|_| thing.perform_action("fade", Some(json!(200))).unwrap())
        .collect();
    let tasks: Vec<_> = actions.iter().map(|a| runner.spawn(Arc::clone(a))).collect();
    let all = async {
        for task in tasks {
            task.await.unwrap();
        }
    };
    tokio::time::timeout(Duration::from_millis(900), all)
        .await
        .unwrap();

    let ids: HashSet<&str> = actions.iter().map(|a| a.id()).collect();
    assert_eq!(ids.len(), 5);
    assert!(actions.iter().all(|a| a.status() == ActionStatus::Completed));
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_deliver_events_only_to_subscribed_sessions() {
    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);
    let mut watching = ThingSession::open(Arc::clone(&thing), &bus, ActionRunner::current());
    let mut idle = ThingSession::open(Arc::clone(&thing), &bus, ActionRunner::current());

    let replies = watching
        .handle_text(r#"{"messageType": "addEventSubscription", "data": {"overheated": {}}}"#);
    assert!(replies.is_empty());
    thing.emit_event("overheated", Some(json!(101)));

    let received = watching.next_message().await.unwrap();
    assert_eq!(received.topic, "lamp/events/overheated");
    let Message::Event(data) = &received.message else {
        panic!("expected event, got {:?}", received.message);
    };
    assert_eq!(data["overheated"]["data"], json!(101));
    assert!(idle.try_next_message().is_none());
}

#[test]
fn should_keep_only_latest_events() {
    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);

    for n in 0..6 {
        thing.emit_event("overheated", Some(json!(n)));
    }
    thing.emit_event("unknown", None);

    let data: Vec<Json> = thing
        .get_event_descriptions(None)
        .as_array()
        .unwrap()
        .iter()
        .map(|description| description["overheated"]["data"].clone())
        .collect();
    assert_eq!(data, vec![json!(3), json!(4), json!(5)]);
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_report_schema_violation_to_session() {
    let bus = InProcessMessageBus::new(16);
    let thing = lamp(&bus);
    let mut session = ThingSession::open(Arc::clone(&thing), &bus, ActionRunner::current());

    let replies =
        session.handle_text(r#"{"messageType": "setProperty", "data": {"voltage": 100}}"#);

    assert_eq!(replies.len(), 1);
    let Message::Error(error) = &replies[0] else {
        panic!("expected error, got {:?}", replies[0]);
    };
    assert_eq!(error.status, "400 Bad Request");
    assert!(error.message.starts_with("invalid property value - "));
    assert!(session.try_next_message().is_none());
}
