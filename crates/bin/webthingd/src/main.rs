//! # webthingd: web thing demo daemon
//!
//! Composition root that wires the resource model together and runs a demo
//! lamp until interrupted.
//!
//! ## Responsibilities
//! - Load configuration (`webthing.toml`, env vars)
//! - Initialise `tracing-subscriber` from the configured filter
//! - Build the lamp thing with the JSON Schema validator and history sizes
//! - Attach it to the in-process message bus
//! - Drive a scripted session against it and log every message it receives
//! - Stop on Ctrl-C
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer, no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use webthing_adapter_jsonschema::JsonSchemaValidator;
use webthing_app::action_runner::ActionRunner;
use webthing_app::message_bus::InProcessMessageBus;
use webthing_app::session::ThingSession;
use webthing_domain::action::{
    Action, ActionFactory, ActionHandler, ActionRequest, CancellationToken,
};
use webthing_domain::error::{ActionError, WebThingError};
use webthing_domain::thing::Thing;
use webthing_domain::value::Value;

use crate::config::Config;

/// Input of the `fade` action.
#[derive(Debug, Clone, Copy, Deserialize)]
struct Fade {
    brightness: i64,
    duration: u64,
}

impl ActionHandler for Fade {
    fn perform(&self, action: &Action, token: &CancellationToken) {
        if token.sleep(Duration::from_millis(self.duration)) {
            tracing::info!(action = action.id(), "fade cancelled");
            return;
        }
        let Some(thing) = action.thing() else {
            return;
        };
        if let Err(err) = thing.set_property("brightness", self.brightness) {
            tracing::warn!(action = action.id(), %err, "fade could not set brightness");
        }
    }
}

fn fade_factory() -> ActionFactory {
    Arc::new(|request: ActionRequest| -> Result<Action, ActionError> {
        let fade: Fade = request.parse_input()?;
        Ok(request.into_action(Arc::new(fade)))
    })
}

fn build_lamp(config: &Config) -> Result<Arc<Thing>, WebThingError> {
    let lamp = Thing::builder()
        .id("urn:dev:ops:my-lamp-1234")
        .title("My Lamp")
        .thing_type("OnOffSwitch")
        .thing_type("Light")
        .description("A web connected lamp")
        .validator(Arc::new(JsonSchemaValidator::new()))
        .action_storage(config.action_storage())
        .event_storage(config.event_storage())
        .build();

    lamp.link_property(
        "on",
        Value::with_forwarder(Some(true), |on: &bool| {
            tracing::info!(on, "lamp switched");
        }),
        json!({
            "@type": "OnOffProperty",
            "title": "On/Off",
            "type": "boolean",
            "description": "Whether the lamp is turned on"
        }),
    )?;
    lamp.link_property(
        "brightness",
        Value::new(50_i64),
        json!({
            "@type": "BrightnessProperty",
            "title": "Brightness",
            "type": "integer",
            "description": "The level of light from 0-100",
            "minimum": 0,
            "maximum": 100,
            "unit": "percent"
        }),
    )?;
    lamp.add_available_action(
        "fade",
        json!({
            "title": "Fade",
            "description": "Fade the lamp to a given level",
            "input": {
                "type": "object",
                "required": ["brightness", "duration"],
                "properties": {
                    "brightness": {"type": "integer", "minimum": 0, "maximum": 100, "unit": "percent"},
                    "duration": {"type": "integer", "minimum": 1, "unit": "milliseconds"}
                }
            }
        }),
        fade_factory(),
    )?;
    lamp.link_event(
        "overheated",
        json!({
            "description": "The lamp has exceeded its safe operating temperature",
            "type": "number",
            "unit": "degree celsius"
        }),
    )?;
    Ok(lamp)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    let bus = InProcessMessageBus::new(config.bus.capacity);
    let lamp = build_lamp(&config).context("building the demo lamp")?;
    bus.attach(&lamp);
    tracing::info!(description = %lamp.as_thing_description(), "thing ready");

    let mut session = ThingSession::open(Arc::clone(&lamp), &bus, ActionRunner::current());
    for request in [
        json!({"messageType": "addEventSubscription", "data": {"overheated": {}}}),
        json!({"messageType": "setProperty", "data": {"on": false, "brightness": 150}}),
        json!({"messageType": "requestAction", "data": {"fade": {"input": {"brightness": 80, "duration": 500}}}}),
    ] {
        for reply in session.handle_text(&request.to_string()) {
            tracing::warn!(reply = %reply.to_json(), "request rejected");
        }
    }
    lamp.emit_event("overheated", Some(json!(102)));

    loop {
        tokio::select! {
            received = session.next_message() => {
                let Some(received) = received else { break };
                tracing::info!(topic = %received.topic, message = %received.message.to_json(), "message");
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for ctrl-c")?;
                tracing::info!("shutting down");
                break;
            }
        }
    }

    session.close();
    Ok(())
}
