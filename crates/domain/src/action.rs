//! Action: a requested, cancellable unit of work on a thing.
//!
//! An action moves through `created → pending → completed`:
//!
//! - `created` when the thing accepts the request,
//! - `pending` when [`Action::start`] is called, right before the body runs,
//! - `completed` once the body returns, whether it ran to the end,
//!   stopped early because it was cancelled or panicked.
//!
//! Each transition is published exactly once, in order, as an
//! `actionStatus` message. [`Action::cancel`] never forces a transition; it
//! raises the [`CancellationToken`] and calls the handler's cancel hook.

mod cancellation;
mod status;

pub use cancellation::CancellationToken;
pub use status::ActionStatus;

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};

use crate::error::ActionError;
use crate::id::{IdGenerator, UuidIds};
use crate::notification::Notifier;
use crate::sync::{lock, read, write};
use crate::thing::Thing;
use crate::time::{Clock, SystemClock, Timestamp, format_timestamp};

/// The behaviour behind an action.
pub trait ActionHandler: Send + Sync {
    /// Run the body. Long-running bodies should watch `token`.
    fn perform(&self, action: &Action, token: &CancellationToken);

    /// Called by [`Action::cancel`] after the token was raised.
    fn cancel(&self, _action: &Action) {}
}

impl<F> ActionHandler for F
where
    F: Fn(&Action, &CancellationToken) + Send + Sync,
{
    fn perform(&self, action: &Action, token: &CancellationToken) {
        self(action, token);
    }
}

/// Builds an action for an accepted request.
pub type ActionFactory = Arc<dyn Fn(ActionRequest) -> Result<Action, ActionError> + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    status: ActionStatus,
    time_completed: Option<Timestamp>,
}

/// A single action instance.
pub struct Action {
    id: String,
    name: String,
    input: Option<Json>,
    href_prefix: RwLock<String>,
    time_requested: Timestamp,
    progress: Mutex<Progress>,
    handler: Arc<dyn ActionHandler>,
    token: CancellationToken,
    notifier: Option<Notifier>,
    clock: Arc<dyn Clock>,
    thing: Weak<Thing>,
}

impl Action {
    /// Create a builder for a standalone [`Action`].
    #[must_use]
    pub fn builder() -> ActionBuilder {
        ActionBuilder::default()
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn input(&self) -> Option<&Json> {
        self.input.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> ActionStatus {
        lock(&self.progress).status
    }

    #[must_use]
    pub fn time_requested(&self) -> Timestamp {
        self.time_requested
    }

    /// Set once the action reached `completed`.
    #[must_use]
    pub fn time_completed(&self) -> Option<Timestamp> {
        lock(&self.progress).time_completed
    }

    /// The thing this action was requested on, if it is still alive.
    #[must_use]
    pub fn thing(&self) -> Option<Arc<Thing>> {
        self.thing.upgrade()
    }

    /// Token raised by [`Action::cancel`].
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// `<prefix>/actions/<name>/<id>`
    #[must_use]
    pub fn href(&self) -> String {
        format!("{}/actions/{}/{}", read(&self.href_prefix), self.name, self.id)
    }

    pub fn set_href_prefix(&self, prefix: impl Into<String>) {
        *write(&self.href_prefix) = prefix.into();
    }

    /// `{"href", "timeRequested", "status", "input"?, "timeCompleted"?}`
    #[must_use]
    pub fn description_body(&self) -> Json {
        let progress = *lock(&self.progress);
        self.body_for(progress)
    }

    /// `{"<name>": {...}}`
    #[must_use]
    pub fn as_action_description(&self) -> Json {
        let mut description = Map::new();
        description.insert(self.name.clone(), self.description_body());
        Json::Object(description)
    }

    fn body_for(&self, progress: Progress) -> Json {
        let mut body = Map::new();
        body.insert("href".to_string(), Json::String(self.href()));
        body.insert(
            "timeRequested".to_string(),
            Json::String(format_timestamp(&self.time_requested)),
        );
        body.insert(
            "status".to_string(),
            Json::String(progress.status.to_string()),
        );
        if let Some(input) = &self.input {
            body.insert("input".to_string(), input.clone());
        }
        if let Some(completed) = progress.time_completed {
            body.insert(
                "timeCompleted".to_string(),
                Json::String(format_timestamp(&completed)),
            );
        }
        Json::Object(body)
    }

    /// Publish the current state as `actionStatus`.
    pub fn notify(&self) {
        let body = self.description_body();
        self.publish(body);
    }

    fn publish(&self, body: Json) {
        if let Some(notifier) = &self.notifier {
            notifier.action_notify(&self.name, body);
        }
    }

    /// Move to `pending`, run the body on the calling thread, then move to
    /// `completed`. A panicking body still completes the action; the panic
    /// is resumed afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::AlreadyStarted`] unless the action is still
    /// `created`.
    pub fn start(&self) -> Result<(), ActionError> {
        let pending = {
            let mut progress = lock(&self.progress);
            if progress.status != ActionStatus::Created {
                return Err(ActionError::AlreadyStarted {
                    id: self.id.clone(),
                });
            }
            progress.status = ActionStatus::Pending;
            *progress
        };
        tracing::debug!(action = %self.name, id = %self.id, "action pending");
        self.publish(self.body_for(pending));

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.handler.perform(self, &self.token);
        }));

        self.finish();
        if let Err(panic) = outcome {
            resume_unwind(panic);
        }
        Ok(())
    }

    fn finish(&self) {
        let completed = {
            let mut progress = lock(&self.progress);
            progress.status = ActionStatus::Completed;
            progress.time_completed = Some(self.clock.now());
            *progress
        };
        tracing::debug!(
            action = %self.name,
            id = %self.id,
            cancelled = self.token.is_cancelled(),
            "action completed"
        );
        self.publish(self.body_for(completed));
    }

    /// Ask the body to stop. Does not change the status.
    pub fn cancel(&self) {
        self.token.cancel();
        self.handler.cancel(self);
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("input", &self.input)
            .field("status", &self.status())
            .field("time_requested", &self.time_requested)
            .finish_non_exhaustive()
    }
}

/// An accepted request, handed to the [`ActionFactory`] of its name.
pub struct ActionRequest {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) input: Option<Json>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) notifier: Option<Notifier>,
    pub(crate) thing: Weak<Thing>,
}

impl ActionRequest {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn input(&self) -> Option<&Json> {
        self.input.as_ref()
    }

    /// The input, for actions that cannot run without one.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::MissingInput`] when no input (or `null`) was
    /// supplied.
    pub fn require_input(&self) -> Result<&Json, ActionError> {
        self.input
            .as_ref()
            .filter(|input| !input.is_null())
            .ok_or_else(|| ActionError::MissingInput(self.name.clone()))
    }

    /// Deserialize the input into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::MissingInput`] when there is no input and
    /// [`ActionError::Construction`] when it does not have the shape of `T`.
    pub fn parse_input<T: DeserializeOwned>(&self) -> Result<T, ActionError> {
        let input = self.require_input()?;
        serde_json::from_value(input.clone()).map_err(|err| ActionError::Construction {
            name: self.name.clone(),
            reason: err.to_string(),
        })
    }

    /// Turn the request into an action run by `handler`.
    #[must_use]
    pub fn into_action(self, handler: Arc<dyn ActionHandler>) -> Action {
        let time_requested = self.clock.now();
        Action {
            id: self.id,
            name: self.name,
            input: self.input,
            href_prefix: RwLock::new(String::new()),
            time_requested,
            progress: Mutex::new(Progress::default()),
            handler,
            token: CancellationToken::new(),
            notifier: self.notifier,
            clock: self.clock,
            thing: self.thing,
        }
    }
}

impl fmt::Debug for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRequest")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}

/// Step-by-step builder for an [`Action`] that is not owned by a thing.
#[derive(Default)]
pub struct ActionBuilder {
    id: Option<String>,
    name: Option<String>,
    input: Option<Json>,
    handler: Option<Arc<dyn ActionHandler>>,
    clock: Option<Arc<dyn Clock>>,
    notifier: Option<Notifier>,
}

impl ActionBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn input(mut self, input: Json) -> Self {
        self.input = Some(input);
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: impl ActionHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Consume the builder. Missing ids are generated, a missing handler
    /// does nothing.
    #[must_use]
    pub fn build(self) -> Action {
        let request = ActionRequest {
            id: self.id.unwrap_or_else(|| UuidIds.next_id()),
            name: self.name.unwrap_or_default(),
            input: self.input,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            notifier: self.notifier,
            thing: Weak::new(),
        };
        let handler: Arc<dyn ActionHandler> = match self.handler {
            Some(handler) => handler,
            None => Arc::new(|_: &Action, _: &CancellationToken| {}),
        };
        request.into_action(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::time::FixedClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::parse("2023-02-17T01:23:45Z").unwrap())
    }

    fn statuses(notifier: &Notifier) -> Arc<Mutex<Vec<Json>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        notifier.add_observer(Arc::new(move |_: &str, message: &Message| {
            if let Message::ActionStatus(data) = message {
                sink.lock().unwrap().push(data["fade"].clone());
            }
        }));
        seen
    }

    #[test]
    fn should_describe_created_action() {
        let action = Action::builder()
            .id("42")
            .name("fade")
            .input(json!({"level": 10}))
            .clock(clock())
            .build();
        action.set_href_prefix("/things/lamp");

        assert_eq!(
            action.as_action_description(),
            json!({"fade": {
                "href": "/things/lamp/actions/fade/42",
                "timeRequested": "2023-02-17T01:23:45.000+00:00",
                "status": "created",
                "input": {"level": 10}
            }})
        );
        assert!(action.time_completed().is_none());
    }

    #[test]
    fn should_publish_pending_then_completed_on_start() {
        let notifier = Notifier::new("lamp");
        let seen = statuses(&notifier);
        let action = Action::builder()
            .id("1")
            .name("fade")
            .clock(clock())
            .notifier(notifier)
            .build();

        action.start().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0]["status"], json!("pending"));
        assert!(seen[0].get("timeCompleted").is_none());
        assert_eq!(seen[1]["status"], json!("completed"));
        assert_eq!(seen[1]["timeCompleted"], json!("2023-02-17T01:23:45.000+00:00"));
        assert_eq!(action.status(), ActionStatus::Completed);
    }

    #[test]
    fn should_complete_and_resume_panic_of_body() {
        let notifier = Notifier::new("lamp");
        let seen = statuses(&notifier);
        let action = Action::builder()
            .name("fade")
            .clock(clock())
            .notifier(notifier)
            .handler(|action: &Action, _: &CancellationToken| {
                if action.name() == "fade" {
                    panic!("bulb burnt out");
                }
            })
            .build();

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| action.start()));

        assert!(outcome.is_err());
        assert_eq!(action.status(), ActionStatus::Completed);
        assert!(action.time_completed().is_some());
        let statuses: Vec<Json> = seen.lock().unwrap().iter().map(|s| s["status"].clone()).collect();
        assert_eq!(statuses, vec![json!("pending"), json!("completed")]);
    }

    #[test]
    fn should_report_pending_while_body_runs() {
        let observed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&observed);
        let action = Action::builder()
            .name("fade")
            .handler(move |action: &Action, _: &CancellationToken| {
                *sink.lock().unwrap() = Some((action.status(), action.time_completed()));
            })
            .build();

        action.start().unwrap();

        assert_eq!(
            *observed.lock().unwrap(),
            Some((ActionStatus::Pending, None))
        );
    }

    #[test]
    fn should_refuse_second_start() {
        let action = Action::builder().id("7").name("fade").build();
        action.start().unwrap();
        assert_eq!(
            action.start().unwrap_err(),
            ActionError::AlreadyStarted { id: "7".to_string() }
        );
    }

    #[test]
    fn should_call_cancel_hook_without_changing_status() {
        struct Hooked(Arc<AtomicBool>);
        impl ActionHandler for Hooked {
            fn perform(&self, _action: &Action, _token: &CancellationToken) {}
            fn cancel(&self, _action: &Action) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        let hooked = Arc::new(AtomicBool::new(false));
        let action = Action::builder()
            .name("fade")
            .handler(Hooked(Arc::clone(&hooked)))
            .build();

        action.cancel();

        assert!(hooked.load(Ordering::SeqCst));
        assert!(action.cancellation_token().is_cancelled());
        assert_eq!(action.status(), ActionStatus::Created);
    }

    #[test]
    fn should_complete_when_body_stops_on_cancel() {
        let action = Arc::new(
            Action::builder()
                .name("fade")
                .handler(|_: &Action, token: &CancellationToken| {
                    let _ = token.sleep(Duration::from_secs(60));
                })
                .build(),
        );
        let running = Arc::clone(&action);
        let handle = std::thread::spawn(move || running.start());

        while action.status() != ActionStatus::Pending {
            std::thread::yield_now();
        }
        action.cancel();
        handle.join().unwrap().unwrap();

        assert_eq!(action.status(), ActionStatus::Completed);
    }

    #[test]
    fn should_require_input_when_asked() {
        let request = ActionRequest {
            id: "1".to_string(),
            name: "fade".to_string(),
            input: Some(Json::Null),
            clock: clock(),
            notifier: None,
            thing: Weak::new(),
        };
        assert_eq!(
            request.require_input().unwrap_err(),
            ActionError::MissingInput("fade".to_string())
        );
    }

    #[test]
    fn should_parse_typed_input_or_refuse_construction() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct Fade {
            level: u8,
        }
        let request = |input: Json| ActionRequest {
            id: "1".to_string(),
            name: "fade".to_string(),
            input: Some(input),
            clock: clock(),
            notifier: None,
            thing: Weak::new(),
        };

        assert_eq!(
            request(json!({"level": 7})).parse_input::<Fade>().unwrap(),
            Fade { level: 7 }
        );
        assert!(matches!(
            request(json!({"level": "high"})).parse_input::<Fade>(),
            Err(ActionError::Construction { name, .. }) if name == "fade"
        ));
        assert_eq!(
            request(Json::Null).parse_input::<Fade>().unwrap_err(),
            ActionError::MissingInput("fade".to_string())
        );
    }

    #[test]
    fn should_have_no_thing_when_standalone() {
        let action = Action::builder().name("fade").build();
        assert!(action.thing().is_none());
    }
}
