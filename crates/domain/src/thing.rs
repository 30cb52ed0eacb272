//! Thing: the aggregate root exposed to transports.
//!
//! A thing owns its properties, the per-name action histories and a single
//! event history. Everything it publishes goes through its [`Notifier`] to
//! the registered message observers:
//!
//! | topic | message |
//! |-------|---------|
//! | `<id>/properties` | `propertyStatus` on every property change |
//! | `<id>/actions` | `actionStatus` on every action transition |
//! | `<id>/events/<name>` | `event` for registered event names |
//!
//! All methods take `&self`; state is guarded per collection and no lock is
//! held while observers, validators or action factories run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use serde_json::{Map, Value as Json, json};

use crate::action::{Action, ActionFactory, ActionHandler, ActionRequest};
use crate::error::{ActionError, EventError, PropertyError};
use crate::event::Event;
use crate::id::{IdGenerator, UuidIds};
use crate::message::Message;
use crate::notification::Notifier;
use crate::property::{Property, PropertyCell, PropertyType, PropertyValue};
use crate::storage::{HistoryStore, RemovableRingBuffer, RingBuffer, StorageConfig};
use crate::sync::{read, write};
use crate::time::{Clock, SystemClock};
use crate::validation::{AcceptAll, SchemaValidator};

/// Default `@context` of a thing description.
pub const WEBTHINGS_IO_CONTEXT: &str = "https://webthings.io/schemas";

/// Actions kept for one action name.
pub type ActionHistory = HistoryStore<RemovableRingBuffer<Arc<Action>>>;

/// Events kept for one thing.
pub type EventHistory = HistoryStore<RingBuffer<Arc<Event>>>;

struct AvailableAction {
    metadata: Json,
    factory: ActionFactory,
}

/// A device exposed as properties, actions and events.
pub struct Thing {
    id: String,
    title: String,
    types: Vec<String>,
    description: String,
    context: RwLock<String>,
    href_prefix: RwLock<String>,
    ui_href: RwLock<Option<String>>,
    properties: RwLock<BTreeMap<String, Arc<Property>>>,
    available_actions: RwLock<BTreeMap<String, AvailableAction>>,
    action_storage: RwLock<StorageConfig>,
    actions: RwLock<BTreeMap<String, Arc<ActionHistory>>>,
    available_events: RwLock<BTreeMap<String, Json>>,
    events: RwLock<Arc<EventHistory>>,
    notifier: Notifier,
    validator: Arc<dyn SchemaValidator>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    me: Weak<Thing>,
}

impl Thing {
    /// Create a builder for a [`Thing`].
    #[must_use]
    pub fn builder() -> ThingBuilder {
        ThingBuilder::default()
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn types(&self) -> &[String] {
        &self.types
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn context(&self) -> String {
        read(&self.context).clone()
    }

    pub fn set_context(&self, context: impl Into<String>) {
        *write(&self.context) = context.into();
    }

    /// The href prefix, or `/` when none is set.
    #[must_use]
    pub fn get_href(&self) -> String {
        let prefix = read(&self.href_prefix);
        if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.clone()
        }
    }

    /// Set the prefix of every href of this thing, its properties and its
    /// stored actions.
    pub fn set_href_prefix(&self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        *write(&self.href_prefix) = prefix.clone();
        for property in read(&self.properties).values() {
            property.set_href_prefix(prefix.clone());
        }
        for store in self.action_stores() {
            for action in store.snapshot() {
                action.set_href_prefix(prefix.clone());
            }
        }
    }

    #[must_use]
    pub fn ui_href(&self) -> Option<String> {
        read(&self.ui_href).clone()
    }

    /// Advertise a UI through an `alternate` link in the description.
    pub fn set_ui_href(&self, href: impl Into<String>) {
        *write(&self.ui_href) = Some(href.into());
    }

    /// Clock used for action and event timestamps.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Register an observer for every message this thing publishes.
    pub fn add_message_observer(&self, observer: impl Fn(&str, &Message) + Send + Sync + 'static) {
        self.notifier.add_observer(Arc::new(observer));
    }

    /// The full thing description.
    #[must_use]
    pub fn as_thing_description(&self) -> Json {
        let prefix = read(&self.href_prefix).clone();

        let mut actions = Map::new();
        for (name, available) in read(&self.available_actions).iter() {
            let mut entry = available.metadata.clone();
            entry["links"] = json!([{"rel": "action", "href": format!("{prefix}/actions/{name}")}]);
            actions.insert(name.clone(), entry);
        }

        let mut events = Map::new();
        for (name, metadata) in read(&self.available_events).iter() {
            let mut entry = metadata.clone();
            entry["links"] = json!([{"rel": "event", "href": format!("{prefix}/events/{name}")}]);
            events.insert(name.clone(), entry);
        }

        let mut links = vec![
            json!({"rel": "properties", "href": format!("{prefix}/properties")}),
            json!({"rel": "actions", "href": format!("{prefix}/actions")}),
            json!({"rel": "events", "href": format!("{prefix}/events")}),
        ];
        if let Some(ui_href) = self.ui_href() {
            links.push(json!({"rel": "alternate", "mediaType": "text/html", "href": ui_href}));
        }

        json!({
            "id": self.id,
            "title": self.title,
            "@context": self.context(),
            "@type": self.types,
            "properties": self.get_property_descriptions(),
            "actions": actions,
            "events": events,
            "description": self.description,
            "links": links,
        })
    }

    /// Register `property`, replacing any property of the same name.
    pub fn add_property(&self, property: Property) -> Arc<Property> {
        property.set_href_prefix(read(&self.href_prefix).clone());
        property.attach(self.notifier.clone(), &self.validator);
        let property = Arc::new(property);
        let replaced = write(&self.properties)
            .insert(property.name().to_string(), Arc::clone(&property));
        if let Some(replaced) = replaced {
            replaced.detach();
        }
        property
    }

    /// Create and register a property backed by `cell`.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::MetadataNotObject`] when `metadata` is not a
    /// JSON object.
    pub fn link_property(
        &self,
        name: impl Into<String>,
        cell: impl Into<PropertyCell>,
        metadata: Json,
    ) -> Result<Arc<Property>, PropertyError> {
        Ok(self.add_property(Property::new(name, cell, metadata)?))
    }

    #[must_use]
    pub fn find_property(&self, name: &str) -> Option<Arc<Property>> {
        read(&self.properties).get(name).cloned()
    }

    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        read(&self.properties).contains_key(name)
    }

    /// Unregister a property. It stops publishing changes.
    pub fn remove_property(&self, name: &str) -> Option<Arc<Property>> {
        let removed = write(&self.properties).remove(name);
        if let Some(property) = &removed {
            property.detach();
        }
        removed
    }

    /// The value of property `name` as `T`, `Ok(None)` when the property
    /// does not exist or its value is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::TypeMismatch`] when the property is not
    /// backed by a `T`.
    pub fn property<T: PropertyType>(&self, name: &str) -> Result<Option<T>, PropertyError> {
        match self.find_property(name) {
            Some(property) => property.typed_value::<T>(),
            None => Ok(None),
        }
    }

    /// Write a property on behalf of a client. Unknown names are ignored.
    ///
    /// # Errors
    ///
    /// Propagates the [`PropertyError`] of [`Property::set_value`].
    pub fn set_property(
        &self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<(), PropertyError> {
        let Some(property) = self.find_property(name) else {
            tracing::debug!(thing = %self.id, property = name, "ignoring write to unknown property");
            return Ok(());
        };
        property.set_value(value)
    }

    /// Snapshot `{name: value}` of all properties, `null` for unknown values.
    #[must_use]
    pub fn get_properties(&self) -> Json {
        let properties: Map<String, Json> = read(&self.properties)
            .iter()
            .map(|(name, property)| (name.clone(), property.value_json()))
            .collect();
        Json::Object(properties)
    }

    /// `{name: description}` of all properties.
    #[must_use]
    pub fn get_property_descriptions(&self) -> Json {
        let descriptions: Map<String, Json> = read(&self.properties)
            .iter()
            .map(|(name, property)| (name.clone(), property.as_property_description()))
            .collect();
        Json::Object(descriptions)
    }

    /// Register action `name`, built by `factory` on each accepted request.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::MetadataNotObject`] when `metadata` is not a
    /// JSON object.
    pub fn add_available_action(
        &self,
        name: impl Into<String>,
        metadata: Json,
        factory: ActionFactory,
    ) -> Result<(), ActionError> {
        if !metadata.is_object() {
            return Err(ActionError::MetadataNotObject);
        }
        let name = name.into();
        let config = *read(&self.action_storage);
        write(&self.actions).insert(name.clone(), Arc::new(ActionHistory::new(config)));
        write(&self.available_actions).insert(name, AvailableAction { metadata, factory });
        Ok(())
    }

    /// Register action `name` run by `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::MetadataNotObject`] when `metadata` is not a
    /// JSON object.
    pub fn link_action(
        &self,
        name: impl Into<String>,
        metadata: Json,
        handler: impl ActionHandler + 'static,
    ) -> Result<(), ActionError> {
        let handler: Arc<dyn ActionHandler> = Arc::new(handler);
        let factory: ActionFactory = Arc::new(
            move |request: ActionRequest| -> Result<Action, ActionError> {
                Ok(request.into_action(Arc::clone(&handler)))
            },
        );
        self.add_available_action(name, metadata, factory)
    }

    /// Accept a request for action `name`.
    ///
    /// The new action is announced as `created` and stored, but not started.
    /// Returns `None` when the name is not registered, the input does not
    /// match the declared `input` schema or the factory fails.
    pub fn perform_action(&self, name: &str, input: Option<Json>) -> Option<Arc<Action>> {
        let (schema, factory) = {
            let available = read(&self.available_actions);
            let Some(action_type) = available.get(name) else {
                tracing::debug!(thing = %self.id, action = name, "unknown action requested");
                return None;
            };
            (
                action_type.metadata.get("input").cloned(),
                Arc::clone(&action_type.factory),
            )
        };

        if let Some(schema) = schema {
            let value = input.clone().unwrap_or(Json::Null);
            if let Err(err) = self.validator.validate(&value, &schema) {
                tracing::debug!(thing = %self.id, action = name, %err, "invalid action input");
                return None;
            }
        }

        let request = ActionRequest {
            id: self.ids.next_id(),
            name: name.to_string(),
            input,
            clock: Arc::clone(&self.clock),
            notifier: Some(self.notifier.clone()),
            thing: self.me.clone(),
        };
        let action = match factory(request) {
            Ok(action) => Arc::new(action),
            Err(err) => {
                tracing::debug!(thing = %self.id, action = name, %err, "action construction failed");
                return None;
            }
        };

        action.set_href_prefix(read(&self.href_prefix).clone());
        action.notify();
        self.action_store(name).add(Arc::clone(&action));
        Some(action)
    }

    #[must_use]
    pub fn get_action(&self, name: &str, id: &str) -> Option<Arc<Action>> {
        let store = read(&self.actions).get(name).cloned()?;
        store.find(|action| action.id() == id)
    }

    /// Cancel and drop an action. Returns `false` when it was not found.
    pub fn remove_action(&self, name: &str, id: &str) -> bool {
        let Some(action) = self.get_action(name, id) else {
            return false;
        };
        action.cancel();
        let store = read(&self.actions).get(name).cloned();
        if let Some(store) = store {
            store.remove_if(|stored| stored.id() == id);
        }
        true
    }

    /// Descriptions of stored actions, all names or only `name`.
    #[must_use]
    pub fn get_action_descriptions(&self, name: Option<&str>) -> Json {
        let stores: Vec<Arc<ActionHistory>> = match name {
            Some(name) => read(&self.actions).get(name).cloned().into_iter().collect(),
            None => self.action_stores(),
        };
        Json::Array(
            stores
                .iter()
                .flat_map(|store| store.snapshot())
                .map(|action| action.as_action_description())
                .collect(),
        )
    }

    /// Replace the action store configuration. Existing histories are
    /// emptied.
    pub fn configure_action_storage(&self, config: StorageConfig) {
        *write(&self.action_storage) = config;
        for store in write(&self.actions).values_mut() {
            *store = Arc::new(ActionHistory::new(config));
        }
    }

    fn action_stores(&self) -> Vec<Arc<ActionHistory>> {
        read(&self.actions).values().cloned().collect()
    }

    fn action_store(&self, name: &str) -> Arc<ActionHistory> {
        if let Some(store) = read(&self.actions).get(name) {
            return Arc::clone(store);
        }
        let config = *read(&self.action_storage);
        Arc::clone(
            write(&self.actions)
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(ActionHistory::new(config))),
        )
    }

    /// Register event `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::MetadataNotObject`] when `metadata` is not a
    /// JSON object.
    pub fn add_available_event(
        &self,
        name: impl Into<String>,
        metadata: Json,
    ) -> Result<(), EventError> {
        if !metadata.is_object() {
            return Err(EventError::MetadataNotObject);
        }
        write(&self.available_events).insert(name.into(), metadata);
        Ok(())
    }

    /// Same as [`Thing::add_available_event`].
    ///
    /// # Errors
    ///
    /// Returns [`EventError::MetadataNotObject`] when `metadata` is not a
    /// JSON object.
    pub fn link_event(&self, name: impl Into<String>, metadata: Json) -> Result<(), EventError> {
        self.add_available_event(name, metadata)
    }

    #[must_use]
    pub fn has_available_event(&self, name: &str) -> bool {
        read(&self.available_events).contains_key(name)
    }

    /// Store and publish `event`. Events of unregistered names are dropped;
    /// returns whether the event was kept.
    pub fn add_event(&self, event: Arc<Event>) -> bool {
        if !self.has_available_event(event.name()) {
            tracing::debug!(thing = %self.id, event = event.name(), "dropping unregistered event");
            return false;
        }
        let events = Arc::clone(&read(&self.events));
        events.add(Arc::clone(&event));
        self.notifier
            .event_notify(event.name(), event.description_body());
        true
    }

    /// Create an event stamped by this thing's clock and add it.
    pub fn emit_event(&self, name: impl Into<String>, data: Option<Json>) -> Arc<Event> {
        let event = Arc::new(Event::new(
            self.id.clone(),
            name,
            data,
            self.clock.now(),
        ));
        self.add_event(Arc::clone(&event));
        event
    }

    /// Descriptions of stored events, all names or only `name`.
    #[must_use]
    pub fn get_event_descriptions(&self, name: Option<&str>) -> Json {
        let events = Arc::clone(&read(&self.events));
        Json::Array(
            events
                .snapshot()
                .iter()
                .filter(|event| name.is_none_or(|name| event.name() == name))
                .map(|event| event.as_event_description())
                .collect(),
        )
    }

    /// Replace the event store. Existing events are dropped.
    pub fn configure_event_storage(&self, config: StorageConfig) {
        *write(&self.events) = Arc::new(EventHistory::new(config));
    }
}

impl fmt::Debug for Thing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thing")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("types", &self.types)
            .finish_non_exhaustive()
    }
}

/// Step-by-step builder for [`Thing`].
#[derive(Default)]
pub struct ThingBuilder {
    id: Option<String>,
    title: Option<String>,
    types: Vec<String>,
    description: Option<String>,
    context: Option<String>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    validator: Option<Arc<dyn SchemaValidator>>,
    action_storage: Option<StorageConfig>,
    event_storage: Option<StorageConfig>,
}

impl ThingBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add a semantic `@type`.
    #[must_use]
    pub fn thing_type(mut self, thing_type: impl Into<String>) -> Self {
        self.types.push(thing_type.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Generator for action ids and for a missing thing id.
    #[must_use]
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Validator for property writes and action inputs.
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn action_storage(mut self, config: StorageConfig) -> Self {
        self.action_storage = Some(config);
        self
    }

    #[must_use]
    pub fn event_storage(mut self, config: StorageConfig) -> Self {
        self.event_storage = Some(config);
        self
    }

    /// Consume the builder. An empty id becomes `uuid:<generated>`, an
    /// empty title becomes the id.
    #[must_use]
    pub fn build(self) -> Arc<Thing> {
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UuidIds),
        };
        let id = match self.id {
            Some(id) if !id.is_empty() => id,
            _ => format!("uuid:{}", ids.next_id()),
        };
        let title = match self.title {
            Some(title) if !title.is_empty() => title,
            _ => id.clone(),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let validator: Arc<dyn SchemaValidator> = match self.validator {
            Some(validator) => validator,
            None => Arc::new(AcceptAll),
        };
        let action_storage = self.action_storage.unwrap_or_else(StorageConfig::actions);
        let event_storage = self.event_storage.unwrap_or_else(StorageConfig::events);

        Arc::new_cyclic(|me| Thing {
            notifier: Notifier::new(&id),
            id,
            title,
            types: self.types,
            description: self.description.unwrap_or_default(),
            context: RwLock::new(
                self.context
                    .unwrap_or_else(|| WEBTHINGS_IO_CONTEXT.to_string()),
            ),
            href_prefix: RwLock::new(String::new()),
            ui_href: RwLock::new(None),
            properties: RwLock::new(BTreeMap::new()),
            available_actions: RwLock::new(BTreeMap::new()),
            action_storage: RwLock::new(action_storage),
            actions: RwLock::new(BTreeMap::new()),
            available_events: RwLock::new(BTreeMap::new()),
            events: RwLock::new(Arc::new(EventHistory::new(event_storage))),
            validator,
            clock,
            ids,
            me: me.clone(),
        })
    }
}
