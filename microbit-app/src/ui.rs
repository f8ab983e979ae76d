//! Page model: named text controls and buttons, plus the alert path
//!
//! Every write to a control and every alert is broadcast as a [`UiEvent`] so
//! a front-end can render changes as they happen.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tokio::sync::broadcast;

/// Control ids of the demo page
pub mod ids {
    pub const CONNECTION_STATUS: &str = "connection-status";
    pub const MODEL_NUMBER: &str = "model-number";
    pub const FIRMWARE_REVISION: &str = "firmware-revision";
    pub const BUTTON_STATUS: &str = "button-status";
    pub const MESSAGE: &str = "message";
    pub const REQUEST: &str = "request";
    pub const RESPONSE: &str = "response";
    pub const LED_MATRIX: &str = "led-matrix";
    pub const TEST_INSTRUCTION: &str = "test-instruction";

    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const SHOW: &str = "show";
    pub const SEND: &str = "send";
    pub const CLEAR_MATRIX: &str = "clear-matrix";
    pub const REFRESH_MATRIX: &str = "refresh-matrix";
    pub const WRITE_MATRIX: &str = "write-matrix";
    pub const TEST_START: &str = "test-start";
    pub const TEST_CANCEL: &str = "test-cancel";

    pub const FIELDS: &[&str] = &[
        CONNECTION_STATUS,
        MODEL_NUMBER,
        FIRMWARE_REVISION,
        BUTTON_STATUS,
        MESSAGE,
        REQUEST,
        RESPONSE,
        LED_MATRIX,
        TEST_INSTRUCTION,
    ];

    pub const BUTTONS: &[&str] = &[
        CONNECT,
        DISCONNECT,
        SHOW,
        SEND,
        CLEAR_MATRIX,
        REFRESH_MATRIX,
        WRITE_MATRIX,
        TEST_START,
        TEST_CANCEL,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Field { id: String, text: String },
    Alert(String),
}

type Listener = Arc<dyn Fn() + Send + Sync>;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// One named element of the page
pub struct Control {
    id: String,
    text: Mutex<String>,
    listeners: Mutex<Vec<Listener>>,
    events: broadcast::Sender<UiEvent>,
}

impl Control {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> String {
        lock(&self.text).clone()
    }

    pub fn set_text(&self, text: &str) {
        *lock(&self.text) = text.to_string();
        tracing::trace!(field = %self.id, text, "field updated");
        // no receivers is fine
        let _ = self.events.send(UiEvent::Field { id: self.id.clone(), text: text.to_string() });
    }

    fn add_listener(&self, listener: Listener) {
        lock(&self.listeners).push(listener);
    }

    fn click(&self) {
        let listeners = lock(&self.listeners).clone();
        for listener in listeners {
            listener();
        }
    }
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Control").field("id", &self.id).field("text", &self.text()).finish()
    }
}

/// Alerts kept for [`Page::alerts`]; older ones are dropped
pub const MAX_ALERTS: usize = 64;

/// The set of controls a controller drives
#[derive(Debug)]
pub struct Page {
    controls: HashMap<String, Arc<Control>>,
    events: broadcast::Sender<UiEvent>,
    alerts: Mutex<VecDeque<String>>,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    pub fn new() -> Self {
        Self::with_controls(&[])
    }

    pub fn with_controls(ids: &[&str]) -> Self {
        let (events, _) = broadcast::channel(256);
        let controls = ids
            .iter()
            .map(|id| {
                let control = Control {
                    id: id.to_string(),
                    text: Mutex::new(String::new()),
                    listeners: Mutex::new(Vec::new()),
                    events: events.clone(),
                };
                (id.to_string(), Arc::new(control))
            })
            .collect();
        Self { controls, events, alerts: Mutex::new(VecDeque::new()) }
    }

    /// Every field and button of the demo
    pub fn standard() -> Self {
        let all: Vec<&str> = ids::FIELDS.iter().chain(ids::BUTTONS).copied().collect();
        Self::with_controls(&all)
    }

    pub fn control(&self, id: &str) -> Option<Arc<Control>> {
        self.controls.get(id).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    /// The single user-facing error path
    pub fn alert(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        {
            let mut alerts = lock(&self.alerts);
            if alerts.len() == MAX_ALERTS {
                alerts.pop_front();
            }
            alerts.push_back(message.clone());
        }
        let _ = self.events.send(UiEvent::Alert(message));
    }

    /// The most recent alerts, oldest first
    pub fn alerts(&self) -> Vec<String> {
        lock(&self.alerts).iter().cloned().collect()
    }

    /// Text of `id`, empty if there is no such control
    pub fn text(&self, id: &str) -> String {
        self.controls.get(id).map(|c| c.text()).unwrap_or_default()
    }

    /// Returns false if there is no such control
    pub fn set_text(&self, id: &str, text: &str) -> bool {
        match self.controls.get(id) {
            Some(control) => {
                control.set_text(text);
                true
            }
            None => false,
        }
    }

    /// Run the click listeners of `id`. Returns false if there is no such control.
    pub fn click(&self, id: &str) -> bool {
        match self.controls.get(id) {
            Some(control) => {
                control.click();
                true
            }
            None => false,
        }
    }
}

/// Lazily resolved reference to one control. The lookup happens at most once.
#[derive(Clone)]
struct Binding {
    page: Arc<Page>,
    id: &'static str,
    control: Arc<OnceLock<Option<Arc<Control>>>>,
}

impl Binding {
    fn new(page: Arc<Page>, id: &'static str) -> Self {
        Self { page, id, control: Arc::new(OnceLock::new()) }
    }

    fn get(&self) -> Option<&Arc<Control>> {
        self.control
            .get_or_init(|| {
                let control = self.page.control(self.id);
                if control.is_none() {
                    tracing::warn!(field = self.id, "no such control on the page");
                }
                control
            })
            .as_ref()
    }
}

/// A text field bound by id
#[derive(Clone)]
pub struct TextField {
    binding: Binding,
}

impl TextField {
    pub fn new(page: Arc<Page>, id: &'static str) -> Self {
        Self { binding: Binding::new(page, id) }
    }

    pub fn id(&self) -> &'static str {
        self.binding.id
    }

    /// Current text, empty when the control is missing
    pub fn text(&self) -> String {
        self.binding.get().map(|c| c.text()).unwrap_or_default()
    }

    pub fn set_text(&self, text: &str) {
        if let Some(control) = self.binding.get() {
            control.set_text(text);
        }
    }

    pub fn clear(&self) {
        self.set_text("");
    }
}

impl std::fmt::Debug for TextField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TextField").field(&self.binding.id).finish()
    }
}

/// A clickable button bound by id
#[derive(Clone)]
pub struct ActionButton {
    binding: Binding,
}

impl ActionButton {
    pub fn new(page: Arc<Page>, id: &'static str) -> Self {
        Self { binding: Binding::new(page, id) }
    }

    pub fn on_click<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if let Some(control) = self.binding.get() {
            control.add_listener(Arc::new(listener));
        }
    }

    pub fn click(&self) {
        if let Some(control) = self.binding.get() {
            control.click();
        }
    }
}
