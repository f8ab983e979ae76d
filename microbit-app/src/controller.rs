//! Connection lifecycle and the feature handlers behind each page button

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use microbit_gatt::{
    Bluetooth, CharacteristicHandle, GattError, GattLink, GattServerFacade, RequestDeviceOptions,
    Subscription, profile_services,
};
use microbit_proto::{
    Button, ButtonState, LedMatrix, PROFILE, parse_scrolling_delay, profile, scroll_duration,
    scrolling_delay_bytes, uart_request_payload,
};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{Instant, interval_at};

use crate::buttons::ButtonPanel;
use crate::config::ControllerConfig;
use crate::lifecycle::{ConnectionState, status};
use crate::selftest::{SelfTest, default_steps};
use crate::ui::{ActionButton, Page, TextField, ids, lock};
use crate::ControllerError;

/// How often a connected link is checked for loss
pub const LINK_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// What a page button asks the controller to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Connect,
    Disconnect,
    ShowMessage,
    SendRequest,
    ClearMatrix,
    RefreshMatrix,
    WriteMatrix,
    StartSelfTest,
    CancelSelfTest,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::Connect,
        Action::Disconnect,
        Action::ShowMessage,
        Action::SendRequest,
        Action::ClearMatrix,
        Action::RefreshMatrix,
        Action::WriteMatrix,
        Action::StartSelfTest,
        Action::CancelSelfTest,
    ];

    pub fn button_id(self) -> &'static str {
        match self {
            Action::Connect => ids::CONNECT,
            Action::Disconnect => ids::DISCONNECT,
            Action::ShowMessage => ids::SHOW,
            Action::SendRequest => ids::SEND,
            Action::ClearMatrix => ids::CLEAR_MATRIX,
            Action::RefreshMatrix => ids::REFRESH_MATRIX,
            Action::WriteMatrix => ids::WRITE_MATRIX,
            Action::StartSelfTest => ids::TEST_START,
            Action::CancelSelfTest => ids::TEST_CANCEL,
        }
    }
}

#[derive(Clone)]
struct Fields {
    status: TextField,
    model: TextField,
    firmware: TextField,
    buttons: TextField,
    message: TextField,
    request: TextField,
    response: TextField,
    matrix: TextField,
    instruction: TextField,
}

impl Fields {
    fn bind(page: &Arc<Page>) -> Self {
        let field = |id| TextField::new(page.clone(), id);
        Self {
            status: field(ids::CONNECTION_STATUS),
            model: field(ids::MODEL_NUMBER),
            firmware: field(ids::FIRMWARE_REVISION),
            buttons: field(ids::BUTTON_STATUS),
            message: field(ids::MESSAGE),
            request: field(ids::REQUEST),
            response: field(ids::RESPONSE),
            matrix: field(ids::LED_MATRIX),
            instruction: field(ids::TEST_INSTRUCTION),
        }
    }
}

/// Everything owned by one connection. Dropping it stops notification
/// delivery and any pending delayed write.
struct Session {
    server: GattServerFacade,
    buttons: Arc<Mutex<ButtonPanel>>,
    subscriptions: Mutex<Vec<Subscription>>,
    timers: Mutex<Vec<AbortHandle>>,
}

impl Session {
    fn new(server: GattServerFacade) -> Self {
        Self {
            server,
            buttons: Arc::default(),
            subscriptions: Mutex::new(Vec::new()),
            timers: Mutex::new(Vec::new()),
        }
    }

    fn characteristic(&self, uuid: &'static str) -> Result<&CharacteristicHandle, ControllerError> {
        self.server.characteristic_by_str(uuid).ok_or(ControllerError::Unresolved(uuid))
    }

    fn add_timer(&self, handle: AbortHandle) {
        let mut timers = lock(&self.timers);
        timers.retain(|t| !t.is_finished());
        timers.push(handle);
    }

    fn close(&self) {
        for timer in lock(&self.timers).drain(..) {
            timer.abort();
        }
        lock(&self.subscriptions).clear();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

type SessionSlot = Mutex<Option<Arc<Session>>>;

/// Take `session` out of `slot` if it is still the current one and mark
/// the controller disconnected. False when a connect or disconnect got
/// there first.
fn forget_session(
    state: &Mutex<ConnectionState>,
    slot: &SessionSlot,
    session: &Arc<Session>,
) -> bool {
    let mut state = lock(state);
    let mut slot = lock(slot);
    match slot.as_ref() {
        Some(current) if Arc::ptr_eq(current, session) => {
            *slot = None;
            *state = ConnectionState::Disconnected;
            true
        }
        _ => false,
    }
}

/// Drives one micro:bit from one page
pub struct Controller {
    bluetooth: Arc<dyn Bluetooth>,
    config: ControllerConfig,
    page: Arc<Page>,
    fields: Fields,
    state: Arc<Mutex<ConnectionState>>,
    session: Arc<SessionSlot>,
    self_test: Mutex<Option<SelfTest>>,
}

impl Controller {
    pub fn new(bluetooth: Arc<dyn Bluetooth>, config: ControllerConfig, page: Arc<Page>) -> Self {
        let fields = Fields::bind(&page);
        Self {
            bluetooth,
            config,
            page,
            fields,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            session: Arc::default(),
            self_test: Mutex::new(None),
        }
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Last reported state of `button`. Released when not connected.
    pub fn button_state(&self, button: Button) -> ButtonState {
        lock(&self.session)
            .as_ref()
            .map(|s| lock(&s.buttons).state(button))
            .unwrap_or_default()
    }

    fn set_state(&self, state: ConnectionState) {
        tracing::debug!(%state, "connection state");
        *lock(&self.state) = state;
    }

    fn session(&self) -> Result<Arc<Session>, ControllerError> {
        lock(&self.session).clone().ok_or(ControllerError::NotConnected)
    }

    /// Alert on failure and hand the result back
    fn surface<T>(
        &self,
        what: &str,
        result: Result<T, ControllerError>,
    ) -> Result<T, ControllerError> {
        if let Err(e) = &result {
            self.page.alert(format!("{what} failed: {e}"));
        }
        result
    }

    /// Request a device, resolve the profile and wire every feature.
    pub async fn connect(&self) -> Result<(), ControllerError> {
        self.drop_lost_session().await;
        {
            let mut state = lock(&self.state);
            if !state.can_connect() {
                let busy = ControllerError::Busy { action: "connect", state: *state };
                drop(state);
                return self.surface("Connect", Err(busy));
            }
            *state = ConnectionState::Connecting;
        }

        if !self.bluetooth.is_available().await {
            self.set_state(ConnectionState::Disconnected);
            return self.surface("Connect", Err(ControllerError::Unavailable));
        }

        self.fields.status.set_text(status::CONNECTING);
        let session = match self.open_session().await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                self.fields.status.set_text(status::CONNECTION_FAILED);
                return self.surface("Connect", Err(e.into()));
            }
        };

        *lock(&self.session) = Some(session.clone());
        self.wire_features(&session).await;
        self.watch_link(&session);

        self.set_state(ConnectionState::Connected);
        self.fields.status.set_text(status::CONNECTED);
        tracing::info!(device = ?session.server.link().name(), "connected");
        Ok(())
    }

    /// A connected session whose link has gone away no longer blocks a
    /// new connection.
    async fn drop_lost_session(&self) {
        let Some(session) = lock(&self.session).clone() else { return };
        if self.state() != ConnectionState::Connected || session.server.is_connected().await {
            return;
        }
        if forget_session(&self.state, &self.session, &session) {
            tracing::warn!("dropping session of a lost connection");
            session.close();
        }
    }

    /// Poll the link and drop the session once the device goes away
    fn watch_link(&self, session: &Arc<Session>) {
        let link: Arc<dyn GattLink> = session.server.link().clone();
        let weak: Weak<Session> = Arc::downgrade(session);
        let state = self.state.clone();
        let slot = self.session.clone();
        let field = self.fields.status.clone();
        let task = tokio::spawn(async move {
            let start = Instant::now() + LINK_CHECK_INTERVAL;
            let mut ticker = interval_at(start, LINK_CHECK_INTERVAL);
            loop {
                ticker.tick().await;
                if matches!(link.is_connected().await, Ok(true)) {
                    continue;
                }
                let Some(session) = weak.upgrade() else { break };
                if forget_session(&state, &slot, &session) {
                    tracing::warn!("connection lost");
                    field.set_text(status::DISCONNECTED);
                    session.close();
                }
                break;
            }
        });
        session.add_timer(task.abort_handle());
    }

    async fn open_session(&self) -> Result<Session, GattError> {
        let options = RequestDeviceOptions {
            name_prefix: self.config.name_prefix.clone(),
            optional_services: profile_services(PROFILE)?,
        };
        let link = self.bluetooth.request_device(&options).await?;

        match GattServerFacade::resolve(link.clone(), PROFILE).await {
            Ok(server) => Ok(Session::new(server)),
            Err(e) => {
                if let Err(close) = link.disconnect().await {
                    tracing::warn!("failed to drop half-open connection: {close}");
                }
                Err(e)
            }
        }
    }

    /// Issue every per-connection feature at once. Each one reports its own
    /// failure and none waits for another.
    async fn wire_features(&self, session: &Session) {
        let (model, firmware, delay, button_a, button_b, uart) = futures::join!(
            self.read_text_into(session, profile::MODEL_NUMBER_STRING, &self.fields.model),
            self.read_text_into(session, profile::FIRMWARE_REVISION_STRING, &self.fields.firmware),
            self.configure_scrolling_delay(session),
            self.subscribe_button(session, Button::A, profile::BUTTON_A_STATE),
            self.subscribe_button(session, Button::B, profile::BUTTON_B_STATE),
            self.subscribe_uart(session),
        );
        let _ = self.surface("Reading model number", model);
        let _ = self.surface("Reading firmware revision", firmware);
        let _ = self.surface("Setting scrolling delay", delay);
        let _ = self.surface("Subscribing to button A", button_a);
        let _ = self.surface("Subscribing to button B", button_b);
        let _ = self.surface("Subscribing to UART", uart);
    }

    async fn read_text_into(
        &self,
        session: &Session,
        uuid: &'static str,
        field: &TextField,
    ) -> Result<(), ControllerError> {
        let text = session.characteristic(uuid)?.read_text().await?;
        field.set_text(&text);
        Ok(())
    }

    async fn configure_scrolling_delay(&self, session: &Session) -> Result<(), ControllerError> {
        let delay = self.config.scrolling_delay_ms;
        session
            .characteristic(profile::SCROLLING_DELAY)?
            .write_bytes(&scrolling_delay_bytes(delay))
            .await?;
        tracing::debug!(delay_ms = delay, "scrolling delay set");
        Ok(())
    }

    async fn subscribe_button(
        &self,
        session: &Session,
        button: Button,
        uuid: &'static str,
    ) -> Result<(), ControllerError> {
        let panel = session.buttons.clone();
        let field = self.fields.buttons.clone();
        let subscription = session
            .characteristic(uuid)?
            .subscribe(move |value| {
                let state = ButtonState::from_payload(&value);
                tracing::debug!(%button, ?state, "button changed");
                let label = {
                    let mut panel = lock(&panel);
                    panel.update(button, state);
                    panel.label()
                };
                field.set_text(&label);
            })
            .await?;
        lock(&session.subscriptions).push(subscription);
        Ok(())
    }

    async fn subscribe_uart(&self, session: &Session) -> Result<(), ControllerError> {
        let field = self.fields.response.clone();
        let subscription = session
            .characteristic(profile::UART_RESPONSE)?
            .subscribe(move |value| {
                let text = String::from_utf8_lossy(&value);
                field.set_text(text.trim_end_matches(['\r', '\n']));
            })
            .await?;
        lock(&session.subscriptions).push(subscription);
        Ok(())
    }

    /// Tear the connection down. Not being connected is reported in the
    /// status field, not as an error.
    pub async fn disconnect(&self) -> Result<(), ControllerError> {
        let session = {
            let mut state = lock(&self.state);
            if !state.can_disconnect() {
                let busy = ControllerError::Busy { action: "disconnect", state: *state };
                drop(state);
                return self.surface("Disconnect", Err(busy));
            }
            match lock(&self.session).take() {
                Some(session) => {
                    *state = ConnectionState::Disconnecting;
                    session
                }
                None => {
                    drop(state);
                    self.fields.status.set_text(status::NOT_CONNECTED);
                    return Ok(());
                }
            }
        };

        session.close();
        if !session.server.is_connected().await {
            drop(session);
            self.set_state(ConnectionState::Disconnected);
            tracing::info!("link already down");
            self.fields.status.set_text(status::NOT_CONNECTED);
            return Ok(());
        }
        let result = session.server.disconnect().await;
        let still_connected = session.server.is_connected().await;
        drop(session);
        self.set_state(ConnectionState::Disconnected);

        let result = match result {
            Err(e) => Err(e.into()),
            Ok(()) if still_connected => Err(ControllerError::StillConnected),
            Ok(()) => Ok(()),
        };
        match &result {
            Ok(()) => {
                tracing::info!("disconnected");
                self.fields.status.set_text(status::DISCONNECTED);
            }
            Err(_) => self.fields.status.set_text(status::DISCONNECTION_FAILED),
        }
        self.surface("Disconnect", result)
    }

    /// Page is closing: stop the self-test and disconnect if possible
    pub async fn shutdown(&self) {
        if let Some(test) = lock(&self.self_test).take() {
            test.cancel();
        }
        if self.state() == ConnectionState::Connected {
            let _ = self.disconnect().await;
        }
    }

    /// Scroll the message field, then show a checkmark once it has likely
    /// finished scrolling. An empty message does nothing.
    pub async fn show_message(&self) -> Result<(), ControllerError> {
        let result = self.try_show_message().await;
        self.surface("Show message", result)
    }

    async fn try_show_message(&self) -> Result<(), ControllerError> {
        let message = self.fields.message.text();
        if message.is_empty() {
            return Ok(());
        }
        let session = self.session()?;
        session.characteristic(profile::LED_TEXT)?.write_text(&message).await?;

        let delay = scroll_duration(
            self.config.scrolling_delay_ms,
            self.config.scroll_columns_per_char,
            &message,
        );
        let matrix = session.characteristic(profile::LED_MATRIX_STATE)?.clone();
        let page = self.page.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::debug!(?delay, "message scrolled, showing checkmark");
            if let Err(e) = matrix.write_bytes(LedMatrix::CHECKMARK.as_bytes()).await {
                page.alert(format!("Show checkmark failed: {e}"));
            }
        });
        session.add_timer(timer.abort_handle());
        Ok(())
    }

    /// Send the request field over UART, newline terminated
    pub async fn send_request(&self) -> Result<(), ControllerError> {
        let result = self.try_send_request().await;
        self.surface("Send request", result)
    }

    async fn try_send_request(&self) -> Result<(), ControllerError> {
        let Some(payload) = uart_request_payload(&self.fields.request.text()) else {
            return Ok(());
        };
        let session = self.session()?;
        session.characteristic(profile::UART_REQUEST)?.write_text(&payload).await?;
        Ok(())
    }

    pub async fn clear_matrix(&self) -> Result<(), ControllerError> {
        let result = self.write_pattern(LedMatrix::CLEAR).await;
        self.surface("Clear matrix", result)
    }

    /// Parse the matrix field and write it to the display
    pub async fn write_matrix(&self) -> Result<(), ControllerError> {
        let result = match LedMatrix::parse_glyph(&self.fields.matrix.text()) {
            Ok(pattern) => self.write_pattern(pattern).await,
            Err(e) => Err(e.into()),
        };
        self.surface("Write matrix", result)
    }

    async fn write_pattern(&self, pattern: LedMatrix) -> Result<(), ControllerError> {
        let session = self.session()?;
        session
            .characteristic(profile::LED_MATRIX_STATE)?
            .write_bytes(pattern.as_bytes())
            .await?;
        self.fields.matrix.set_text(&pattern.to_glyph());
        Ok(())
    }

    /// Read the display back into the matrix field
    pub async fn refresh_matrix(&self) -> Result<(), ControllerError> {
        let result = self.try_refresh_matrix().await;
        self.surface("Refresh matrix", result)
    }

    async fn try_refresh_matrix(&self) -> Result<(), ControllerError> {
        let session = self.session()?;
        let raw = session.characteristic(profile::LED_MATRIX_STATE)?.read_bytes().await?;
        let pattern = LedMatrix::from_bytes(&raw).ok_or(ControllerError::MatrixLength(raw.len()))?;
        self.fields.matrix.set_text(&pattern.to_glyph());
        Ok(())
    }

    /// Current scrolling delay as reported by the device
    pub async fn read_scrolling_delay(&self) -> Result<Option<u16>, ControllerError> {
        let result = async {
            let session = self.session()?;
            let raw = session.characteristic(profile::SCROLLING_DELAY)?.read_bytes().await?;
            Ok::<_, ControllerError>(parse_scrolling_delay(&raw))
        }
        .await;
        self.surface("Reading scrolling delay", result)
    }

    pub fn start_self_test(&self) -> Result<(), ControllerError> {
        let mut current = lock(&self.self_test);
        if current.as_ref().is_some_and(|t| !t.is_finished()) {
            drop(current);
            return self.surface("Start self-test", Err(ControllerError::SelfTestRunning));
        }
        *current = Some(SelfTest::start(
            self.page.clone(),
            self.fields.instruction.clone(),
            default_steps(),
            self.config.self_test_interval(),
        ));
        Ok(())
    }

    pub fn cancel_self_test(&self) {
        if let Some(test) = lock(&self.self_test).take() {
            test.cancel();
        }
    }

    pub async fn dispatch(&self, action: Action) -> Result<(), ControllerError> {
        tracing::debug!(?action, "dispatch");
        match action {
            Action::Connect => self.connect().await,
            Action::Disconnect => self.disconnect().await,
            Action::ShowMessage => self.show_message().await,
            Action::SendRequest => self.send_request().await,
            Action::ClearMatrix => self.clear_matrix().await,
            Action::RefreshMatrix => self.refresh_matrix().await,
            Action::WriteMatrix => self.write_matrix().await,
            Action::StartSelfTest => self.start_self_test(),
            Action::CancelSelfTest => {
                self.cancel_self_test();
                Ok(())
            }
        }
    }

    /// Turn clicks on the page's buttons into [`Action`]s
    pub fn bind(&self) -> mpsc::UnboundedReceiver<Action> {
        let (tx, rx) = mpsc::unbounded_channel();
        for action in Action::ALL {
            let tx = tx.clone();
            ActionButton::new(self.page.clone(), action.button_id()).on_click(move || {
                let _ = tx.send(action);
            });
        }
        rx
    }

    /// Handle actions until the channel closes. Each action runs on its own
    /// task so a slow one does not hold up the others.
    pub async fn run(self: Arc<Self>, mut actions: mpsc::UnboundedReceiver<Action>) {
        while let Some(action) = actions.recv().await {
            let controller = self.clone();
            tokio::spawn(async move {
                // failures were already alerted
                let _ = controller.dispatch(action).await;
            });
        }
    }
}
