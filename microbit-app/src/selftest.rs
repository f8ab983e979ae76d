//! Guided self-test: a list of instructions, each with a condition on the
//! page that shows the user did it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use crate::ui::{Page, TextField, ids};

pub const ALL_PASSED: &str = "All tests passed";
pub const CANCELLED: &str = "Test cancelled";

const MIN_INTERVAL: Duration = Duration::from_millis(1);

type Check = Box<dyn Fn(&Page) -> bool + Send + Sync>;

pub struct Step {
    instruction: String,
    check: Check,
}

impl Step {
    pub fn new<F>(instruction: &str, check: F) -> Self
    where
        F: Fn(&Page) -> bool + Send + Sync + 'static,
    {
        Self { instruction: instruction.to_string(), check: Box::new(check) }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn is_satisfied(&self, page: &Page) -> bool {
        (self.check)(page)
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Step").field(&self.instruction).finish()
    }
}

fn field_is(id: &'static str, expected: &'static str) -> impl Fn(&Page) -> bool + Send + Sync {
    move |page| page.text(id) == expected
}

/// Buttons, UART round trip and matrix read-back
pub fn default_steps() -> Vec<Step> {
    vec![
        Step::new("Press button A", field_is(ids::BUTTON_STATUS, "Button A Pressed")),
        Step::new("Press button B", field_is(ids::BUTTON_STATUS, "Button B Pressed")),
        Step::new(
            "Hold button A for a long press",
            field_is(ids::BUTTON_STATUS, "Button A Long Pressed"),
        ),
        Step::new("Send a request and wait for the response", |page| {
            !page.text(ids::RESPONSE).is_empty()
        }),
        Step::new("Draw on the LED matrix, then refresh it", |page| {
            page.text(ids::LED_MATRIX).contains('■')
        }),
    ]
}

/// One running self-test. Dropping it stops the polling timer.
#[derive(Debug)]
pub struct SelfTest {
    field: TextField,
    finished: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SelfTest {
    /// Show the first instruction and poll the current step every `interval`.
    /// Intervals below one millisecond poll every millisecond.
    pub fn start(page: Arc<Page>, field: TextField, steps: Vec<Step>, interval: Duration) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        let finished = Arc::new(AtomicBool::new(false));
        match steps.first() {
            Some(step) => field.set_text(step.instruction()),
            None => {
                field.set_text(ALL_PASSED);
                finished.store(true, Ordering::SeqCst);
            }
        }
        tracing::info!(steps = steps.len(), "self-test started");

        let task = tokio::spawn({
            let field = field.clone();
            let finished = finished.clone();
            async move {
                let mut ticker = interval_at(Instant::now() + interval, interval);
                let mut current = 0;
                while current < steps.len() {
                    ticker.tick().await;
                    if !steps[current].is_satisfied(&page) {
                        continue;
                    }
                    tracing::info!(step = current + 1, "self-test step passed");
                    current += 1;
                    match steps.get(current) {
                        Some(next) => field.set_text(next.instruction()),
                        None => field.set_text(ALL_PASSED),
                    }
                }
                finished.store(true, Ordering::SeqCst);
            }
        });

        Self { field, finished, task }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Stop polling. A run that already passed keeps its result.
    pub fn cancel(self) {
        self.task.abort();
        if !self.is_finished() {
            tracing::info!("self-test cancelled");
            self.field.set_text(CANCELLED);
        }
    }
}

impl Drop for SelfTest {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<Page>, TextField) {
        let page = Arc::new(Page::standard());
        let field = TextField::new(page.clone(), ids::TEST_INSTRUCTION);
        (page, field)
    }

    #[tokio::test(start_paused = true)]
    async fn steps_advance_as_conditions_are_met() {
        let (page, field) = setup();
        let test =
            SelfTest::start(page.clone(), field.clone(), default_steps(), Duration::from_secs(1));
        assert_eq!(field.text(), "Press button A");

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(field.text(), "Press button A");

        page.set_text(ids::BUTTON_STATUS, "Button A Pressed");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(field.text(), "Press button B");

        page.set_text(ids::BUTTON_STATUS, "Button B Pressed");
        page.set_text(ids::RESPONSE, "pong");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(field.text(), "Hold button A for a long press");

        page.set_text(ids::BUTTON_STATUS, "Button A Long Pressed");
        page.set_text(ids::LED_MATRIX, "■□□□□");
        // one step per tick
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(field.text(), "Send a request and wait for the response");
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(field.text(), ALL_PASSED);
        assert!(test.is_finished());

        test.cancel();
        assert_eq!(field.text(), ALL_PASSED);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_polling() {
        let (page, field) = setup();
        let test =
            SelfTest::start(page.clone(), field.clone(), default_steps(), Duration::from_secs(1));
        test.cancel();
        assert_eq!(field.text(), CANCELLED);

        page.set_text(ids::BUTTON_STATUS, "Button A Pressed");
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(field.text(), CANCELLED);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_still_polls() {
        let (page, field) = setup();
        let test = SelfTest::start(page.clone(), field.clone(), default_steps(), Duration::ZERO);
        assert_eq!(field.text(), "Press button A");

        page.set_text(ids::BUTTON_STATUS, "Button A Pressed");
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(field.text(), "Press button B");
        assert!(!test.is_finished());
    }

    #[tokio::test]
    async fn no_steps_passes_immediately() {
        let (page, field) = setup();
        let test = SelfTest::start(page, field.clone(), Vec::new(), Duration::from_secs(1));
        assert!(test.is_finished());
        assert_eq!(field.text(), ALL_PASSED);
    }
}
