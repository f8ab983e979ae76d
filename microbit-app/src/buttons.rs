use microbit_proto::{Button, ButtonState, button_label};

/// State of both buttons, tracked independently.
///
/// The page has a single status field, so rendering shows whichever button
/// changed last.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPanel {
    a: ButtonState,
    b: ButtonState,
    last: Option<Button>,
}

impl ButtonPanel {
    pub fn update(&mut self, button: Button, state: ButtonState) {
        match button {
            Button::A => self.a = state,
            Button::B => self.b = state,
        }
        self.last = Some(button);
    }

    pub fn state(&self, button: Button) -> ButtonState {
        match button {
            Button::A => self.a,
            Button::B => self.b,
        }
    }

    /// Text for the status field
    pub fn label(&self) -> String {
        match self.last {
            Some(button) => button_label(button, self.state(button)),
            None => String::new(),
        }
    }
}
