//! Payload encodings for the micro:bit characteristics

use std::fmt;
use std::time::Duration;

/// Per-PDU payload ceiling after ATT overhead
pub const MAX_PDU: usize = 20;

/// Which of the two buttons a notification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Button::A => f.write_str("A"),
            Button::B => f.write_str("B"),
        }
    }
}

/// Button State value: 0 = not pressed, 1 = pressed, 2 = long press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonState {
    #[default]
    Released,
    Pressed,
    LongPressed,
}

impl ButtonState {
    /// Decode the first byte of a notification.
    ///
    /// Unknown values read as `Released`, same as an empty payload.
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => Self::Pressed,
            2 => Self::LongPressed,
            _ => Self::Released,
        }
    }

    pub fn from_payload(data: &[u8]) -> Self {
        data.first().copied().map(Self::from_byte).unwrap_or_default()
    }
}

/// Human readable label for the button status field. Released is empty.
pub fn button_label(button: Button, state: ButtonState) -> String {
    match state {
        ButtonState::Released => String::new(),
        ButtonState::Pressed => format!("Button {button} Pressed"),
        ButtonState::LongPressed => format!("Button {button} Long Pressed"),
    }
}

/// Scrolling Delay payload. Always little-endian, whatever the host is.
pub fn scrolling_delay_bytes(ms: u16) -> [u8; 2] {
    ms.to_le_bytes()
}

pub fn parse_scrolling_delay(data: &[u8]) -> Option<u16> {
    let bytes: [u8; 2] = data.try_into().ok()?;
    Some(u16::from_le_bytes(bytes))
}

/// UART request payload: the text plus a trailing newline, nothing for empty input
pub fn uart_request_payload(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(format!("{text}\n"))
    }
}

/// Estimated time the display needs to scroll `message` across.
///
/// The firmware sends no completion signal, so this is a guess: each
/// character takes `columns_per_char` scroll steps of `delay_ms`, plus two
/// characters of lead-in and lead-out.
pub fn scroll_duration(delay_ms: u16, columns_per_char: u32, message: &str) -> Duration {
    let chars = message.chars().count() as u64;
    Duration::from_millis(delay_ms as u64 * columns_per_char as u64 * (chars + 2))
}

const LIT: char = '■';
const UNLIT: char = '□';

/// 5x5 LED matrix state, one byte per row, bit 4 = leftmost column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedMatrix(pub [u8; 5]);

impl LedMatrix {
    pub const CLEAR: LedMatrix = LedMatrix([0x00; 5]);

    pub const CHECKMARK: LedMatrix = LedMatrix([0x00, 0x01, 0x02, 0x14, 0x08]);

    /// Decode a Matrix State read. Bits above column 0..4 are dropped.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let rows: [u8; 5] = data.try_into().ok()?;
        Some(Self(rows.map(|r| r & 0x1f)))
    }

    pub fn as_bytes(&self) -> &[u8; 5] {
        &self.0
    }

    pub fn is_lit(&self, row: usize, col: usize) -> bool {
        row < 5 && col < 5 && self.0[row] & (0x10 >> col) != 0
    }

    pub fn set(&mut self, row: usize, col: usize, lit: bool) {
        if row < 5 && col < 5 {
            if lit {
                self.0[row] |= 0x10 >> col;
            } else {
                self.0[row] &= !(0x10 >> col);
            }
        }
    }

    /// Five lines of filled/empty blocks
    pub fn to_glyph(&self) -> String {
        (0..5)
            .map(|row| {
                (0..5)
                    .map(|col| if self.is_lit(row, col) { LIT } else { UNLIT })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse the glyph form back. Rows may be separated by newlines or `/`.
    pub fn parse_glyph(s: &str) -> Result<Self, GlyphError> {
        let rows: Vec<&str> = s
            .split(['\n', '/'])
            .map(|r| r.trim_end_matches('\r'))
            // a row of spaces is five unlit cells, not an empty row
            .filter(|r| !r.is_empty())
            .collect();
        if rows.len() != 5 {
            return Err(GlyphError::RowCount(rows.len()));
        }

        let mut matrix = Self::CLEAR;
        for (row, line) in rows.iter().enumerate() {
            let cells: Vec<char> = line.chars().collect();
            if cells.len() != 5 {
                return Err(GlyphError::RowWidth { row, width: cells.len() });
            }
            for (col, c) in cells.into_iter().enumerate() {
                let lit = match c {
                    LIT | '#' | '*' | '1' => true,
                    UNLIT | '.' | '0' | ' ' => false,
                    other => return Err(GlyphError::Cell { row, col, found: other }),
                };
                matrix.set(row, col, lit);
            }
        }
        Ok(matrix)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GlyphError {
    #[error("expected 5 rows, got {0}")]
    RowCount(usize),
    #[error("row {row} has {width} cells, expected 5")]
    RowWidth { row: usize, width: usize },
    #[error("unexpected {found:?} at row {row}, column {col}")]
    Cell { row: usize, col: usize, found: char },
}
