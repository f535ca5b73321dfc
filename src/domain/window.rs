//! Sliding window schedule over a history of a given length.

use super::error::EngineError;

/// Half-open row range `[start, end)` visited by one simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    start_index: usize,
    end_index: usize,
    window_size: usize,
    step_size: usize,
}

impl WindowPlan {
    /// Requires `start_index < end_index <= len`, positive sizes and at least
    /// one full window in range.
    pub fn new(
        len: usize,
        start_index: usize,
        end_index: usize,
        window_size: usize,
        step_size: usize,
    ) -> Result<Self, EngineError> {
        let invalid = |reason: String| Err(EngineError::InvalidRange { reason });
        if start_index >= end_index {
            return invalid(format!(
                "start_index {start_index} must be below end_index {end_index}"
            ));
        }
        if end_index > len {
            return invalid(format!(
                "end_index {end_index} exceeds history length {len}"
            ));
        }
        if window_size == 0 {
            return invalid("window_size must be at least 1".to_string());
        }
        if step_size == 0 {
            return invalid("step_size must be at least 1".to_string());
        }
        if window_size > end_index - start_index {
            return invalid(format!(
                "window_size {window_size} is wider than the range {start_index}..{end_index}"
            ));
        }
        Ok(WindowPlan {
            start_index,
            end_index,
            window_size,
            step_size,
        })
    }

    pub fn len(&self) -> usize {
        (self.end_index - self.start_index - self.window_size) / self.step_size + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn end_index(&self) -> usize {
        self.end_index
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn step_size(&self) -> usize {
        self.step_size
    }

    pub fn iter(&self) -> impl Iterator<Item = Window> + '_ {
        (0..self.len()).map(move |index| {
            let start = self.start_index + index * self.step_size;
            Window {
                index,
                start,
                end: start + self.window_size,
            }
        })
    }
}
