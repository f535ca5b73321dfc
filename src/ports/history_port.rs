//! Price history source port trait.

use crate::domain::arithmetic::ArithmeticContext;
use crate::domain::error::FxError;
use crate::domain::history::PriceHistory;

pub trait HistoryPort {
    /// Loads the full history, creating every value under `ctx`.
    fn load(&self, ctx: &ArithmeticContext) -> Result<PriceHistory, FxError>;
}
