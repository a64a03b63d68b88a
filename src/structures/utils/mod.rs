pub use self::backoff::{Backoff, ContentionBackoff};
pub(crate) use self::slot_state::SlotState;

pub mod backoff;
mod slot_state;
