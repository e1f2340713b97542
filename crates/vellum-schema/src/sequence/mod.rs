//! Hi/Lo identifier sequences.
//!
//! Each entity stream reserves blocks of `max_lo` ids by advancing a shared
//! hi counter inside a serializable transaction, then hands ids out of the
//! block locally. Two processes never see the same (hi, lo) pair.

mod counter;
mod factory;
pub(crate) mod hilo;

pub use counter::DatabaseHiloCounter;
pub use factory::SequenceFactory;
pub use hilo::{HiloCounter, HiloSequence};
