//! Node-side epoch components: the flip keys pool, its collaborators and
//! the epoch rollover that drives it.

pub mod epoch;
pub mod events;
pub mod keys_pool;
pub mod validation;
