//! Join set: a draining "wait for everything" over an open-ended set of tasks.

mod set;

pub use set::JoinSet;
