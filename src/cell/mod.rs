//! Actor cells: [`ActorCell`] with its [`Rescheduler`], and the [`StartGate`] composition.

mod actor_cell;
mod rescheduler;
mod start_gate;

pub use actor_cell::{ActorCell, CellBuilder};
pub use rescheduler::{Rescheduler, TimeTriggered};
pub use start_gate::StartGate;
