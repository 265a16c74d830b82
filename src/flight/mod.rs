//! Single-flight computation: [`SingleFlight`] plus the grouped
//! [`FlightCollection`] and its non-waiting [`FlightWriter`].

mod collection;
mod map;

pub use collection::{FlightCollection, FlightWriter};
pub use map::SingleFlight;
