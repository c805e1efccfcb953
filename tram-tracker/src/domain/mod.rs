//! Domain types for the tram tracker.
//!
//! Stops, lines, live arrivals and journey details. The types derive
//! deserialisers that match the upstream JSON directly, so fetched responses
//! need no separate conversion layer.

mod arrival;
mod error;
mod journey;
mod line;
mod point;
mod stop;

pub use arrival::{Arrival, Departure, Occupancy, ServiceJourney};
pub use error::{CatalogError, ParsePointError};
pub use journey::{Call, JourneyDetail, TripLeg};
pub use line::{Line, LineCatalog, LineInfo, TransportMode};
pub use point::{Coordinate, Point, Position};
pub use stop::{StopArea, StopPoint};
