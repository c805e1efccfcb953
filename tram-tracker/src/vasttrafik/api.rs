//! The upstream transit API seam.

use std::fmt;
use std::future::Future;

use crate::domain::{Arrival, Departure, JourneyDetail, StopArea};

use super::error::TransitError;

/// Optional sections of a journey detail response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JourneyInclude {
    TicketSuggestions,
    TripLegCoordinates,
    ValidZones,
    ServiceJourneyCalls,
    ServiceJourneyCoordinates,
    Links,
    Occupancy,
}

impl JourneyInclude {
    pub fn as_str(&self) -> &'static str {
        match self {
            JourneyInclude::TicketSuggestions => "ticketsuggestions",
            JourneyInclude::TripLegCoordinates => "triplegcoordinates",
            JourneyInclude::ValidZones => "validzones",
            JourneyInclude::ServiceJourneyCalls => "servicejourneycalls",
            JourneyInclude::ServiceJourneyCoordinates => "servicejourneycoordinates",
            JourneyInclude::Links => "links",
            JourneyInclude::Occupancy => "occupancy",
        }
    }
}

impl fmt::Display for JourneyInclude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for fetching live transit data.
///
/// This abstraction lets the caching layer and the tracker be tested with
/// mock data.
pub trait TransitApi: Send + Sync + 'static {
    /// All stop areas known to the API.
    fn stop_areas(&self) -> impl Future<Output = Result<Vec<StopArea>, TransitError>> + Send;

    /// Upcoming arrivals at a stop point.
    fn arrivals_for_stop(
        &self,
        gid: &str,
    ) -> impl Future<Output = Result<Vec<Arrival>, TransitError>> + Send;

    /// Upcoming departures from a stop point.
    fn departures_for_stop(
        &self,
        gid: &str,
    ) -> impl Future<Output = Result<Vec<Departure>, TransitError>> + Send;

    /// Full detail of the journey behind an arrival or departure.
    fn journey_detail(
        &self,
        reference: &str,
        includes: &[JourneyInclude],
    ) -> impl Future<Output = Result<JourneyDetail, TransitError>> + Send;
}
