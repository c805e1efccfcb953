//! Västtrafik Planera Resa (v4) client.
//!
//! This module provides an HTTP client for the Västtrafik journey planner,
//! which serves live arrivals and departures for stop points in the
//! Gothenburg region along with full journey details.
//!
//! Key characteristics of the API:
//! - Requests are authorised with a bearer token obtained through an OAuth2
//!   client-credentials exchange; tokens expire and are renewed lazily
//! - Arrival and departure lists are paginated; only the first page is used
//! - Journey detail references are opaque and short-lived

mod api;
mod client;
mod error;
mod mock;

pub use api::{JourneyInclude, TransitApi};
pub use client::{VasttrafikClient, VasttrafikConfig};
pub use error::TransitError;
pub use mock::MockTransitClient;
