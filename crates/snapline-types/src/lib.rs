pub mod api;
pub mod coerce;
pub mod events;
pub mod models;
