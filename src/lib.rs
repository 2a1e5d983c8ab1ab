// Library exports for the portal
// Integration tests drive the router through these modules

pub mod access;
pub mod auth;
pub mod config;
pub mod db;
pub mod documents;
pub mod downloads;
pub mod error;
pub mod events;
pub mod extractors;
pub mod lecturers;
pub mod ratings;
pub mod routes;
pub mod state;
pub mod votes;
