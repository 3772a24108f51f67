//! Data transfer objects for the external services

pub mod upload;
