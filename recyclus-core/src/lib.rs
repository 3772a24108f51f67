//! Recyclus Core
//!
//! Core types shared by the Recyclus worker and its service clients.
//!
//! This crate contains:
//! - Domain types: job records, task specs, file roles and process outcomes
//! - DTOs: the package handed to the artifact store

pub mod domain;
pub mod dto;
