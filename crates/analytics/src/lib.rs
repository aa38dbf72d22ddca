//! Stream analytics service: HTTP surface and configuration

pub mod api;
pub mod config;
pub mod error;
