//! Anonymized recursive crawler for onion services and a keyword-alert monitor that
//! polls search engines, paste sites and onion search seeds on a schedule.

pub mod alerts;
pub mod analysis;
pub mod app;
pub mod config;
pub mod crawler;
pub mod db;
pub mod domain;
pub mod dorks;
pub mod infrastructure;
pub mod monitor;
pub mod net;
