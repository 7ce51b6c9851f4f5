//! Multilingual wiki content records: language-aware reads, element
//! reconciliation with media cleanup, completion statistics and bulk
//! provisioning from templates.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod model;
pub mod presenter;
pub mod reconcile;
pub mod repository;
pub mod retry;
pub mod selector;
pub mod service;
pub mod statistics;
pub mod validation;
