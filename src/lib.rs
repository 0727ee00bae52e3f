// src/lib.rs

//! Event harvester library.
//!
//! Collects event listings from many unreliable sources on a bounded worker
//! pool, memoizes and checkpoints through a durable cache, and reduces the
//! result to a validated, deduplicated set.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
