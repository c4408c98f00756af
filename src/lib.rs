//! Product Reels
//!
//! Turns rows of a product feed into short avatar videos and posts them to
//! social platforms. Each run filters the feed, acquires a video per accepted
//! row, fans it out to the enabled platforms and writes the outcome back onto
//! the feed so the next run skips what is already posted.

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;
