// src/services/mod.rs

pub mod ai;
pub mod analytics;
pub mod generator;
pub mod insights;
pub mod publisher;
pub mod scoring;
pub mod session;
