// src/handlers/mod.rs

pub mod admin;
pub mod analytics;
pub mod attempts;
pub mod auth;
pub mod documents;
pub mod groups;
pub mod publishing;
pub mod questions;
pub mod quizzes;
