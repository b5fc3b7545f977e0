// src/models/mod.rs

pub mod document;
pub mod group;
pub mod publication;
pub mod question;
pub mod quiz;
pub mod response;
pub mod user;
