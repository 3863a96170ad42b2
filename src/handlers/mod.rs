// src/handlers/mod.rs

pub mod auth;
pub mod catalog;
pub mod certificate;
pub mod enroll;
pub mod instructor;
pub mod quiz;
pub mod simulation;
