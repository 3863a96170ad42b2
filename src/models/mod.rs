// src/models/mod.rs

pub mod course;
pub mod enroll;
pub mod quiz;
pub mod simulation;
pub mod user;
