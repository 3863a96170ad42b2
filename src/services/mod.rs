// src/services/mod.rs

pub mod certificate;
pub mod lifecycle;
pub mod scoring;
