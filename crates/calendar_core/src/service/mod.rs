//! Use-case services consumed by transport layers.
//!
//! # Responsibility
//! - Turn primitive transport input into domain values.
//! - Keep transport layers decoupled from storage details.

pub mod event_service;
