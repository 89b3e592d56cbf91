//! SkillForge Entitlements - Subscription & Entitlement Reconciliation Engine
//!
//! This crate sells plan subscriptions, individual courses, and gift codes
//! through a hosted payment authority, and keeps local entitlement records
//! consistent with the authority's eventually-delivered webhook events.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
