//! Lead Tracker - Sales Leads and Newsletter Broadcasts
//!
//! A Rust library for tracking companies, contact history and projects, and
//! for sending segmented newsletters and Slack announcements.
//!
//! # Features
//!
//! - Company, contact history, project and reference list records in SQLite
//! - Stale-lead detection and dashboard aggregations
//! - Per-company newsletter delivery over SMTP with sent bookkeeping
//! - Slack announcements
//! - Cached plain-text views of CMS mails

/// Segmented newsletter and Slack broadcasts
pub mod broadcast;
/// Rendered view cache
pub mod cache;
/// Headless CMS client
pub mod cms;
/// Configuration management
pub mod config;
/// Stale leads and chart groupings
pub mod dashboard;
/// Database operations and connection pooling
pub mod db;
/// Error types
pub mod error;
/// Logging setup and utilities
pub mod logging;
/// SMTP delivery
pub mod mailer;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Plain-text views
pub mod render;
/// Repository seam used by broadcasts
pub mod repository;
/// Database schema definitions
pub mod schema;
/// Mail screens and send actions
pub mod service;
/// Slack client
pub mod slack;
/// Email body rendering
pub mod template;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use broadcast::{BroadcastReport, Broadcaster, DeliveryOutcome, DeliveryStatus};
pub use db::Database;
pub use error::{Result, TrackerError};
pub use models::{Company, ContactEntry, Mail, Project, ReferenceKind, SentMail};
pub use service::{MailDetail, MailService, MailSummary};
