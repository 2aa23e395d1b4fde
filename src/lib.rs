//! feedhub — polls RSS/Atom feeds, stores new entries durably and notifies
//! in-process subscribers.
//!
//! The pipeline per feed: conditional HTTP fetch (ETag) → dialect-tolerant
//! XML parse → content-addressed dedup → per-entry persistence with a fetch
//! status audit row → best-effort notification fan-out.
//!
//! Subscriptions are durable rows; [`hub::Hub::load_subscriptions`] replays
//! them into the in-memory [`bus::NotificationBus`] at startup, and every
//! delete path unloads them again.

pub mod archive;
pub mod bus;
pub mod config;
pub mod fetch;
pub mod hub;
pub mod storage;
pub mod util;
