//! Slack integration - Socket Mode ingest and outbound chat surface
//!
//! This crate carries the Slack half of the sync engine:
//! - **Socket Mode** (`socket`) - WebSocket event loop (no public URL needed)
//! - **Events** (`events`) - typed envelopes + dispatcher for inbound events
//! - **Ingest** (`ingest`) - channel messages → threads and messages
//! - **Outbound** (`outbound`) - `chat.postMessage` client seam
//! - **Markup** (`markup`) - rich-text → mrkdwn rendering
//! - **Install** (`install`) - app installation store backed by integrations
//!
//! Every inbound envelope is acknowledged before any awaited work runs;
//! Slack drops the connection otherwise.

pub mod events;
pub mod ingest;
pub mod install;
pub mod markup;
pub mod outbound;
pub mod socket;
