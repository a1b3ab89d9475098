//! GitHub integration - webhook ingest and app client surface
//!
//! - **Webhook** (`webhook`) - typed event payloads + explicit dispatch enum
//! - **Signature** (`signature`) - `X-Hub-Signature-256` HMAC verification
//! - **Ingest** (`ingest`) - issue/PR lifecycle events → thread status
//! - **Client** (`client`) - app-authenticated REST seam
//! - **Backfill** (`backfill`) - pending-repo issue import with progress

pub mod backfill;
pub mod client;
pub mod ingest;
pub mod signature;
pub mod webhook;
