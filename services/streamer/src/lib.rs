//! Streamer Profile Service
//!
//! Manages the streamer (virtual host) profiles of the Streamer-Sales live
//! commerce platform. Profiles live in a single YAML document; the service
//! lists, fetches, creates, updates and deletes them over a small JSON API,
//! and asks the digital human service to preprocess a streamer's base video
//! whenever a profile is created or its video changes.
//!
//! ## Architecture
//!
//! ```text
//!  Front-end                 Streamer Service                  Digital Human
//! ┌──────────┐   POST    ┌──────────────┐                    ┌──────────────┐
//! │ /streamer│──────────▶│ API handlers │───── preprocess ──▶│ /preprocess  │
//! │  list    │           └──────────────┘      (after save)  └──────────────┘
//! │  info    │                  │
//! │  edit    │                  ▼
//! │  delete  │           ┌──────────────┐     ┌──────────────────────┐
//! └──────────┘           │ ProfileStore │────▶│ streamer_info.yaml   │
//!                        └──────────────┘     └──────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod preprocess;
pub mod profile;
pub mod profile_store;

pub use api::{create_router, start_api_server, AppState};
pub use config::Config;
pub use preprocess::{DigitalHumanClient, PreprocessNotifier, PreprocessRequest};
pub use profile::{ApiResponse, ProfileRecord, ResultCode, StreamerIdRequest};
pub use profile_store::{ProfileStore, StoreError, UpsertOutcome};
