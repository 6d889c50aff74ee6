//! StreakWars - social habit tracking service
//!
//! Users track habits, join time-boxed challenges, befriend each other, and
//! fight wagered 1v1 habit wars with a sabotage/escape mechanic layered on
//! completion points.
//!
//! ## Surfaces
//!
//! - **Auth**: JWT-based registration/login with Argon2 password hashes
//! - **Habits**: CRUD, daily completions, remixing, Exa-backed suggestions
//! - **Challenges**: time-boxed competitions with per-participant points
//! - **Wars**: wagered 1v1s with escrowed coins and a sabotage state machine
//! - **Social**: friendships and groups
//! - **Rewards**: coin ledger with a redundant balance on the user record
//! - **Flavor**: Groq taunt generation and ElevenLabs text-to-speech

pub mod auth;
pub mod config;
pub mod db;
pub mod logging;
pub mod routes;
pub mod server;
pub mod services;
pub mod streaks;
pub mod types;
pub mod wars;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{AppError, Result};
