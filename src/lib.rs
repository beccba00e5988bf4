// Plant model and derived status
pub mod plant;

// Bounded per-minute hydration history
pub mod history;

// Geographic zoning
pub mod zone;

// Transition table and level changes
pub mod transition;

// Weather lookup, classification and zone names
pub mod weather;

// Plant persistence with optimistic versioning
pub mod store;

// Retry on write conflict
pub mod retry;

// Simulation engine, backfill and scheduler
pub mod engine;

// Notification fan-out
pub mod broadcast;

// NATS client integration
pub mod nats;

// Configuration
pub mod config;

pub mod error;

pub use error::SimError;
