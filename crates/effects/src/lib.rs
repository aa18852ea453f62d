//! `effects` crate: the collaborator contracts the workflow engine calls out to.
//!
//! The engine never sends an email, arms a timer or reads a session itself.
//! Hosts supply an [`ActionDispatcher`], a [`Scheduler`] and an
//! [`IdentityProvider`]; this crate defines those traits plus a few
//! ready-made implementations for simulation and tests.

pub mod action;
pub mod error;
pub mod traits;
pub mod dispatch;
pub mod scheduler;
pub mod identity;
pub mod mock;

pub use action::ActionType;
pub use error::EffectError;
pub use traits::{ActionDispatcher, IdentityProvider, Scheduler};
