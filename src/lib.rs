//! Rendezvous: a room-based signaling relay.
//!
//! A provider creates a room under a short code, an inspector joins it, and
//! the relay forwards offers, answers and ICE candidates between the two
//! until they can talk directly. Messages for an inspector that has not
//! joined yet are held and flushed in order when it does.

pub mod config;
pub mod signaling;
