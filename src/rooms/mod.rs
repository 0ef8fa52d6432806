//! Chat rooms and their expiry timers

pub mod expiry;
pub mod store;

pub use expiry::ExpiryScheduler;
pub use store::RoomStore;
