pub mod broadcast;
pub mod messages;
pub mod presence;
pub mod router;
pub mod store;
