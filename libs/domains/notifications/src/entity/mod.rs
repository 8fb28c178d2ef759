//! Sea-ORM entities for the notification tables.

pub mod notification;
pub mod template;
