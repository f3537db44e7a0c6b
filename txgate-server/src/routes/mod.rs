//! HTTP routes. Transaction intent is attached here, per route group,
//! through the interceptor layer - never inside handlers.

pub mod health;
pub mod users;
