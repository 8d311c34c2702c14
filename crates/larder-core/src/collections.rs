//! Collection names used by the ordering app.
//!
//! The engine accepts any collection name; these exist so callers share
//! spelling.

pub const ORDERS: &str = "orders";
pub const USERS: &str = "users";
pub const PRODUCTS: &str = "products";
pub const SETTINGS: &str = "settings";

/// All collections the app knows about, in bootstrap order.
pub const ALL: [&str; 4] = [ORDERS, USERS, PRODUCTS, SETTINGS];
