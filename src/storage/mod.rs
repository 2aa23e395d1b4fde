mod entries;
mod feeds;
mod schema;
mod statuses;
mod subscriptions;
mod types;

pub use schema::Database;
pub use types::{DatabaseError, Entry, Feed, FetchStatus, FetchStatusUpdate, NewEntry, Subscription};
