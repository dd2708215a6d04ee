pub mod client;

pub use client::{CalendarServiceClient, RemoteError};
