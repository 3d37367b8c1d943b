#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;
#[macro_use]
extern crate log;

pub mod async_races;
pub mod collab;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod export;
pub mod helpers;
pub mod players;
pub mod races;
pub mod rating;
pub mod schema;

pub use crate::helpers::BoxedError;
