#![doc = include_str!("../README.md")]

//! # SQL Boundary
//!
//! This crate defines the connection contract consumed by the query layer
//! together with a default `SQLite` implementation.

#![forbid(unsafe_code)]

mod connection;
pub mod default_impl;
mod types;

pub use self::connection::{Backend, Connection, FromEnv};
pub use self::default_impl::{ConnectOptions, SqlDefault};
pub use self::types::{DataType, Field, Row, into_json};
