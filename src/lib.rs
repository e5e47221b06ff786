//! Decoding of Protocol Buffers HTTP bodies with schemas supplied at runtime.
//!
//! Protosniff is meant to sit behind an intercepting proxy. Users upload `.proto` files while
//! the proxy is running and every intercepted body is then decoded either as the type bound
//! to its URL by a mapping, or as whichever known type explains the bytes best.
//!
//! - [`schema`] compiles `.proto` source, repairing some common non-conformant constructs.
//! - [`registry`] stores the uploaded files and the schema set compiled from them.
//! - [`mapping`] binds URL patterns and traffic directions to message types.
//! - [`matcher`] picks the message type for a payload and renders the decoded message.
//!
//! ```
//! use protosniff::config::MatcherConfig;
//! use protosniff::mapping::{Direction, MappingDirection, MappingTable};
//! use protosniff::matcher::{AutoMatcher, Resolution};
//! use protosniff::registry::SchemaRegistry;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(SchemaRegistry::new());
//! registry.add_file("fish.proto", r#"
//!   syntax = "proto3";
//!   package fish;
//!
//!   message Catch { string kind = 1; int32 weight = 2; }
//!   message Spot { string lake = 1; }
//! "#).unwrap();
//!
//! let mappings = Arc::new(MappingTable::new());
//! mappings.add("*/spots/*", "fish.Spot", MappingDirection::Both, "Fishing spots");
//!
//! let config = MatcherConfig { pretty: false, ..Default::default() };
//! let matcher = AutoMatcher::new(registry, mappings, config);
//!
//! let spot = matcher
//!     .decode(b"\x0a\x06Saimaa", "https://h/spots/1", Direction::Response)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(spot.type_name, "fish.Spot");
//! assert_eq!(spot.resolution, Resolution::Mapping);
//!
//! let catch = matcher
//!     .decode(b"\x0a\x05Perch\x10\xa9\x46", "https://h/catches?page=2", Direction::Response)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(catch.type_name, "fish.Catch");
//! assert_eq!(catch.text, r#"{"kind":"Perch","weight":9001}"#);
//! ```
#![warn(missing_docs)]
#![allow(clippy::match_bool)]

pub mod config;
pub mod decode;
pub mod mapping;
pub mod matcher;
pub mod registry;
pub mod render;
pub mod schema;
