//! mkvmux-ebml: the EBML layer underneath the Matroska muxer
//!
//! This crate knows how Matroska elements look on disk and nothing about
//! muxing policy.
//!
//! # Modules
//!
//! - `ids` - Element IDs used by the muxer
//! - `vint` - Variable-length integers and payload size arithmetic
//! - `schema` - Payload types and default values per element ID
//! - `element` - Tagged element tree with exact size computation
//! - `sink` - Positioned byte sinks elements are written to
//! - `reader` - Reading elements back (EBML head patching, tests)

pub mod element;
pub mod error;
pub mod ids;
pub mod reader;
pub mod schema;
pub mod sink;
pub mod vint;

pub use element::{EbmlElement, ElementValue};
pub use error::{Error, Result};
pub use ids::ElementId;
pub use reader::{parse_element, parse_elements, read_element, read_element_header, ElementHeader};
pub use sink::ElementSink;
