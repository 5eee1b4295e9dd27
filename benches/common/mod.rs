#![allow(missing_docs, dead_code)]
//! Shared benchmark support: packet-in frame generators.

pub mod generators;
