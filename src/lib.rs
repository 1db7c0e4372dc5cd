//! searchstore - bounded, grouped and sorted result storage for distributed search
//!
//! Rows produced by a search flow into a `DataStore` per result table, held
//! either on the heap (`MapDataStore`) or in LMDB (`LmdbDataStore`).
//! `Coprocessors` fans rows out to the stores of one search and moves their
//! contents between nodes as payloads; `SearchResponseCreator` shapes them
//! into client responses.

pub mod cli;
pub mod codec;
pub mod config;
pub mod coprocessor;
pub mod expression;
pub mod lmdb;
pub mod observability;
pub mod plan;
pub mod response;
pub mod store;
