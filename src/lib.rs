// Public API - probing engine, data types and the snapshot/report shapes
pub mod config;
pub mod probe;
pub mod state;
pub mod trace;

// Binary plumbing - argument surface, reverse DNS and the live table
pub mod cli;
pub mod lookup;
pub mod render;
