pub mod config;
pub mod error;
pub mod filter;
pub mod model;
pub mod persist;
pub mod projection;
pub mod store;

// Tree surface: snapshot, rebuild, restore
pub mod reconcile;
pub mod tree;

// Drag & drop and the refresh gates it interacts with
pub mod gesture;
pub mod refresh;

// Driving a session: commands, item sources, background loop
pub mod reducer;
pub mod runtime;
pub mod session;
pub mod source;
