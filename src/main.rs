//! # Terrain Area Tasks Entry Point
//!
//! Runs the headless editing demo. An optional first argument names a JSON
//! config file.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --release -- config.json
//! ```

fn main() {
    terrain_area_tasks::run();
}
