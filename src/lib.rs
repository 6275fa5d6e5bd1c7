#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Terrain Area Tasks
//!
//! Asynchronous, area-scoped terrain edits that never block the render loop.
//!
//! An edit is a two-phase task. Its background phase runs on a worker thread and
//! mutates one area of the terrain store. Its main-thread phase runs on the
//! render thread afterwards and marks the regions the edit touched dirty for the
//! area's shader. The dirty marks of a whole frame are deduplicated into one
//! batch, so each region is re-baked at most once per frame however many edits
//! touched it.
//!
//! ## Key Modules
//!
//! * `core` - Shared-ownership primitives
//! * `config` - JSON configuration
//! * `engine_state` - The terrain store, the task pool, the dirty-region sink and
//!   the `TerrainEditor` that ties them together
//! * `demo` - A headless frame loop exercising the editor
//!
//! ## Usage
//!
//! ```no_run
//! fn main() {
//!     terrain_area_tasks::run();
//! }
//! ```

use log::{error, info};

use config::EditorConfig;

pub mod config;
pub mod core;
pub mod demo;
pub mod engine_state;

/// Initialises logging, loads the config named on the command line (or the
/// defaults) and runs the demo frame loop.
pub fn run() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized");

    let config = match std::env::args().nth(1) {
        Some(path) => match EditorConfig::load(&path) {
            Ok(config) => {
                info!("Loaded config from {}", path);
                config
            }
            Err(error) => {
                error!("{}", error);
                return;
            }
        },
        None => EditorConfig::default(),
    };

    if let Err(error) = demo::run_demo(&config) {
        error!("Demo failed: {}", error);
    }
}
