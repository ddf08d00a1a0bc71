//! # hotaru-core
//!
//! Service supervisor engine for monorepos.
//!
//! Builds and spawns a set of configured services, watches their directory
//! trees, and restarts a service when its sources change. A burst of edits
//! is debounced into a single rebuild cycle. Pairs with the `hotaru` CLI
//! for operator control.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use hotaru_core::{config, Supervisor};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cfg = config::load_config("hotaru.toml".as_ref()).unwrap();
//! let sup = Supervisor::new(cfg);
//!
//! // start everything, block until SIGINT/SIGTERM, then stop again
//! sup.run(&[], false).await.unwrap();
//! # }
//! ```

pub mod changes;
pub mod config;
pub mod output;
pub mod supervisor;
pub mod watch;

pub use config::{Config, ServiceSpec};
pub use supervisor::Supervisor;
pub use watch::Batcher;
