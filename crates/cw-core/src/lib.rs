//! Canvas Warden Core
//!
//! The control loop that keeps a canvas region matching its orders:
//! - Loads the order list and refreshes it on a timer
//! - Diffs orders against the live canvas (scan-first or collect-all)
//! - Gates collect-all placements to avoid colliding with other defenders
//! - Submits placements and sleeps through each credential's cooldown
//! - Keeps one bearer token per configured account
//!
//! # Example
//!
//! ```rust,ignore
//! use cw_core::prelude::*;
//!
//! # async fn example(ctx: LoopContext) {
//! let mut placement = PlacementLoop::new(ctx, 0);
//! let report = placement.cycle().await;
//! println!("{:?}, next cycle in {:?}", report.outcome, report.delay);
//! # }
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod agent;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod logging;
pub mod orders;
pub mod reconcile;
pub mod scheduler;
pub mod types;

// Re-exports for convenience
pub use agent::Warden;
pub use clock::{Clock, SystemClock};
pub use config::{AgentConfig, ConfigOverrides, TokenSourceKind};
pub use credentials::{
    parse_sessions, CredentialPool, PassthroughTokenSource, SessionPageTokenSource, TokenSource,
};
pub use error::{ConfigError, CredentialError, FeedError, GatewayError, WardenError};
pub use gate::CollisionGate;
pub use gateway::{parse_placement_response, GraphqlGateway, PlacementGateway, PlacementResult};
pub use orders::{HttpOrderFeed, OrderFeed, OrderStore};
pub use reconcile::Reconciler;
pub use scheduler::{CycleOutcome, CycleReport, LoopContext, LoopState, PlacementLoop, Timings};
pub use types::{Credential, Order, OrderSnapshot, PlacementTarget, SelectionMode, WrongPixel};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wiring an agent
    pub use crate::{
        AgentConfig, Clock, CollisionGate, Credential, CredentialPool, CycleOutcome, LoopContext,
        Order, OrderStore, PlacementGateway, PlacementLoop, PlacementResult, Reconciler,
        SelectionMode, Timings, Warden,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
