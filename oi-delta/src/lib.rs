//! # OI-Delta
//! Windowed open-interest delta tracking engine.
//!
//! Polled at a fixed cadence, an exchange reports its total open interest;
//! the tick-to-tick delta of that figure is fed, keyed by price bucket, into
//! a set of rolling-window accumulators so accelerations ("delta velocity")
//! surface as colored console output and threshold-triggered alerts.
//!
//! ## Components
//! - [`scheduler`]: delayed, cancellable callback execution shared by all
//!   windows (single dispatcher task over a min-heap, not a timer per delta).
//! - [`window`]: [`WindowedSum`](window::WindowedSum), one rolling-window
//!   accumulator whose contributions self-subtract on expiry.
//! - [`tracker`]: [`MultiWindowTracker`](tracker::MultiWindowTracker),
//!   several windows over one delta series plus last-delta/tick bookkeeping
//!   and snapshot rendering.
//! - [`registry`]: [`BucketRegistry`](registry::BucketRegistry), per-price-
//!   bucket trackers in parallel lifetime and session views.
//! - [`alert`]: [`AlertWatch`](alert::AlertWatch), threshold alerting over a
//!   lookback window with cooldown and reset semantics.
//! - [`engine`]: [`DeltaEngine`](engine::DeltaEngine), the per-tick pipeline
//!   driven by an external poll loop.
//!
//! External collaborators (market data source, notification sink) are
//! abstract contracts: [`engine::MarketSource`] and
//! [`alert::NotificationSink`]. The engine owns no wire protocol or on-disk
//! format; it is purely an in-process accumulator.

pub mod alert;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod render;
pub mod scheduler;
pub mod tracker;
pub mod window;

pub use alert::{AlertEvent, AlertWatch, NotificationSink};
pub use config::TrackerConfig;
pub use engine::{DeltaEngine, MarketSource, Tick, TickReport};
pub use error::{NotifyError, OiDeltaError, SourceError};
pub use registry::BucketRegistry;
pub use render::Style;
pub use scheduler::Scheduler;
pub use tracker::{MultiWindowTracker, SnapshotFields};
pub use window::WindowedSum;
