//! MobiGait - On-device motion-signal core for step counting and gait quality
//!
//! MobiGait turns raw phone sensor samples into step records and gait results
//! through a synchronous pipeline: sample buffering → walking detection →
//! step counting → gait feature extraction → rule-based classification.
//!
//! ## Modules
//!
//! - **Step Tracking**: Hardware or accelerometer step counting with day rollover
//! - **Gait Analysis**: Cadence, variability, and symmetry over walking windows
//! - **Persistence**: Record store abstraction with a background write queue

pub mod buffer;
pub mod calendar;
pub mod classifier;
pub mod config;
pub mod error;
pub mod features;
pub mod metrics;
pub mod pipeline;
pub mod profile;
pub mod step_counter;
pub mod store;
pub mod types;
pub mod walking;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use classifier::GaitClassifier;
pub use config::MotionConfig;
pub use error::{MotionError, StoreError};
pub use features::GaitFeatureExtractor;
pub use metrics::{BodyMassIndex, MetricsAggregator, StepMetrics};
pub use pipeline::{MotionProcessor, SharedMotionProcessor};
pub use profile::{ProfileProvider, UserProfile};
pub use store::{MemoryStore, PersistenceQueue, RecordSink, StepStore};
pub use types::{GaitResult, GaitStatus, MotionEvent, SensorEvent, StepRecord};

/// MobiGait version
pub const MOBIGAIT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "mobigait";
