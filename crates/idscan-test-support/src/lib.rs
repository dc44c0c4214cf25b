//! Test support utilities for idscan.
//!
//! Provides mocks for every core port, synthetic frame builders and
//! detector output builders for testing the detection pipeline.
//!
//! # Example
//!
//! ```
//! use idscan_test_support::{DetectorOutputBuilder, ScriptedModel, SyntheticFrameBuilder};
//!
//! // A 100x200 portrait frame
//! let frame = SyntheticFrameBuilder::solid(100, 200, [128, 128, 128]);
//!
//! // A model that always reports one box
//! let model = ScriptedModel::fixed(
//!     DetectorOutputBuilder::new()
//!         .candidate([0.4, 0.4, 0.2, 0.2], 0.9)
//!         .build(),
//! );
//! ```

mod builders;
mod mocks;

pub use builders::{DetectorOutputBuilder, SyntheticFrameBuilder};
pub use mocks::{
    FetchBehavior, InstrumentedScanner, MockCamera, MockFrameSource, MockModelFetcher,
    ScanBehavior, ScanRecord, ScriptedModel, StubCompiler, StubModel, COMPILED_PREFIX,
};
