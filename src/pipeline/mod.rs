/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event admission pipeline: [verifier](verifier::EventVerifier) →
//! [preprocessor](preprocessor::EventPreprocessor) → [reducer](reducer::EventReducer).
//!
//! Each stage is an explicit, separately-testable transformation; "forward to the next stage" is
//! an ordinary function call, driven in order by [`ConsensusCore`](crate::core::ConsensusCore).

pub mod preprocessor;

pub mod reducer;

pub mod verifier;
