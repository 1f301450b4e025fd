/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Stake-weighted aggregation of votes and timeout votes into certificates.

pub mod pending_votes;

pub mod validation_state;
