/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types common across the sub-components of the consensus core.
//!
//! The types defined here are either:
//! 1. "Inert" newtypes with no active behavior ([`basic`]),
//! 2. Validator identities and validator sets ([`validators`]),
//! 3. Vertices and the headers that anchor them ([`vertex`]),
//! 4. Quorum and timeout certificates ([`certificates`]), or
//! 5. The generic signed-message machinery ([`signed_messages`]).
//!
//! Types specific to one sub-component can be found in the respective modules.

pub mod basic;

pub mod certificates;

pub mod signed_messages;

pub mod validators;

pub mod vertex;
