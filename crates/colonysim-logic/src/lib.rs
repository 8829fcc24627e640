//! Pure rules and data tables for the colony simulation.
//!
//! This crate holds everything that does not need engine state: constants,
//! the time-budget balance table, static item/recipe/fixture definitions,
//! the runtime flag set, the seeded random stream and name generation.
//! Functions take plain data and return results, so they are unit-testable
//! on their own and shared by the engine and the host binary.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`balance`] | Needs budgets in game-hours and the per-second conversions |
//! | [`config`] | Runtime flag set (`SimFlags`) and steering tuning |
//! | [`constants`] | Pool limits, tick rate, mover and job timing |
//! | [`fixtures`] | Furniture, workshop and animal definitions |
//! | [`items`] | Item types, materials, stack limits, containers, clothing, tools |
//! | [`names`] | Seeded mover name generation |
//! | [`recipes`] | Multi-stage construction recipes and workshop recipes |
//! | [`rng`] | Seeded LCG random stream |
//! | [`signals`] | Double-buffered signal grid with a NOR latch layout |

pub mod balance;
pub mod config;
pub mod constants;
pub mod fixtures;
pub mod items;
pub mod names;
pub mod recipes;
pub mod rng;
pub mod signals;
