//! CLI glue for the Shoebutton Artistry automation toolkit.
//!
//! Argument parsing, configuration loading and the concrete storefront and
//! encoder API clients. All pipeline logic lives in `shoebutton-core`.

pub mod cli;
pub mod encoder;
pub mod load_config;
pub mod storefront;
