//! Core pipelines for Shoebutton Artistry automation.
//!
//! Business logic for the merchandising toolkit: bucket cataloguing with
//! display-name derivation, CSV export, concurrent bulk download, the sync
//! pipeline tying them together, embedding similarity math, and the
//! concrete Google Cloud Storage client.
//!
//! The CLI crate (`shoebutton`) supplies argument parsing, configuration
//! files and the concrete storefront/encoder API clients; everything it
//! calls into lives here behind the trait seams in [`contract`].

pub mod catalog;
pub mod contract;
pub mod csv_export;
pub mod error;
pub mod gcs;
pub mod names;
pub mod similarity;
pub mod synchronise;
pub mod transfer;
