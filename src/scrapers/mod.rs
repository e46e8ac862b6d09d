//! Source scrapers for match fixtures.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | Federation calendar/results | [`federation`] | HTML table scraping | Sectioned tables, two column layouts |
//!
//! A scraper turns page HTML into [`crate::models::FixtureRow`]s. Fetching is
//! handled separately by [`crate::fetch`]; filtering and deduplication by
//! [`crate::filter`].

pub mod federation;
