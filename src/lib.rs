//! The library code for the `penumbra` static site generator. The architecture
//! can be generally broken down into two distinct steps:
//!
//! 1. Parsing posts from source files on disk ([`crate::parser`]) and
//!    assembling them into an ordered [`crate::index::PostIndex`]
//! 2. Converting the index into output files on disk ([`crate::write`] and
//!    [`crate::feed`])
//!
//! The second step renders two kinds of pages: paginated listing pages, where
//! the first page is the site's home page, and one page per post linking to
//! its chronological neighbors. Every page sees the theme preference owned by
//! a [`crate::theme::PreferenceStore`], so the theme's templates can emit the
//! right root class and `theme-color` for light or dark mode.
//!
//! [`crate::build::build_site`] ties the steps together.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod feed;
pub mod index;
pub mod markdown;
pub mod meta;
pub mod parser;
pub mod post;
pub mod theme;
pub mod url;
pub mod write;
