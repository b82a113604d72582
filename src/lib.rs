//! # Meeting Grid
//!
//! Recovers the timetable of a 3GPP working-group meeting from the semi-structured tables of
//! its schedule documents and emits one normalized session list per day.
//!
//! ## Pipeline
//!
//! - **Grid extraction**: time blocks, day columns and room positions of every schedule table
//! - **Room resolution**: room names from colored label shapes, the room legend or headings
//! - **Time-slot aggregation**: the cells of all documents grouped by day and time block
//! - **Session reconciliation**: validated sessions with start and end times per room column
//! - **Category normalization**: a small canonical set of session categories
//!
//! The primary document is authoritative for rooms and room assignments; per-person documents
//! only add detail. Cell text is interpreted by a [`oracle::TextOracle`], either a hosted model
//! or the deterministic [`oracle::local::LocalOracle`], behind a memoizing
//! [`oracle::gateway::Gateway`].
//!
//! ## Example
//!
//! ```no_run
//! use meeting_grid::cache::FileStore;
//! use meeting_grid::config::Config;
//! use meeting_grid::oracle::gateway::CallPolicy;
//! use meeting_grid::oracle::gateway::Gateway;
//! use meeting_grid::oracle::local::LocalOracle;
//! use std::path::Path;
//!
//! let config = Config::default();
//! let oracle = Box::new(LocalOracle::new(&config.chairs));
//! let mut gateway = Gateway::new(oracle, FileStore::new(&config.cache_dir), CallPolicy::immediate());
//! let schedule = meeting_grid::pipeline::run(Path::new("RAN1#124.docx"), &[], &config, &mut gateway)?;
//! println!("{} sessions", schedule.session_count());
//! # Ok::<(), meeting_grid::error::MeetingGridError>(())
//! ```
pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod helpers;
pub mod oracle;
pub mod pipeline;
pub mod schedule;
