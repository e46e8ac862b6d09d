//! Files written for the site.
//!
//! # Submodules
//!
//! - [`json`]: the match snapshot, read at the start of a run and rewritten
//!   at the end
//! - [`standings`]: per-category league tables (optional)
//! - [`today`]: today's matches still waiting for a result (optional)
//! - [`attempts`]: how many runs each overdue match went without a result
//!
//! # Output Structure
//!
//! ```text
//! data/
//! ├── matches.json          # snapshot (`output`)
//! ├── standings.json        # league tables (`standings_output`)
//! ├── today.json            # today's open matches (`today_output`)
//! └── result_attempts.json  # result lookup ledger (`attempts_path`)
//! ```

pub mod attempts;
pub mod json;
pub mod standings;
pub mod today;
