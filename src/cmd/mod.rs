//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                   |
//! |-----------------|----------------------------------------------------|
//! | `project`       | `Init` (plus the `Project` workspace loader)       |
//! | `run`           | `Upload`, `Extract`, `Refine`, `Gear`              |
//! | `phase`         | `Status`, `Reset`                                  |
//! | `vault`         | `Select`, `Tree`, `Delete`, `Drift`                |
//! | `export`        | `Export`, `Key`                                    |
//! | `config`        | `Config`, `Chain`                                  |

pub mod config;
pub mod export;
pub mod phase;
pub mod project;
pub mod run;
pub mod vault;

pub use config::{cmd_chain, cmd_config};
pub use export::{cmd_export, cmd_key};
pub use phase::{cmd_reset, cmd_status};
pub use project::cmd_init;
pub use run::{cmd_extract, cmd_gear, cmd_refine, cmd_upload};
pub use vault::{cmd_delete, cmd_drift, cmd_select, cmd_tree};
