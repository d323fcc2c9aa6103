//! CLI command implementations.
//!
//! | Module   | Commands handled                                   |
//! |----------|----------------------------------------------------|
//! | `run`    | `Run`                                              |
//! | `phase`  | `Plan`, `Status`, `Approve`, `Reject`, `Review`    |
//! | `config` | `Config`                                           |

pub mod config;
pub mod phase;
pub mod run;

pub use config::cmd_config;
pub use phase::{cmd_approve, cmd_plan, cmd_reject, cmd_review, cmd_status};
pub use run::{RunArgs, cmd_run};
