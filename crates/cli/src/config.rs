//! Command-line and environment configuration.
//!
//! Every flag can also be set through the environment (or a `.env` file,
//! loaded before parsing). Flags win over environment values.
//!
//! | Env var                          | Default                     |
//! |----------------------------------|-----------------------------|
//! | `JIRA_BASE_URL`                  | required                    |
//! | `JIRA_EMAIL`                     | required                    |
//! | `JIRA_API_TOKEN`                 | required                    |
//! | `POINTDOWN_JQL`                  | open sprint, assigned to me |
//! | `POINTDOWN_STATUSES`             | In Progress, Blocked, Need Reqs, Code Review, Testing, QA (comma separated; `any` for no filter) |
//! | `POINTDOWN_FIELD_ID`             | `customfield_10022`         |
//! | `POINTDOWN_LOCK_ENABLED`         | `true`                      |
//! | `POINTDOWN_LOCK_OWNER`           | the Jira email              |
//! | `POINTDOWN_REQUEST_TIMEOUT_SECS` | `20`                        |

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use pointdown_core::config::LockConfig;
use pointdown_core::field::{FieldResolver, DEFAULT_STORY_POINTS_FIELD_ID};
use pointdown_core::jql::{build_jql, DEFAULT_STATUS_FILTERS};
use pointdown_tracker::config::DEFAULT_REQUEST_TIMEOUT_SECS;
use pointdown_tracker::{TrackerConfig, TrackerError};

use crate::commands::Edit;

/// Field id value that switches to lookup by field name.
pub const FIELD_ID_AUTO: &str = "auto";

#[derive(Debug, Parser)]
#[command(name = "pointdown", version, about = "Edit Jira story points with lease-guarded saves")]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub sync: SyncArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the items matching the configured query
    List,
    /// Apply edits and save them
    ///
    /// Each edit is KEY=VALUE, KEY=+ or KEY=- (one half-point step).
    Save {
        #[arg(required = true, value_parser = Edit::parse)]
        edits: Vec<Edit>,
    },
    /// Rank an issue's numeric fields by closeness to a known value
    FindField {
        /// Issue whose story points are known
        #[arg(long)]
        issue: String,
        /// The known story points value
        #[arg(long)]
        target: f64,
        /// Candidates to print
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Check the credentials
    Whoami,
}

/// Jira site and credentials.
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    #[arg(long, env = "JIRA_BASE_URL")]
    pub base_url: String,

    #[arg(long, env = "JIRA_EMAIL")]
    pub email: String,

    #[arg(long, env = "JIRA_API_TOKEN", hide_env_values = true)]
    pub api_token: String,

    #[arg(long, env = "POINTDOWN_REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,
}

impl ConnectionArgs {
    pub fn tracker_config(&self) -> Result<TrackerConfig, TrackerError> {
        Ok(TrackerConfig::new(&self.base_url, &self.email, &self.api_token)?
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs)))
    }
}

/// What to list and how to save.
#[derive(Debug, Clone, Args)]
pub struct SyncArgs {
    /// Base JQL; the open-sprint query when unset
    #[arg(long, env = "POINTDOWN_JQL")]
    pub jql: Option<String>,

    /// Only list items in these statuses; `any` lists every status
    #[arg(
        long = "status",
        env = "POINTDOWN_STATUSES",
        value_delimiter = ',',
        default_values_t = default_statuses()
    )]
    pub statuses: Vec<String>,

    /// Story points field id, or `auto` to look it up by name
    #[arg(long, env = "POINTDOWN_FIELD_ID", default_value = DEFAULT_STORY_POINTS_FIELD_ID)]
    pub field_id: String,

    #[arg(
        long,
        env = "POINTDOWN_LOCK_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub lock_enabled: bool,

    /// Identity written into leases; defaults to the Jira email
    #[arg(long, env = "POINTDOWN_LOCK_OWNER")]
    pub lock_owner: Option<String>,
}

fn default_statuses() -> Vec<String> {
    DEFAULT_STATUS_FILTERS.iter().map(|s| s.to_string()).collect()
}

/// Resolved settings for one run.
#[derive(Debug)]
pub struct SyncSettings {
    pub jql: String,
    pub field: FieldResolver,
    pub lock: LockConfig,
}

impl SyncArgs {
    pub fn settings(&self, email: &str) -> SyncSettings {
        let owner = self
            .lock_owner
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or(email)
            .to_string();

        let lock = if self.lock_enabled {
            LockConfig::new(owner)
        } else {
            LockConfig::disabled(owner)
        };

        let field_id = self.field_id.trim();
        let field = if field_id.is_empty() || field_id.eq_ignore_ascii_case(FIELD_ID_AUTO) {
            FieldResolver::story_points_by_name()
        } else {
            FieldResolver::fixed(field_id)
        };

        SyncSettings {
            jql: build_jql(self.jql.as_deref(), &self.statuses),
            field,
            lock,
        }
    }
}
