//! Subcommand implementations.

use std::collections::HashMap;
use std::fmt;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use pointdown_core::discovery::{rank_numeric_fields, DEFAULT_TOLERANCE};
use pointdown_core::error::CoreError;
use pointdown_core::item::{parse_value, LocalItem};
use pointdown_core::store::{FieldStore, PropertyStore};
use pointdown_sync::error::SyncError;
use pointdown_sync::lock::LockManager;
use pointdown_sync::orchestrator::{BatchReport, ItemOutcome, ItemReport, SyncOrchestrator};
use pointdown_tracker::TrackerApi;

use crate::config::SyncSettings;

pub type Orchestrator = SyncOrchestrator<TrackerApi, TrackerApi>;

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

/// A change requested on the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    StepUp,
    StepDown,
    Set(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub key: String,
    pub change: Change,
}

impl Edit {
    /// Parse `KEY=VALUE`, `KEY=+` or `KEY=-`.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let (key, change) = input
            .split_once('=')
            .ok_or_else(|| CoreError::Validation(format!("Expected KEY=VALUE, got '{input}'")))?;

        let key = key.trim();
        if key.is_empty() {
            return Err(CoreError::Validation(format!("Missing issue key in '{input}'")));
        }

        let change = match change.trim() {
            "+" => Change::StepUp,
            "-" => Change::StepDown,
            value => Change::Set(parse_value(value)?),
        };

        Ok(Self {
            key: key.to_uppercase(),
            change,
        })
    }

    pub fn apply(&self, item: &mut LocalItem) -> f64 {
        match self.change {
            Change::StepUp => item.step_up(),
            Change::StepDown => item.step_down(),
            Change::Set(value) => item.set_edited(value),
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub async fn list(sync: &Orchestrator, jql: &str) -> anyhow::Result<ExitCode> {
    let items = sync.refresh(jql).await?;
    let field = sync.field().await?;

    tracing::debug!(jql, field_id = %field.id, "Listed items");
    print!("{}", ItemTable(&items));
    Ok(ExitCode::SUCCESS)
}

/// Apply `edits` to fresh reads of their items and save the dirty ones.
pub async fn save(sync: &Orchestrator, edits: &[Edit]) -> anyhow::Result<ExitCode> {
    let report = apply_and_save(sync, edits).await?;
    print!("{}", ReportView(&report));

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Load each edited item, apply its edits and batch-save the result.
///
/// Items that cannot be loaded are reported as failed alongside the batch
/// results instead of stopping the save; their later edits are skipped.
/// Only a field resolution failure aborts.
pub async fn apply_and_save<F, P>(
    sync: &SyncOrchestrator<F, P>,
    edits: &[Edit],
) -> Result<BatchReport, SyncError>
where
    F: FieldStore,
    P: PropertyStore,
{
    sync.field().await?;

    let mut items: Vec<LocalItem> = Vec::new();
    let mut unloadable = BatchReport::default();

    for edit in edits {
        if unloadable.items.iter().any(|r| r.key == edit.key) {
            continue;
        }
        let position = match items.iter().position(|item| item.key == edit.key) {
            Some(position) => position,
            None => match sync.load(&edit.key).await {
                Ok(item) => {
                    items.push(item);
                    items.len() - 1
                }
                Err(error) => {
                    tracing::warn!(entity_key = %edit.key, error = %error, "Could not load item");
                    unloadable.items.push(ItemReport {
                        key: edit.key.clone(),
                        outcome: ItemOutcome::Failed { error },
                    });
                    continue;
                }
            },
        };
        let value = edit.apply(&mut items[position]);
        tracing::debug!(entity_key = %edit.key, value, "Edit applied");
    }

    let mut report = sync.save_dirty_batch(&mut items).await?;
    report.items.extend(unloadable.items);
    Ok(report)
}

pub async fn find_field(
    api: &TrackerApi,
    issue: &str,
    target: f64,
    limit: usize,
) -> anyhow::Result<ExitCode> {
    let found = api
        .fetch_issue_with_names(issue)
        .await
        .with_context(|| format!("Could not read {issue}"))?;

    let schema_types: HashMap<String, String> = match api.field_schema_types().await {
        Ok(types) => types,
        Err(e) => {
            tracing::warn!(error = %e, "Field catalog unavailable; schema types omitted");
            HashMap::new()
        }
    };

    let report = rank_numeric_fields(
        &found.fields,
        &found.names,
        &schema_types,
        target,
        DEFAULT_TOLERANCE,
    );

    if report.candidates.is_empty() {
        println!("{} has no numeric fields", found.key);
        return Ok(ExitCode::FAILURE);
    }

    println!("{:<24} {:>10}  {:<10} NAME", "FIELD", "VALUE", "TYPE");
    for field in report.candidates.iter().take(limit) {
        println!(
            "{:<24} {:>10}  {:<10} {}",
            field.id,
            field.value,
            field.schema_type.as_deref().unwrap_or("-"),
            field.name,
        );
    }

    match report.best() {
        Some(best) if !report.exact.is_empty() => {
            println!("\nSet POINTDOWN_FIELD_ID={} ({})", best.id, best.name);
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            println!("\nNo field equals {target}");
            Ok(ExitCode::FAILURE)
        }
    }
}

pub async fn whoami(api: &TrackerApi) -> anyhow::Result<ExitCode> {
    let me = api.myself().await.context("Authentication check failed")?;
    println!(
        "{} <{}> ({})",
        me.display_name.as_deref().unwrap_or("-"),
        me.email_address.as_deref().unwrap_or("-"),
        me.account_id,
    );
    Ok(ExitCode::SUCCESS)
}

/// Shared tracker client used for both the field and property stores.
pub fn orchestrator(api: Arc<TrackerApi>, settings: SyncSettings) -> Orchestrator {
    let locks = LockManager::new(Arc::clone(&api), settings.lock);
    SyncOrchestrator::new(api, locks, settings.field)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

struct ItemTable<'a>(&'a [LocalItem]);

impl fmt::Display for ItemTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No items");
        }
        let width = self.0.iter().map(|i| i.key.len()).max().unwrap_or(0).max(3);
        writeln!(f, "{:<width$} {:>6}  SUMMARY", "KEY", "POINTS")?;
        for item in self.0 {
            writeln!(f, "{:<width$} {:>6}  {}", item.key, item.current(), item.summary)?;
        }
        Ok(())
    }
}

struct ReportView<'a>(&'a BatchReport);

impl fmt::Display for ReportView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.0.items {
            match &item.outcome {
                ItemOutcome::Saved { written, drift } if *drift != 0.0 => writeln!(
                    f,
                    "saved  {} = {written} (remote changed by {drift:+})",
                    item.key
                )?,
                ItemOutcome::Saved { written, .. } => writeln!(f, "saved  {} = {written}", item.key)?,
                ItemOutcome::Failed { error } => writeln!(f, "FAILED {}: {error}", item.key)?,
            }
        }
        writeln!(f, "{} saved, {} failed", self.0.saved(), self.0.failed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pointdown_core::item::Entity;
    use pointdown_core::config::LockConfig;
    use pointdown_core::field::FieldResolver;
    use pointdown_sync::error::LockError;
    use pointdown_sync::memory::InMemoryTracker;

    fn item(key: &str, value: f64) -> LocalItem {
        LocalItem::from_entity(Entity {
            key: key.into(),
            id: Some(1),
            summary: "Login page".into(),
            field_value: value,
        })
    }

    #[test]
    fn parses_steps_and_values() {
        assert_eq!(
            Edit::parse("abc-1=+").unwrap(),
            Edit { key: "ABC-1".into(), change: Change::StepUp }
        );
        assert_eq!(Edit::parse("ABC-2=-").unwrap().change, Change::StepDown);
        assert_eq!(Edit::parse("ABC-3=2,5").unwrap().change, Change::Set(2.5));
    }

    #[test]
    fn rejects_malformed_edits() {
        assert_matches!(Edit::parse("ABC-1"), Err(CoreError::Validation(_)));
        assert_matches!(Edit::parse("=3"), Err(CoreError::Validation(_)));
        assert!(Edit::parse("ABC-1=lots").is_err());
    }

    #[test]
    fn repeated_steps_accumulate() {
        let mut item = item("ABC-1", 2.0);
        let up = Edit::parse("ABC-1=+").unwrap();
        up.apply(&mut item);
        up.apply(&mut item);
        assert_eq!(item.current(), 3.0);
        assert!(item.is_dirty());
    }

    #[test]
    fn table_lists_current_values() {
        let mut items = vec![item("ABC-1", 2.0), item("ABC-12", 0.0)];
        items[1].set_edited(1.5);

        let out = ItemTable(&items).to_string();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "KEY    POINTS  SUMMARY");
        assert_eq!(lines[1], "ABC-1       2  Login page");
        assert_eq!(lines[2], "ABC-12    1.5  Login page");
    }

    #[test]
    fn report_shows_drift_and_failures() {
        let report = BatchReport {
            items: vec![
                ItemReport {
                    key: "ABC-1".into(),
                    outcome: ItemOutcome::Saved { written: 2.0, drift: -1.0 },
                },
                ItemReport {
                    key: "ABC-2".into(),
                    outcome: ItemOutcome::Failed {
                        error: SyncError::Lock(LockError::MissingEntityId {
                            entity_key: "ABC-2".into(),
                        }),
                    },
                },
            ],
        };

        let out = ReportView(&report).to_string();
        assert!(out.contains("saved  ABC-1 = 2 (remote changed by -1)"));
        assert!(out.contains("FAILED ABC-2: ABC-2 has no numeric id"));
        assert!(out.ends_with("1 saved, 1 failed\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn unloadable_key_does_not_stop_other_saves() {
        let store = Arc::new(InMemoryTracker::new());
        store.insert_entity("ABC-1", Some(1), "Login page", 1.0);
        store.insert_entity("ABC-3", Some(3), "Session timeout", 2.0);
        let locks = LockManager::new(Arc::clone(&store), LockConfig::new("alice"));
        let sync = SyncOrchestrator::new(Arc::clone(&store), locks, FieldResolver::fixed("f"));

        let edits: Vec<Edit> = ["ABC-1=3", "NOPE-9=2", "ABC-3=1", "NOPE-9=+"]
            .into_iter()
            .map(|e| Edit::parse(e).unwrap())
            .collect();
        let report = apply_and_save(&sync, &edits).await.unwrap();

        assert_eq!(report.saved(), 2);
        assert_eq!(report.failed(), 1);
        let (key, error) = report.failures().next().unwrap();
        assert_eq!(key, "NOPE-9");
        assert_matches!(error, SyncError::Fetch { .. });
        assert_eq!(store.remote_value("ABC-1"), Some(3.0));
        assert_eq!(store.remote_value("ABC-3"), Some(1.0));
    }
}
