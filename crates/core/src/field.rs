//! Resolution of the tracked field's id.
//!
//! The story-points field is a custom field whose id differs per tracker
//! instance. [`FieldResolver`] is injected into the sync engine at
//! construction; it resolves once (fixed id, or a name lookup against the
//! field catalog) and reuses the result for the rest of its lifetime.

use tokio::sync::OnceCell;

use crate::store::{FieldDef, FieldStore};

/// Field id the resolver falls back to when nothing else is configured.
pub const DEFAULT_STORY_POINTS_FIELD_ID: &str = "customfield_10022";

/// Names tried, case-insensitively, when resolving by name.
pub const STORY_POINTS_FIELD_NAMES: &[&str] = &[
    "Story Points",
    "Story Point Estimate",
    "Story points",
    "Story Point",
];

/// A resolved field id plus a display name for messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub id: String,
    pub name: String,
}

/// Errors from [`FieldResolver::resolve`].
#[derive(Debug, thiserror::Error)]
pub enum ResolveError<E> {
    #[error("Field catalog lookup failed: {0}")]
    Store(E),

    #[error("No field named any of {candidates:?}")]
    NotFound { candidates: Vec<String> },
}

/// Lazily resolved, then cached, field id.
#[derive(Debug)]
pub struct FieldResolver {
    candidates: Vec<String>,
    resolved: OnceCell<ResolvedField>,
}

impl FieldResolver {
    /// Resolver that always answers `id` without touching the catalog.
    pub fn fixed(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            candidates: Vec::new(),
            resolved: OnceCell::new_with(Some(ResolvedField {
                name: format!("{id} (fixed)"),
                id,
            })),
        }
    }

    /// Resolver that looks the field up by name on first use.
    pub fn by_name<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
            resolved: OnceCell::new(),
        }
    }

    /// Name lookup over [`STORY_POINTS_FIELD_NAMES`].
    pub fn story_points_by_name() -> Self {
        Self::by_name(STORY_POINTS_FIELD_NAMES.iter().copied())
    }

    /// The resolved field, if resolution already happened.
    pub fn cached(&self) -> Option<&ResolvedField> {
        self.resolved.get()
    }

    /// Return the cached field or fetch the catalog and resolve it.
    pub async fn resolve<S>(&self, store: &S) -> Result<&ResolvedField, ResolveError<S::Error>>
    where
        S: FieldStore + ?Sized,
    {
        self.resolved
            .get_or_try_init(|| async {
                let fields = store.list_fields().await.map_err(ResolveError::Store)?;
                let found = match_by_name(&fields, &self.candidates).ok_or_else(|| {
                    ResolveError::NotFound {
                        candidates: self.candidates.clone(),
                    }
                })?;

                tracing::info!(field_id = %found.id, field_name = %found.name, "Resolved tracked field");

                Ok::<_, ResolveError<S::Error>>(ResolvedField {
                    id: found.id.clone(),
                    name: found.name.clone(),
                })
            })
            .await
    }
}

/// First field (in catalog order) whose name equals any candidate, ignoring case.
pub fn match_by_name<'a>(fields: &'a [FieldDef], candidates: &[String]) -> Option<&'a FieldDef> {
    fields.iter().find(|f| {
        let name = f.name.to_lowercase();
        candidates.iter().any(|c| c.to_lowercase() == name)
    })
}
