//! Applying titles and labels to catalog entries.
//!
//! Title edits run through an ordered list of [`TitleStrategy`] values. Each
//! strategy is followed by a re-fetch; the first one whose result verifies
//! wins. If none verifies, the failure is reported and the run continues.
//!
//! Label edits are a single check-then-act. Add failures propagate to the
//! caller; remove failures are swallowed.

use crate::catalog::{Catalog, CatalogError};
use crate::models::MediaEntry;
use crate::pacing::Pacer;
use tracing::{debug, info, warn};

/// Settings shared by every mutation in a run.
#[derive(Debug, Clone, Copy)]
pub struct MutationContext<'a> {
    pub dry_run: bool,
    pub pacer: &'a Pacer,
}

// ============================================================================
// Title Strategies
// ============================================================================

/// A way of writing a title to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleStrategy {
    /// Unlock the field, set the value, lock it again.
    LockedEdit,
    /// Raw metadata update setting the value and the lock flag together.
    DirectPut,
}

/// Strategies in the order they are tried.
pub const TITLE_STRATEGIES: [TitleStrategy; 2] = [TitleStrategy::LockedEdit, TitleStrategy::DirectPut];

impl TitleStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            TitleStrategy::LockedEdit => "locked edit",
            TitleStrategy::DirectPut => "direct PUT",
        }
    }

    fn apply<C: Catalog + ?Sized>(
        &self,
        catalog: &C,
        entry: &MediaEntry,
        title: &str,
        pacer: &Pacer,
    ) -> Result<(), CatalogError> {
        match self {
            TitleStrategy::LockedEdit => {
                let locks = catalog.supports_field_locks();
                if locks {
                    catalog.set_field_lock(entry, "title", false)?;
                }
                pacer.after_api_call();
                catalog.set_field(entry, "title", title)?;
                pacer.after_api_call();
                if locks {
                    catalog.set_field_lock(entry, "title", true)?;
                }
                pacer.after_api_call();
            }
            TitleStrategy::DirectPut => {
                pacer.after_api_call();
                catalog.put_metadata(entry, &[("title.value", title), ("title.locked", "1")])?;
                pacer.after_api_call();
            }
        }
        Ok(())
    }
}

/// Result of a title edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleOutcome {
    /// The title already matched.
    Unchanged,
    /// Dry run; nothing was sent.
    WouldUpdate,
    /// Verified on the server after the given strategy.
    Updated(TitleStrategy),
    /// No strategy produced the desired title.
    Unverified,
}

/// Bring an entry's title to `desired`, trying each strategy in turn.
///
/// On success `entry` is replaced by the re-fetched server copy.
pub fn edit_title<C: Catalog + ?Sized>(
    catalog: &C,
    entry: &mut MediaEntry,
    desired: &str,
    ctx: &MutationContext<'_>,
) -> TitleOutcome {
    let current = entry.title.clone();
    if current == desired {
        return TitleOutcome::Unchanged;
    }
    if ctx.dry_run {
        info!("    - DRY RUN: '{}' -> '{}'", current, desired);
        return TitleOutcome::WouldUpdate;
    }

    for strategy in TITLE_STRATEGIES {
        if let Err(e) = strategy.apply(catalog, entry, desired, ctx.pacer) {
            debug!("title {} failed for {} '{}': {}", strategy.name(), entry.kind, current, e);
            continue;
        }
        match catalog.fetch(entry) {
            Ok(fresh) if fresh.title == desired => {
                *entry = fresh;
                match strategy {
                    TitleStrategy::LockedEdit => info!("    - Updated title: '{}'", desired),
                    _ => info!("    - Updated title ({}): '{}'", strategy.name(), desired),
                }
                return TitleOutcome::Updated(strategy);
            }
            Ok(fresh) => debug!(
                "title {} not applied for {} '{}': server has '{}'",
                strategy.name(),
                entry.kind,
                current,
                fresh.title
            ),
            Err(e) => debug!("re-fetch after {} failed: {}", strategy.name(), e),
        }
    }

    warn!(
        "    - WARN: failed to update {} title '{}' -> '{}'",
        entry.kind, current, desired
    );
    TitleOutcome::Unverified
}

// ============================================================================
// Labels
// ============================================================================

/// Result of a label check-then-act.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelOutcome {
    /// Already in the desired state.
    Unchanged,
    WouldChange,
    Changed,
    /// Best-effort removal failed and was ignored.
    Ignored(String),
}

/// Add `label` unless the entry already carries it. Errors propagate.
pub fn add_label_if_missing<C: Catalog + ?Sized>(
    catalog: &C,
    entry: &mut MediaEntry,
    label: &str,
    ctx: &MutationContext<'_>,
) -> Result<LabelOutcome, CatalogError> {
    if entry.has_label(label) {
        return Ok(LabelOutcome::Unchanged);
    }
    if ctx.dry_run {
        info!("  - DRY RUN: would add label '{}' to {}: {}", label, entry.kind, entry.title);
        return Ok(LabelOutcome::WouldChange);
    }
    ctx.pacer.after_api_call();
    catalog.add_label(entry, label)?;
    entry.labels.push(label.to_string());
    info!("  - Added label '{}' to {}: {}", label, entry.kind, entry.title);
    Ok(LabelOutcome::Changed)
}

/// Remove `label` if present. Failures are logged and ignored.
pub fn remove_label_if_present<C: Catalog + ?Sized>(
    catalog: &C,
    entry: &mut MediaEntry,
    label: &str,
    ctx: &MutationContext<'_>,
) -> LabelOutcome {
    if !entry.has_label(label) {
        return LabelOutcome::Unchanged;
    }
    if ctx.dry_run {
        info!("  - DRY RUN: would remove label '{}' from {}: {}", label, entry.kind, entry.title);
        return LabelOutcome::WouldChange;
    }
    ctx.pacer.after_api_call();
    match catalog.remove_label(entry, label) {
        Ok(()) => {
            entry.labels.retain(|l| !l.eq_ignore_ascii_case(label));
            info!("  - Removed label '{}' from {}: {}", label, entry.kind, entry.title);
            LabelOutcome::Changed
        }
        Err(e) => {
            debug!("label removal ignored for {} '{}': {}", entry.kind, entry.title, e);
            LabelOutcome::Ignored(e.to_string())
        }
    }
}
