use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::mapping::FieldMapper;
use crate::models::*;
use crate::storage::{CategoryStore, CategoryTx};

/// Longest ancestor chain walked before a proposed parent link is refused.
const MAX_ANCESTOR_DEPTH: usize = 256;

/// Categories fetched together in one pass, indexed by source id.
#[derive(Debug, Clone, Default)]
pub struct CategoryBatch {
    items: Vec<SourceCategory>,
    by_id: HashMap<i64, usize>,
}

impl CategoryBatch {
    pub fn new(items: Vec<SourceCategory>) -> Self {
        let by_id = items.iter().enumerate().map(|(idx, c)| (c.id, idx)).collect();
        Self { items, by_id }
    }

    pub fn get(&self, source_id: i64) -> Option<&SourceCategory> {
        self.by_id.get(&source_id).map(|idx| &self.items[*idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceCategory> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedParent {
    /// Parent was not fetched in this pass, typically an unchanged parent
    /// filtered out by the watermark.
    NotInBatch(i64),
    ParentWithoutHandle(i64),
    NotInDestination(Handle),
}

#[derive(Debug, Clone)]
enum ParentResolution {
    Root,
    Found(DestinationCategory),
    Unresolved(UnresolvedParent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentLink {
    /// Root category, or nothing to resolve.
    None,
    Linked(String),
    AlreadyLinked,
    /// The link would close a cycle in the tree as it stood before the
    /// batch; it is retried by the linking pass.
    Deferred,
    Unresolved(UnresolvedParent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryAction {
    Created(String),
    Updated { id: String, fields: Vec<String> },
    Unchanged(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub action: CategoryAction,
    pub parent: ParentLink,
}

pub struct CategoryReconciler {
    store: Arc<dyn CategoryStore>,
    mapper: FieldMapper,
}

impl CategoryReconciler {
    pub fn new(store: Arc<dyn CategoryStore>) -> Self {
        Self { store, mapper: FieldMapper::new() }
    }

    /// Two passes: every category is upserted first, then parent links are
    /// resolved, so a child listed before its parent still gets linked and a
    /// move that is only cyclic mid-batch lands in the second pass.
    /// Failures are logged and counted per item; a refused link is counted
    /// in `link_failed` without undoing the item's field changes.
    pub async fn reconcile_batch(&self, batch: &CategoryBatch) -> CategoryReport {
        let mut report = CategoryReport { seen: batch.len() as i64, ..Default::default() };
        let mut failed: HashSet<i64> = HashSet::new();

        for source in batch.iter() {
            match self.reconcile_one(source, batch).await {
                Ok(outcome) => {
                    match &outcome.action {
                        CategoryAction::Created(_) => report.created += 1,
                        CategoryAction::Updated { .. } => report.updated += 1,
                        CategoryAction::Unchanged(_) => report.unchanged += 1,
                    }
                    if matches!(outcome.parent, ParentLink::Linked(_)) {
                        report.linked += 1;
                    }
                    // Handle-less children cannot be found again in the linking pass
                    if source.handle().is_empty() && matches!(outcome.parent, ParentLink::Unresolved(_)) {
                        report.unresolved += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(magento_id = source.id, handle = %source.handle(), error = %e, "Failed to reconcile category");
                    report.failed += 1;
                    failed.insert(source.id);
                }
            }
        }

        for source in batch.iter() {
            if failed.contains(&source.id) || source.parent_source_id().is_none() || source.handle().is_empty() {
                continue;
            }
            match self.link_parent(source, batch).await {
                Ok(ParentLink::Linked(_)) => report.linked += 1,
                Ok(ParentLink::Unresolved(_)) => report.unresolved += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(magento_id = source.id, handle = %source.handle(), error = %e, "Failed to link category parent");
                    report.link_failed += 1;
                }
            }
        }

        tracing::info!(
            seen = report.seen,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            linked = report.linked,
            unresolved = report.unresolved,
            failed = report.failed,
            link_failed = report.link_failed,
            "Category reconciliation finished"
        );
        report
    }

    /// Creates or partially updates the destination category for `source`
    /// inside one unit of work.
    pub async fn reconcile_one(&self, source: &SourceCategory, batch: &CategoryBatch) -> Result<ReconcileOutcome> {
        let mut tx = self.store.begin().await?;
        let result = self.upsert_in(tx.as_mut(), source, batch).await;
        finish(tx, result).await
    }

    /// Links an already reconciled category to its parent when the parent is
    /// resolvable and differs from the current link.
    pub async fn link_parent(&self, source: &SourceCategory, batch: &CategoryBatch) -> Result<ParentLink> {
        let mut tx = self.store.begin().await?;
        let result = self.link_in(tx.as_mut(), source, batch).await;
        finish(tx, result).await
    }

    async fn upsert_in(&self, tx: &mut dyn CategoryTx, source: &SourceCategory, batch: &CategoryBatch) -> Result<ReconcileOutcome> {
        let fields = self.mapper.normalize_category(source);
        let existing = if fields.handle.is_empty() {
            None
        } else {
            tx.find_by_handle(&fields.handle).await?
        };

        let existing = match existing {
            Some(existing) => existing,
            None => {
                let (parent_category_id, rank, parent) = match self.resolve_parent(tx, source, batch).await? {
                    ParentResolution::Found(p) => (Some(p.id.clone()), Some(source.position), ParentLink::Linked(p.id)),
                    ParentResolution::Root => (None, None, ParentLink::None),
                    ParentResolution::Unresolved(reason) => (None, None, ParentLink::Unresolved(reason)),
                };
                let created = tx.create(NewCategory { fields, parent_category_id, rank }).await?;
                tracing::info!(category_id = %created.id, handle = %created.handle, magento_id = source.id, "Created category");
                return Ok(ReconcileOutcome { action: CategoryAction::Created(created.id), parent });
            }
        };

        let mut update = self.mapper.diff_category(&existing, &fields);
        let parent = match self.resolve_parent(tx, source, batch).await? {
            ParentResolution::Found(p) if existing.parent_category_id.as_deref() != Some(p.id.as_str()) => {
                match ensure_acyclic(tx, &existing, &p).await {
                    Ok(()) => {
                        update.parent_category_id = Some(p.id.clone());
                        update.rank = Some(source.position);
                        ParentLink::Linked(p.id)
                    }
                    Err(SyncError::CategoryCycle { .. }) => {
                        tracing::debug!(
                            category_id = %existing.id,
                            parent_id = %p.id,
                            "Parent link closes a cycle in the current tree; deferring to the linking pass"
                        );
                        ParentLink::Deferred
                    }
                    Err(e) => return Err(e),
                }
            }
            ParentResolution::Found(_) => ParentLink::AlreadyLinked,
            ParentResolution::Root => ParentLink::None,
            ParentResolution::Unresolved(reason) => ParentLink::Unresolved(reason),
        };

        if update.is_empty() {
            tracing::debug!(category_id = %existing.id, handle = %existing.handle, "Category unchanged");
            return Ok(ReconcileOutcome { action: CategoryAction::Unchanged(existing.id), parent });
        }

        let changed = update.changed_fields();
        tx.update(&existing.id, &update).await?;
        tracing::info!(category_id = %existing.id, handle = %existing.handle, fields = ?changed, "Updated category");
        Ok(ReconcileOutcome { action: CategoryAction::Updated { id: existing.id, fields: changed }, parent })
    }

    async fn link_in(&self, tx: &mut dyn CategoryTx, source: &SourceCategory, batch: &CategoryBatch) -> Result<ParentLink> {
        let handle = source.handle();
        if handle.is_empty() {
            return Ok(ParentLink::None);
        }
        let child = match tx.find_by_handle(&handle).await? {
            Some(child) => child,
            None => return Ok(ParentLink::None),
        };

        match self.resolve_parent(tx, source, batch).await? {
            ParentResolution::Found(parent) if child.parent_category_id.as_deref() != Some(parent.id.as_str()) => {
                ensure_acyclic(tx, &child, &parent).await?;
                let update = CategoryUpdate {
                    parent_category_id: Some(parent.id.clone()),
                    rank: Some(source.position),
                    ..Default::default()
                };
                tx.update(&child.id, &update).await?;
                tracing::info!(category_id = %child.id, parent_id = %parent.id, "Linked category to parent");
                Ok(ParentLink::Linked(parent.id))
            }
            ParentResolution::Found(_) => Ok(ParentLink::AlreadyLinked),
            ParentResolution::Root => Ok(ParentLink::None),
            ParentResolution::Unresolved(reason) => {
                tracing::warn!(
                    category_id = %child.id,
                    handle = %handle,
                    reason = ?reason,
                    "Parent not resolvable in this pass; leaving parent link unchanged"
                );
                Ok(ParentLink::Unresolved(reason))
            }
        }
    }

    async fn resolve_parent(&self, tx: &mut dyn CategoryTx, source: &SourceCategory, batch: &CategoryBatch) -> Result<ParentResolution> {
        let parent_id = match source.parent_source_id() {
            Some(id) => id,
            None => return Ok(ParentResolution::Root),
        };
        let parent = match batch.get(parent_id) {
            Some(parent) => parent,
            None => return Ok(ParentResolution::Unresolved(UnresolvedParent::NotInBatch(parent_id))),
        };
        let parent_handle = parent.handle();
        if parent_handle.is_empty() {
            return Ok(ParentResolution::Unresolved(UnresolvedParent::ParentWithoutHandle(parent_id)));
        }
        Ok(match tx.find_by_handle(&parent_handle).await? {
            Some(found) => ParentResolution::Found(found),
            None => ParentResolution::Unresolved(UnresolvedParent::NotInDestination(parent_handle)),
        })
    }
}

/// Refuses to make `child` a descendant of itself. Chains longer than
/// `MAX_ANCESTOR_DEPTH` are treated as already cyclic.
async fn ensure_acyclic(tx: &mut dyn CategoryTx, child: &DestinationCategory, parent: &DestinationCategory) -> Result<()> {
    let cycle = || SyncError::CategoryCycle {
        handle: child.handle.to_string(),
        parent_handle: parent.handle.to_string(),
    };

    let mut current = Some(parent.clone());
    for _ in 0..MAX_ANCESTOR_DEPTH {
        let category = match current {
            Some(category) => category,
            None => return Ok(()),
        };
        if category.id == child.id {
            return Err(cycle());
        }
        current = match category.parent_category_id.as_deref() {
            Some(next) => tx.find_by_id(next).await?,
            None => None,
        };
    }
    Err(cycle())
}

async fn finish<T>(tx: Box<dyn CategoryTx>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(abort_err) = tx.abort().await {
                tracing::warn!(error = %abort_err, "Failed to abort category unit of work");
            }
            Err(e)
        }
    }
}
