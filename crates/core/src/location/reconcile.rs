//! Batch reconciliation.
//!
//! Resolves externally keyed candidate records to internal nodes. Everything
//! the engine needs from the stores is fetched once into a [`BatchContext`];
//! per-record resolution is then a pure function of the candidate, the
//! context and the records accepted before it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use locus_shared::types::{LocationId, LocationTypeId};

use super::store::LocationStore;
use super::types::{
    AccessPath, ImportReport, LocationCandidate, LocationNode, ResolvedLocation, RowOutcome,
    RowReport, Tombstones,
};
use crate::error::{CatalogResult, ValidationError};
use crate::location_type::{LocationTypeNode, TypeHierarchyStore};

/// Where a candidate's parent comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    /// The partition root.
    Root,
    /// The accepted record of the batch with the parent's external key.
    Batch(usize),
    /// A persisted, non-deleted node with its stored path.
    Persisted(AccessPath),
}

/// Store state prefetched for one batch.
#[derive(Debug, Clone)]
pub struct BatchContext {
    root: LocationNode,
    root_type_name: String,
    now: DateTime<Utc>,
    /// Best persisted row per external key, tombstoned rows included.
    existing: HashMap<String, LocationNode>,
    /// Non-deleted rows per external key.
    live: HashMap<String, LocationNode>,
    types_by_name: HashMap<String, LocationTypeNode>,
    type_names: HashMap<LocationTypeId, String>,
    /// First batch index per external key.
    first_index: HashMap<String, usize>,
    /// Last batch index per external key.
    last_index: HashMap<String, usize>,
    /// Identity assigned to each external key of the batch.
    identities: HashMap<String, (LocationId, bool)>,
}

impl BatchContext {
    /// Builds a context from already loaded rows.
    #[must_use]
    pub fn new(
        candidates: &[LocationCandidate],
        root: LocationNode,
        root_type_name: &str,
        persisted: Vec<LocationNode>,
        types: Vec<LocationTypeNode>,
    ) -> Self {
        let mut existing: HashMap<String, LocationNode> = HashMap::new();
        for node in persisted {
            let better = existing
                .get(&node.partner_external_id)
                .is_none_or(|cur| prefer(&node, cur));
            if better {
                existing.insert(node.partner_external_id.clone(), node);
            }
        }
        let live = existing
            .iter()
            .filter(|(_, n)| !n.is_deleted())
            .map(|(k, n)| (k.clone(), n.clone()))
            .collect();

        let mut first_index = HashMap::new();
        let mut last_index = HashMap::new();
        let mut identities = HashMap::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            if candidate.partner_id.is_empty() {
                continue;
            }
            first_index.entry(candidate.partner_id.clone()).or_insert(idx);
            last_index.insert(candidate.partner_id.clone(), idx);
            identities
                .entry(candidate.partner_id.clone())
                .or_insert_with(|| match existing.get(&candidate.partner_id) {
                    Some(node) => (node.id, true),
                    None => (LocationId::new(), false),
                });
        }

        let type_names = types.iter().map(|t| (t.id, t.name.clone())).collect();
        let types_by_name = types.into_iter().map(|t| (t.name.clone(), t)).collect();

        Self {
            root,
            root_type_name: root_type_name.to_string(),
            now: Utc::now(),
            existing,
            live,
            types_by_name,
            type_names,
            first_index,
            last_index,
            identities,
        }
    }

    /// The fallback root.
    #[must_use]
    pub fn root(&self) -> &LocationNode {
        &self.root
    }

    fn stored_type_name(&self, node: &LocationNode) -> String {
        self.type_names
            .get(&node.type_id)
            .cloned()
            .unwrap_or_default()
    }

    fn check_edge(
        &self,
        candidate: &LocationCandidate,
        parent_type_name: &str,
    ) -> Result<(), ValidationError> {
        let expected = self
            .types_by_name
            .get(&candidate.type_name)
            .map(|ty| ty.parent_name.as_str());
        if expected == Some(parent_type_name) {
            Ok(())
        } else {
            Err(ValidationError::InvalidTypeEdge {
                child: candidate.type_name.clone(),
                parent: parent_type_name.to_string(),
            })
        }
    }
}

/// Live rows beat tombstones; among equals the most recently updated wins.
fn prefer(candidate: &LocationNode, current: &LocationNode) -> bool {
    match (candidate.is_deleted(), current.is_deleted()) {
        (false, true) => true,
        (true, false) => false,
        _ => candidate.updated_at > current.updated_at,
    }
}

/// Trims the text fields of a candidate.
#[must_use]
pub fn normalize(candidate: &LocationCandidate) -> LocationCandidate {
    LocationCandidate::new(
        candidate.partner_id.trim(),
        candidate.name.trim(),
        candidate.type_name.trim(),
        candidate.partner_parent_id.trim(),
    )
}

/// Resolves one candidate.
///
/// `accepted` maps the external keys accepted earlier in the batch to their
/// row index. When the parent's batch record comes later, the type edge is
/// left to [`reconcile_with`], which settles parents once every row is known.
///
/// # Errors
///
/// Returns the first rule the candidate violates.
pub fn resolve_candidate(
    candidates: &[LocationCandidate],
    idx: usize,
    ctx: &BatchContext,
    accepted: &HashMap<String, usize>,
) -> Result<(ResolvedLocation, ParentRef), ValidationError> {
    let candidate = &candidates[idx];

    if candidate.partner_id.is_empty() {
        return Err(ValidationError::MissingField("partner_internal_id"));
    }
    if candidate.name.is_empty() {
        return Err(ValidationError::MissingField("name"));
    }
    if candidate.type_name.is_empty() {
        return Err(ValidationError::MissingField("location_type"));
    }
    if candidate.partner_id == candidate.partner_parent_id {
        return Err(ValidationError::SelfParenting(candidate.partner_id.clone()));
    }

    let (id, persisted) = ctx
        .identities
        .get(&candidate.partner_id)
        .copied()
        .unwrap_or_else(|| (LocationId::new(), false));

    let parent_key = candidate.partner_parent_id.as_str();
    // Only an earlier accepted row fixes the parent's type. A later row
    // holds the slot until the whole batch has been walked.
    let earlier = accepted.get(parent_key).copied();
    let earlier_type = earlier.map(|j| candidates[j].type_name.clone());
    let batch_row = earlier.or_else(|| {
        ctx.last_index
            .get(parent_key)
            .copied()
            .filter(|&j| j > idx)
    });

    let (parent_id, parent_ref, parent_type_name) = if parent_key.is_empty() {
        (ctx.root.id, ParentRef::Root, Some(ctx.root_type_name.clone()))
    } else if let Some(parent) = ctx.live.get(parent_key) {
        let type_name = match batch_row {
            Some(_) => earlier_type,
            None => Some(ctx.stored_type_name(parent)),
        };
        (parent.id, ParentRef::Persisted(parent.access_path.clone()), type_name)
    } else if let (Some(j), Some(&(pid, _))) = (batch_row, ctx.identities.get(parent_key)) {
        (pid, ParentRef::Batch(j), earlier_type)
    } else if ctx.first_index.contains_key(parent_key) {
        return Err(ValidationError::RejectedParent(parent_key.to_string()));
    } else {
        return Err(ValidationError::MissingParent(parent_key.to_string()));
    };

    // A parent that is itself in the batch may move too; the batch-level
    // cycle pass covers that case.
    if let ParentRef::Persisted(path) = &parent_ref
        && batch_row.is_none()
        && persisted
        && path.contains(id)
    {
        return Err(ValidationError::Cycle(candidate.partner_id.clone()));
    }

    if candidate.type_name == ctx.root_type_name {
        return Err(ValidationError::ReservedType(candidate.type_name.clone()));
    }
    let ty = ctx
        .types_by_name
        .get(&candidate.type_name)
        .ok_or_else(|| ValidationError::UnknownType(candidate.type_name.clone()))?;
    if let Some(parent_type_name) = parent_type_name {
        ctx.check_edge(candidate, &parent_type_name)?;
    }

    if accepted.contains_key(&candidate.partner_id) {
        return Err(ValidationError::DuplicatePartnerId(candidate.partner_id.clone()));
    }

    let previous = ctx.existing.get(&candidate.partner_id);
    let node = LocationNode {
        id,
        partition: ctx.root.partition.clone(),
        name: candidate.name.clone(),
        type_id: ty.id,
        parent_id: Some(parent_id),
        partner_external_id: candidate.partner_id.clone(),
        partner_external_parent_id: candidate.partner_parent_id.clone(),
        access_path: AccessPath::root(ctx.root.id),
        is_archived: previous.is_some_and(|p| p.is_archived),
        deleted_at: None,
        created_at: previous.map_or(ctx.now, |p| p.created_at),
        updated_at: ctx.now,
    };
    node.validate_timestamps()?;

    Ok((ResolvedLocation { node, persisted }, parent_ref))
}

/// Accepted records plus the per-row report.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// Records ready for `LocationStore::upsert`, in batch order.
    pub accepted: Vec<ResolvedLocation>,
    /// One entry per candidate.
    pub report: ImportReport,
}

impl ReconcileOutcome {
    /// Ids whose access paths must be recomputed after the upsert.
    #[must_use]
    pub fn changed_ids(&self) -> Vec<LocationId> {
        self.accepted.iter().map(|r| r.node.id).collect()
    }
}

/// Resolves import batches against the stores.
pub struct ReconciliationEngine<'a> {
    locations: &'a dyn LocationStore,
    types: &'a dyn TypeHierarchyStore,
    root_type_name: &'a str,
}

impl<'a> ReconciliationEngine<'a> {
    /// Creates an engine over the given stores.
    #[must_use]
    pub fn new(
        locations: &'a dyn LocationStore,
        types: &'a dyn TypeHierarchyStore,
        root_type_name: &'a str,
    ) -> Self {
        Self {
            locations,
            types,
            root_type_name,
        }
    }

    /// Loads the store state needed to resolve `candidates`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn prefetch(
        &self,
        candidates: &[LocationCandidate],
        root: &LocationNode,
    ) -> CatalogResult<BatchContext> {
        let mut keys: Vec<String> = candidates
            .iter()
            .flat_map(|c| [c.partner_id.clone(), c.partner_parent_id.clone()])
            .filter(|k| !k.is_empty())
            .collect();
        keys.sort_unstable();
        keys.dedup();

        let persisted = self
            .locations
            .get_many_by_partner_ids(&keys, Tombstones::Include)
            .await?;
        let types = self.types.list().await?;

        Ok(BatchContext::new(
            candidates,
            root.clone(),
            self.root_type_name,
            persisted,
            types,
        ))
    }

    /// Resolves a batch. Rejections are per record; the engine writes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn reconcile(
        &self,
        candidates: &[LocationCandidate],
        root: &LocationNode,
    ) -> CatalogResult<ReconcileOutcome> {
        let candidates: Vec<LocationCandidate> = candidates.iter().map(normalize).collect();
        let ctx = self.prefetch(&candidates, root).await?;
        Ok(reconcile_with(&candidates, &ctx))
    }
}

/// Runs the resolution pass and the batch-level checks over `ctx`.
#[must_use]
pub fn reconcile_with(candidates: &[LocationCandidate], ctx: &BatchContext) -> ReconcileOutcome {
    let mut results: Vec<Result<(ResolvedLocation, ParentRef), ValidationError>> =
        Vec::with_capacity(candidates.len());
    let mut accepted_keys = HashMap::new();

    for idx in 0..candidates.len() {
        let result = resolve_candidate(candidates, idx, ctx, &accepted_keys);
        if result.is_ok() {
            accepted_keys.insert(candidates[idx].partner_id.clone(), idx);
        }
        results.push(result);
    }

    settle_parents(candidates, ctx, &mut results);
    reject_batch_cycles(candidates, &mut results);
    settle_parents(candidates, ctx, &mut results);

    let mut outcome = ReconcileOutcome::default();
    for (idx, result) in results.into_iter().enumerate() {
        let row = match result {
            Ok((resolved, _)) => {
                let row = RowOutcome::Accepted {
                    location_id: resolved.node.id,
                    persisted: resolved.persisted,
                };
                outcome.accepted.push(resolved);
                row
            }
            Err(err) => RowOutcome::Rejected {
                message: err.to_string(),
            },
        };
        outcome.report.rows.push(RowReport {
            row_number: idx + 1,
            partner_id: candidates[idx].partner_id.clone(),
            outcome: row,
        });
    }
    outcome
}

type Resolution = Result<(ResolvedLocation, ParentRef), ValidationError>;

/// Re-resolves every non-root parent against the rows still accepted, until
/// nothing changes.
///
/// A parent key with an accepted batch row takes that row's type. Without
/// one, a live persisted parent keeps its stored type; otherwise the child is
/// rejected.
fn settle_parents(
    candidates: &[LocationCandidate],
    ctx: &BatchContext,
    results: &mut [Resolution],
) {
    loop {
        let owners: HashMap<&str, usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_ok())
            .map(|(idx, _)| (candidates[idx].partner_id.as_str(), idx))
            .collect();

        let mut changed = false;
        for idx in 0..results.len() {
            let Ok((resolved, parent_ref)) = &results[idx] else {
                continue;
            };
            let candidate = &candidates[idx];
            let key = candidate.partner_parent_id.as_str();
            if key.is_empty() {
                continue;
            }

            let owner = owners.get(key).copied();
            let settled = match (owner, ctx.live.get(key)) {
                (Some(j), Some(parent)) => ctx
                    .check_edge(candidate, &candidates[j].type_name)
                    .map(|()| (parent.id, ParentRef::Persisted(parent.access_path.clone()))),
                (Some(j), None) => ctx
                    .check_edge(candidate, &candidates[j].type_name)
                    .map(|()| {
                        let parent_id = resolved.node.parent_id.unwrap_or(ctx.root.id);
                        (parent_id, ParentRef::Batch(j))
                    }),
                (None, Some(parent)) => ctx
                    .check_edge(candidate, &ctx.stored_type_name(parent))
                    .map(|()| (parent.id, ParentRef::Persisted(parent.access_path.clone()))),
                (None, None) => Err(ValidationError::RejectedParent(key.to_string())),
            };

            match settled {
                Ok((parent_id, settled_ref)) => {
                    if &settled_ref != parent_ref {
                        if let Ok((resolved, parent_ref)) = &mut results[idx] {
                            resolved.node.parent_id = Some(parent_id);
                            *parent_ref = settled_ref;
                        }
                        changed = true;
                    }
                }
                Err(err) => {
                    results[idx] = Err(err);
                    changed = true;
                }
            }
        }
        if !changed {
            return;
        }
    }
}

/// Rejects accepted records that would end up as their own ancestor.
fn reject_batch_cycles(candidates: &[LocationCandidate], results: &mut [Resolution]) {
    let index_of: HashMap<LocationId, usize> = results
        .iter()
        .enumerate()
        .filter_map(|(idx, r)| r.as_ref().ok().map(|(res, _)| (res.node.id, idx)))
        .collect();

    let next = |idx: usize| -> Option<usize> {
        match results[idx].as_ref().ok()? {
            (_, ParentRef::Root) => None,
            (_, ParentRef::Batch(j)) => results[*j].is_ok().then_some(*j),
            (_, ParentRef::Persisted(path)) => path
                .ids()
                .iter()
                .rev()
                .find_map(|id| index_of.get(id).copied()),
        }
    };

    let mut on_cycle = Vec::new();
    for start in 0..results.len() {
        if results[start].is_err() {
            continue;
        }
        let mut cursor = next(start);
        let mut steps = 0;
        while let Some(idx) = cursor {
            if idx == start {
                on_cycle.push(start);
                break;
            }
            steps += 1;
            if steps > results.len() {
                break;
            }
            cursor = next(idx);
        }
    }

    for idx in on_cycle {
        results[idx] = Err(ValidationError::Cycle(candidates[idx].partner_id.clone()));
    }
}
