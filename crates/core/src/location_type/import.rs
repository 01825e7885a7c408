//! Type batch planning.

use std::collections::{HashMap, HashSet};

use chrono::Utc;

use locus_shared::types::LocationTypeId;

use super::hierarchy::creates_cycle;
use super::store::TypeHierarchyStore;
use super::types::{
    ImportMode, LocationTypeInput, LocationTypeNode, TypeImportReport, TypeRowOutcome,
    TypeRowReport,
};
use crate::error::{CatalogError, CatalogResult, ValidationError};
use crate::location::{LocationStore, Tombstones};

/// Rows to write plus the per-row report.
#[derive(Debug, Clone, Default)]
pub struct TypePlan {
    /// Accepted rows, ready for `TypeHierarchyStore::upsert`.
    pub writes: Vec<LocationTypeNode>,
    /// One entry per input row.
    pub report: TypeImportReport,
}

/// Validates a batch of location types against the stored hierarchy.
pub struct TypeImporter<'a> {
    types: &'a dyn TypeHierarchyStore,
    locations: &'a dyn LocationStore,
    root_type_name: &'a str,
}

impl<'a> TypeImporter<'a> {
    /// Creates an importer over the given stores.
    #[must_use]
    pub fn new(
        types: &'a dyn TypeHierarchyStore,
        locations: &'a dyn LocationStore,
        root_type_name: &'a str,
    ) -> Self {
        Self {
            types,
            locations,
            root_type_name,
        }
    }

    /// Plans a type batch.
    ///
    /// # Errors
    ///
    /// Store failures are always returned. Under [`ImportMode::AllOrNothing`]
    /// the first rejected row is returned as an error as well.
    pub async fn plan(
        &self,
        inputs: &[LocationTypeInput],
        mode: ImportMode,
    ) -> CatalogResult<TypePlan> {
        let partition = self.types.partition().clone();
        let stored: HashMap<String, LocationTypeNode> = self
            .types
            .list()
            .await?
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();

        let batch_parents: HashMap<&str, &str> = inputs
            .iter()
            .map(|i| (i.name.trim(), i.parent_name.trim()))
            .collect();
        let batch_names: HashSet<&str> = batch_parents.keys().copied().collect();

        let reparented: Vec<LocationTypeId> = inputs
            .iter()
            .filter_map(|i| stored.get(i.name.trim()))
            .filter(|t| batch_parents.get(t.name.as_str()) != Some(&t.parent_name.as_str()))
            .map(|t| t.id)
            .collect();
        let in_use = self.locations.types_in_use(&reparented).await?;

        let mut seen = HashSet::new();
        let mut checked = Vec::with_capacity(inputs.len());
        for input in inputs {
            match self.check_row(input, &stored, &batch_names, &in_use, &mut seen) {
                Err(err) if mode == ImportMode::AllOrNothing => return Err(err),
                result => checked.push(result),
            }
        }
        settle_rows(inputs, &stored, &mut checked, mode)?;

        let mut plan = TypePlan::default();
        let mut accepted: HashMap<String, LocationTypeId> = HashMap::new();

        for (idx, (input, checked)) in inputs.iter().zip(checked).enumerate() {
            let name = input.name.trim();
            let outcome = match checked {
                Ok(()) => {
                    let id = match stored.get(name) {
                        Some(existing) => existing.id,
                        None => self.revived_id(name).await?,
                    };
                    accepted.insert(name.to_string(), id);
                    let now = Utc::now();
                    plan.writes.push(LocationTypeNode {
                        id,
                        partition: partition.clone(),
                        name: name.to_string(),
                        display_name: input.display_name.trim().to_string(),
                        parent_name: input.parent_name.trim().to_string(),
                        parent_type_id: None,
                        level: stored.get(name).map_or(0, |t| t.level),
                        is_archived: input.is_archived,
                        deleted_at: None,
                        created_at: stored.get(name).map_or(now, |t| t.created_at),
                        updated_at: now,
                    });
                    TypeRowOutcome::Accepted { type_id: id }
                }
                Err(err) => TypeRowOutcome::Rejected {
                    message: err.to_string(),
                },
            };
            plan.report.rows.push(TypeRowReport {
                row_number: idx + 1,
                name: input.name.clone(),
                outcome,
            });
        }

        for write in &mut plan.writes {
            write.parent_type_id = accepted
                .get(&write.parent_name)
                .copied()
                .or_else(|| stored.get(&write.parent_name).map(|t| t.id));
        }

        Ok(plan)
    }

    fn check_row(
        &self,
        input: &LocationTypeInput,
        stored: &HashMap<String, LocationTypeNode>,
        batch_names: &HashSet<&str>,
        in_use: &HashSet<LocationTypeId>,
        seen: &mut HashSet<String>,
    ) -> CatalogResult<()> {
        let name = input.name.trim();
        let parent = input.parent_name.trim();

        if name.is_empty() {
            return Err(ValidationError::MissingField("name").into());
        }
        if input.display_name.trim().is_empty() {
            return Err(ValidationError::MissingField("display_name").into());
        }
        if name == self.root_type_name {
            return Err(ValidationError::ReservedType(name.to_string()).into());
        }
        if name == parent {
            return Err(ValidationError::SelfParenting(name.to_string()).into());
        }
        if !seen.insert(name.to_string()) {
            return Err(ValidationError::DuplicateTypeName(name.to_string()).into());
        }
        if !parent.is_empty() && !stored.contains_key(parent) && !batch_names.contains(parent) {
            return Err(ValidationError::UnknownType(parent.to_string()).into());
        }

        if let Some(existing) = stored.get(name)
            && existing.parent_name != parent
            && in_use.contains(&existing.id)
        {
            return Err(CatalogError::Conflict(format!(
                "location type {name} is in use and cannot change parent from {} to {parent}",
                existing.parent_name
            )));
        }
        Ok(())
    }

    async fn revived_id(&self, name: &str) -> CatalogResult<LocationTypeId> {
        Ok(self
            .types
            .get_by_name(name, Tombstones::Include)
            .await?
            .map_or_else(LocationTypeId::new, |t| t.id))
    }
}

/// Rejects rows whose parent survives neither in the store nor among the
/// accepted rows, and rows that close a cycle, until nothing changes.
///
/// Parents are looked up among accepted rows first, then in the store, so a
/// rejected row never hides the stored parent of its name.
fn settle_rows(
    inputs: &[LocationTypeInput],
    stored: &HashMap<String, LocationTypeNode>,
    checked: &mut [CatalogResult<()>],
    mode: ImportMode,
) -> CatalogResult<()> {
    let mut accepted: HashMap<&str, &str> = inputs
        .iter()
        .zip(checked.iter())
        .filter(|(_, result)| result.is_ok())
        .map(|(i, _)| (i.name.trim(), i.parent_name.trim()))
        .collect();

    loop {
        let mut changed = false;
        for (input, result) in inputs.iter().zip(checked.iter_mut()) {
            if result.is_err() {
                continue;
            }
            let name = input.name.trim();
            let parent = input.parent_name.trim();

            let parent_of = |n: &str| {
                accepted
                    .get(n)
                    .copied()
                    .or_else(|| stored.get(n).map(|t| t.parent_name.as_str()))
            };
            let rejection = if !parent.is_empty()
                && !accepted.contains_key(parent)
                && !stored.contains_key(parent)
            {
                Some(ValidationError::RejectedParentType(parent.to_string()))
            } else if creates_cycle(name, parent, parent_of) {
                Some(ValidationError::Cycle(name.to_string()))
            } else {
                None
            };

            if let Some(err) = rejection {
                if mode == ImportMode::AllOrNothing {
                    return Err(err.into());
                }
                accepted.remove(name);
                *result = Err(err.into());
                changed = true;
            }
        }
        if !changed {
            return Ok(());
        }
    }
}
