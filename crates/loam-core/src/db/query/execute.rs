use crate::{
    db::{
        instance::{EntityInstance, RecordId},
        query::{
            FindOptions,
            predicate::Predicate,
            translate::{
                TranslatedPredicate, TranslateError, translate, translate_scoped,
                validate_populate,
            },
        },
        registry::EntityRegistry,
        store::{StoragePort, StoredRow},
    },
    error::EngineError,
    model::{entity::EntityModel, relation::{RelationKind, RelationModel}},
    obs::sink::{self, MetricsEvent, PlanKind},
    value::{RecordRef, Value, compare_eq, compare_order, contains},
};
use std::cmp::Ordering;

///
/// PopulatePlan
///

pub(crate) struct PopulatePlan {
    relation: &'static RelationModel,
    filter: Option<TranslatedPredicate>,
}

///
/// PreparedFind
///
/// Fully validated find: root predicate plus populate plans. Preparation is
/// the only place translation errors can surface; execution reports storage
/// and invariant failures only.
///

pub(crate) struct PreparedFind {
    predicate: TranslatedPredicate,
    populate: Vec<PopulatePlan>,
}

/// Validate a find call against the registry.
pub(crate) fn prepare(
    registry: &EntityRegistry,
    model: &'static EntityModel,
    predicate: &Predicate,
    options: &FindOptions,
) -> Result<PreparedFind, TranslateError> {
    let translated = translate(registry, model, predicate)?;
    validate_populate(model, options.populate_list())?;

    let mut populate = Vec::new();
    for name in options.populate_list() {
        // validate_populate established the relation exists and owns many.
        let Some(relation) = model.relation(name) else {
            continue;
        };
        let filter = match options.populate_filter() {
            Some(predicate) => {
                let target = registry.describe(relation.target).map_err(|_| {
                    TranslateError::UnknownRelation {
                        entity: model.entity_name.to_string(),
                        relation: name.clone(),
                    }
                })?;
                Some(translate_scoped(registry, target, predicate)?)
            }
            None => None,
        };
        populate.push(PopulatePlan { relation, filter });
    }

    Ok(PreparedFind {
        predicate: translated,
        populate,
    })
}

///
/// QueryExecutor
///
/// Stateless per-call executor over one storage port.
///

pub(crate) struct QueryExecutor<'a, P: StoragePort + ?Sized> {
    registry: &'a EntityRegistry,
    port: &'a P,
}

impl<'a, P: StoragePort + ?Sized> QueryExecutor<'a, P> {
    pub(crate) const fn new(registry: &'a EntityRegistry, port: &'a P) -> Self {
        Self { registry, port }
    }

    /// Run one prepared find and materialize matched roots.
    pub(crate) fn execute(
        &self,
        prepared: &PreparedFind,
    ) -> Result<Vec<EntityInstance>, EngineError> {
        let model = prepared.predicate.model();
        let candidates = self.candidates(&prepared.predicate)?;
        sink::record(MetricsEvent::RowsScanned {
            entity: model.entity_name,
            rows: candidates.len() as u64,
        });

        let mut out = Vec::new();
        for row in candidates {
            if !self.eval(model, &row, prepared.predicate.root())? {
                continue;
            }

            let root_id = row.id;
            let mut instance = EntityInstance::materialize(model, row.id, row.fields);
            for plan in &prepared.populate {
                self.populate(&mut instance, root_id, plan)?;
            }
            out.push(instance);
        }

        Ok(out)
    }

    // Candidate selection: push the first top-level containment conjunct
    // down to the engine when it has a native membership operator.
    fn candidates(&self, translated: &TranslatedPredicate) -> Result<Vec<StoredRow>, EngineError> {
        let entity = translated.model().entity_name;

        if self.port.native_containment()
            && let Some((field, needle)) = translated.containment_pushdown()
        {
            sink::record(MetricsEvent::Plan {
                kind: PlanKind::Containment,
            });
            return self.port.scan_containing(entity, field, needle);
        }

        sink::record(MetricsEvent::Plan {
            kind: PlanKind::FullScan,
        });
        self.port.scan(entity)
    }

    // Evaluate one predicate against one row. Missing fields never match.
    fn eval(
        &self,
        model: &'static EntityModel,
        row: &StoredRow,
        predicate: &Predicate,
    ) -> Result<bool, EngineError> {
        match predicate {
            Predicate::True => Ok(true),
            Predicate::False => Ok(false),

            Predicate::And(children) => {
                for child in children {
                    if !self.eval(model, row, child)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(children) => {
                for child in children {
                    if self.eval(model, row, child)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Not(inner) => Ok(!self.eval(model, row, inner)?),

            Predicate::Eq { field, value } => Ok(row
                .fields
                .get(field)
                .is_some_and(|actual| compare_eq(actual, value).unwrap_or(false))),

            Predicate::Contains { field, needle } => Ok(row
                .fields
                .get(field)
                .is_some_and(|actual| contains(actual, needle))),

            Predicate::Related {
                relation,
                predicate,
            } => self.eval_related(model, row, relation, predicate),
        }
    }

    // A related predicate holds when at least one related instance matches.
    fn eval_related(
        &self,
        model: &'static EntityModel,
        row: &StoredRow,
        relation_name: &str,
        inner: &Predicate,
    ) -> Result<bool, EngineError> {
        let Some(relation) = model.relation(relation_name) else {
            return Err(EngineError::query_invariant(format!(
                "relation '{relation_name}' missing after translation"
            )));
        };
        let target = self.registry.describe(relation.target)?;

        match relation.kind {
            RelationKind::OwningMany => {
                for child in self.children_of(relation, row.id)? {
                    if self.eval(target, &child, inner)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            RelationKind::OwnedByOne => match row.fields.get(relation.fk_field) {
                Some(Value::Ref(RecordRef::Persisted(id))) => {
                    let owner = self.port.get(relation.target, *id)?;
                    self.eval(target, &owner, inner)
                }
                _ => Ok(false),
            },
        }
    }

    // Fetch the owned rows of one relation for one owner identity.
    fn children_of(
        &self,
        relation: &RelationModel,
        owner_id: RecordId,
    ) -> Result<Vec<StoredRow>, EngineError> {
        let owner_ref = Value::Ref(RecordRef::Persisted(owner_id));
        let rows = self.port.scan(relation.target)?;
        sink::record(MetricsEvent::RowsScanned {
            entity: relation.target,
            rows: rows.len() as u64,
        });

        Ok(rows
            .into_iter()
            .filter(|row| row.fields.get(relation.fk_field) == Some(&owner_ref))
            .collect())
    }

    // Eagerly fetch one relation for a matched root, applying the populate
    // filter to the relation only.
    fn populate(
        &self,
        root: &mut EntityInstance,
        root_id: RecordId,
        plan: &PopulatePlan,
    ) -> Result<(), EngineError> {
        let relation = plan.relation;
        let target = self.registry.describe(relation.target)?;

        let mut children = self.children_of(relation, root_id)?;
        if let Some(filter) = &plan.filter {
            let mut kept = Vec::with_capacity(children.len());
            for child in children {
                if self.eval(target, &child, filter.root())? {
                    kept.push(child);
                }
            }
            children = kept;
        }

        if let Some(ordering) = relation.ordering {
            children.sort_by(|a, b| match (a.fields.get(ordering), b.fields.get(ordering)) {
                (Some(lhs), Some(rhs)) => compare_order(lhs, rhs).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            });
        }

        let instances = children
            .into_iter()
            .map(|row| EntityInstance::materialize(target, row.id, row.fields))
            .collect();
        root.put_related(relation.name, instances);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{flush, store::MemoryStore},
        test_support::{NoNativeStore, pending_graph, registry, screening_contains},
    };

    fn seeded_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        let (mut pending, _) = pending_graph(3);
        flush::execute(&mut store, &mut pending, None).expect("seed flush succeeds");

        store
    }

    fn find_roots(
        store: &dyn StoragePort,
        predicate: &Predicate,
        options: &FindOptions,
    ) -> Vec<EntityInstance> {
        let registry = registry();
        let model = registry.describe("screening").expect("kind registered");
        let prepared =
            prepare(&registry, model, predicate, options).expect("preparation succeeds");

        QueryExecutor::new(&registry, store)
            .execute(&prepared)
            .expect("execution succeeds")
    }

    #[test]
    fn related_predicate_matches_through_owning_many() {
        let store = seeded_store();
        let matched = find_roots(
            &store,
            &Predicate::related("drills", Predicate::eq("position", Value::Uint(2))),
            &FindOptions::new(),
        );
        assert_eq!(matched.len(), 1);

        let missed = find_roots(
            &store,
            &Predicate::related("drills", Predicate::eq("position", Value::Uint(9))),
            &FindOptions::new(),
        );
        assert!(missed.is_empty());
    }

    #[test]
    fn related_predicate_matches_through_owned_by_one() {
        let store = seeded_store();
        let registry = registry();
        let model = registry.describe("drill").expect("kind registered");
        let prepared = prepare(
            &registry,
            model,
            &Predicate::related(
                "screening",
                Predicate::eq("kind", Value::Enum("compare_images".into())),
            ),
            &FindOptions::new(),
        )
        .expect("preparation succeeds");

        let matched = QueryExecutor::new(&registry, &store)
            .execute(&prepared)
            .expect("execution succeeds");
        assert_eq!(matched.len(), 3, "every drill shares the one screening");
    }

    #[test]
    fn pushdown_and_enumeration_agree() {
        let native = seeded_store();
        let fallback = NoNativeStore::seeded();

        let predicate = Predicate::and([
            screening_contains("4"),
            Predicate::eq("kind", Value::Enum("compare_images".into())),
        ]);
        let from_native = find_roots(&native, &predicate, &FindOptions::new());
        let from_fallback = find_roots(&fallback, &predicate, &FindOptions::new());

        assert_eq!(from_native.len(), 1);
        assert_eq!(from_fallback.len(), 1);
        assert_eq!(
            from_native[0].record_id(),
            from_fallback[0].record_id()
        );
    }

    #[test]
    fn populate_where_narrows_the_relation_not_the_root() {
        let store = seeded_store();
        let options = FindOptions::new()
            .populate("drills")
            .populate_where(Predicate::eq("position", Value::Uint(9)));
        let matched = find_roots(&store, &screening_contains("4"), &options);

        // Root still matches; its populated collection is empty.
        assert_eq!(matched.len(), 1);
        assert!(matched[0].related("drills").is_empty());
    }

    #[test]
    fn populated_children_come_back_ordered() {
        let store = seeded_store();
        let options = FindOptions::new().populate("drills");
        let matched = find_roots(&store, &Predicate::True, &options);

        let positions: Vec<_> = matched[0]
            .related("drills")
            .iter()
            .map(|child| child.get("position").cloned())
            .collect();
        assert_eq!(
            positions,
            vec![
                Some(Value::Uint(1)),
                Some(Value::Uint(2)),
                Some(Value::Uint(3))
            ]
        );
    }
}
