//! Searches one category through the indexes of related categories.

use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};
use crate::graph::{GraphStore, Transaction};
use crate::index::OptionsMap;
use crate::search::{GraphTransformation, Predicate, Query, SearchResult, Searcher};
use crate::types::Category;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One participant of a [`CompoundSearcher`].
pub struct SearchSpec {
    /// Category searched by `searcher`.
    pub category: Category,
    /// Searches `category`.
    pub searcher: Arc<dyn Searcher>,
    /// Maps ids of `category` onto the compound target; `None` for the
    /// default spec.
    pub transformation: Option<GraphTransformation>,
    /// Field labels this spec can answer.
    pub options: OptionsMap,
    /// Receives match-all queries and owns the target id space.
    pub is_default: bool,
}

impl SearchSpec {
    /// A spec over the target category itself.
    #[must_use]
    pub fn default_spec(searcher: Arc<dyn Searcher>, options: OptionsMap) -> Self {
        Self {
            category: options.category(),
            searcher,
            transformation: None,
            options,
            is_default: true,
        }
    }

    /// A spec over a related category whose ids reach the target through
    /// `transformation`.
    #[must_use]
    pub fn related(
        searcher: Arc<dyn Searcher>,
        options: OptionsMap,
        transformation: GraphTransformation,
    ) -> Self {
        Self {
            category: options.category(),
            searcher,
            transformation: Some(transformation),
            options,
            is_default: false,
        }
    }
}

impl fmt::Debug for SearchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchSpec")
            .field("category", &self.category)
            .field("transformation", &self.transformation)
            .field("is_default", &self.is_default)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct Hit {
    score: f64,
    matches: BTreeMap<String, Vec<String>>,
    origin: usize,
}

type Hits = BTreeMap<String, Hit>;

/// Evaluates a predicate by routing each subtree to the spec owning its
/// fields and combining the translated results.
///
/// A field belongs to the first spec (in registration order) whose options
/// contain it. A subtree whose fields all belong to one spec is handed to
/// that spec whole. Conjunctions intersect with summed scores; disjunctions
/// union with the best score. Results come back by score, then spec order,
/// then id.
pub struct CompoundSearcher {
    graph: Arc<GraphStore>,
    specs: Vec<SearchSpec>,
    default: usize,
}

impl CompoundSearcher {
    /// Validates and assembles the specs.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfiguration`] unless exactly one spec
    /// is the default, the default has no transformation, every other spec
    /// has one, and all transformations end in the same bucket.
    pub fn new(graph: Arc<GraphStore>, specs: Vec<SearchSpec>) -> CoreResult<Self> {
        let defaults: Vec<usize> = specs
            .iter()
            .enumerate()
            .filter(|(_, spec)| spec.is_default)
            .map(|(i, _)| i)
            .collect();
        let &[default] = defaults.as_slice() else {
            return Err(CoreError::invalid_configuration(format!(
                "compound search needs exactly one default spec, got {}",
                defaults.len()
            )));
        };
        let mut target = None;
        for spec in &specs {
            match (&spec.transformation, spec.is_default) {
                (Some(_), true) => {
                    return Err(CoreError::invalid_configuration(format!(
                        "default spec {} must not have a transformation",
                        spec.category
                    )))
                }
                (None, false) => {
                    return Err(CoreError::invalid_configuration(format!(
                        "spec {} needs a transformation",
                        spec.category
                    )))
                }
                (Some(transformation), false) => {
                    let bucket = transformation.target();
                    if *target.get_or_insert(bucket) != bucket {
                        return Err(CoreError::invalid_configuration(format!(
                            "spec {} translates into {bucket}, not {}",
                            spec.category,
                            target.unwrap_or(bucket)
                        )));
                    }
                }
                (None, true) => {}
            }
        }
        Ok(Self {
            graph,
            specs,
            default,
        })
    }

    /// The target category.
    #[must_use]
    pub fn category(&self) -> Category {
        self.specs[self.default].category
    }

    /// The specs in registration order.
    #[must_use]
    pub fn specs(&self) -> &[SearchSpec] {
        &self.specs
    }

    fn owner_of_label(&self, label: &str) -> Option<usize> {
        self.specs.iter().position(|spec| spec.options.contains(label))
    }

    /// The single spec owning every field of `predicate`, if there is one.
    fn owner(&self, predicate: &Predicate) -> Option<usize> {
        let mut owner = None;
        for label in predicate.labels() {
            let spec = self.owner_of_label(&label)?;
            match owner {
                None => owner = Some(spec),
                Some(current) if current == spec => {}
                Some(_) => return None,
            }
        }
        owner
    }

    fn eval(&self, ctx: &RequestContext, txn: &Transaction<'_>, predicate: &Predicate) -> CoreResult<Hits> {
        ctx.check_cancelled()?;
        if let Some(spec) = self.owner(predicate) {
            return self.run_spec(ctx, txn, spec, predicate);
        }
        match predicate {
            Predicate::MatchNone => Ok(Hits::new()),
            Predicate::MatchAll => self.run_spec(ctx, txn, self.default, predicate),
            Predicate::Field { label, .. } => Err(CoreError::invalid_query(format!(
                "unknown field {label:?} for {}",
                self.category()
            ))),
            Predicate::And(clauses) => {
                let mut clauses = clauses.iter();
                let Some(first) = clauses.next() else {
                    return self.run_spec(ctx, txn, self.default, &Predicate::MatchAll);
                };
                let mut acc = self.eval(ctx, txn, first)?;
                for clause in clauses {
                    let next = self.eval(ctx, txn, clause)?;
                    acc = intersect(acc, next);
                }
                Ok(acc)
            }
            Predicate::Or(clauses) => {
                let mut acc = Hits::new();
                for clause in clauses {
                    let next = self.eval(ctx, txn, clause)?;
                    union_into(&mut acc, next);
                }
                Ok(acc)
            }
        }
    }

    fn run_spec(
        &self,
        ctx: &RequestContext,
        txn: &Transaction<'_>,
        index: usize,
        predicate: &Predicate,
    ) -> CoreResult<Hits> {
        let spec = &self.specs[index];
        let results = spec.searcher.search(ctx, &Query::new(predicate.clone()))?;
        tracing::trace!(category = %spec.category, results = results.len(), "compound delegate");
        let mut hits = Hits::new();
        let Some(transformation) = &spec.transformation else {
            for result in results {
                hits.insert(
                    result.id,
                    Hit {
                        score: result.score,
                        matches: result.matches,
                        origin: index,
                    },
                );
            }
            return Ok(hits);
        };

        let ids: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
        let mapped = transformation.map_each(ctx, txn, &ids)?;
        for result in &results {
            for target in mapped.get(&result.id).into_iter().flatten() {
                let hit = Hit {
                    score: result.score,
                    matches: result.matches.clone(),
                    origin: index,
                };
                match hits.get_mut(target) {
                    Some(existing) => merge_best(existing, hit),
                    None => {
                        hits.insert(target.clone(), hit);
                    }
                }
            }
        }
        Ok(hits)
    }
}

fn merge_matches(into: &mut BTreeMap<String, Vec<String>>, from: BTreeMap<String, Vec<String>>) {
    for (label, values) in from {
        let slot = into.entry(label).or_default();
        for value in values {
            if !slot.contains(&value) {
                slot.push(value);
            }
        }
    }
}

/// Keeps the best score, then the earliest origin.
fn merge_best(existing: &mut Hit, other: Hit) {
    let better = match other.score.total_cmp(&existing.score) {
        Ordering::Greater => true,
        Ordering::Equal => other.origin < existing.origin,
        Ordering::Less => false,
    };
    if better {
        existing.score = other.score;
        existing.origin = other.origin;
    }
    merge_matches(&mut existing.matches, other.matches);
}

fn intersect(left: Hits, mut right: Hits) -> Hits {
    left.into_iter()
        .filter_map(|(id, mut hit)| {
            let other = right.remove(&id)?;
            hit.score += other.score;
            hit.origin = hit.origin.min(other.origin);
            merge_matches(&mut hit.matches, other.matches);
            Some((id, hit))
        })
        .collect()
}

fn union_into(acc: &mut Hits, other: Hits) {
    for (id, hit) in other {
        match acc.get_mut(&id) {
            Some(existing) => merge_best(existing, hit),
            None => {
                acc.insert(id, hit);
            }
        }
    }
}

impl Searcher for CompoundSearcher {
    fn search(&self, ctx: &RequestContext, query: &Query) -> CoreResult<Vec<SearchResult>> {
        let txn = self.graph.new_read_only_transaction();
        let hits = self.eval(ctx, &txn, &query.predicate)?;
        let mut ordered: Vec<(String, Hit)> = hits.into_iter().collect();
        ordered.sort_by(|(a_id, a), (b_id, b)| {
            b.score
                .total_cmp(&a.score)
                .then(a.origin.cmp(&b.origin))
                .then_with(|| a_id.cmp(b_id))
        });
        tracing::debug!(
            category = %self.category(),
            query = %query.predicate,
            results = ordered.len(),
            "compound search"
        );
        Ok(ordered
            .into_iter()
            .map(|(id, hit)| SearchResult {
                id,
                score: hit.score,
                matches: hit.matches,
            })
            .collect())
    }
}

impl fmt::Debug for CompoundSearcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompoundSearcher")
            .field("category", &self.category())
            .field("specs", &self.specs)
            .finish_non_exhaustive()
    }
}
