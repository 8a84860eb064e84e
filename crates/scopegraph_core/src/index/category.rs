//! Inverted index of one category.

use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};
use crate::index::matcher::Matcher;
use crate::index::tokenizer::TokenizerConfig;
use crate::index::{Document, FieldKind, FieldValue, OptionsMap};
use crate::search::{by_score, Predicate, SearchResult};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

#[derive(Debug, Clone)]
struct Hit {
    score: f64,
    matches: BTreeMap<String, Vec<String>>,
}

type Hits = BTreeMap<String, Hit>;

/// Documents of one category plus postings for keyword, text and bool
/// fields. Numeric fields are matched by scanning.
#[derive(Debug)]
pub(crate) struct CategoryIndex {
    options: OptionsMap,
    tokenizer: TokenizerConfig,
    docs: BTreeMap<String, Document>,
    /// (field, term) -> ids
    postings: BTreeMap<(String, String), BTreeSet<String>>,
}

impl CategoryIndex {
    pub(crate) fn new(options: OptionsMap) -> Self {
        Self {
            options,
            tokenizer: TokenizerConfig::default(),
            docs: BTreeMap::new(),
            postings: BTreeMap::new(),
        }
    }

    pub(crate) fn options(&self) -> &OptionsMap {
        &self.options
    }

    pub(crate) fn len(&self) -> usize {
        self.docs.len()
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Document> {
        self.docs.get(id)
    }

    pub(crate) fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    pub(crate) fn clear(&mut self) {
        self.docs.clear();
        self.postings.clear();
    }

    pub(crate) fn upsert(&mut self, doc: Document) {
        self.remove(&doc.id);
        for (field, values) in &doc.fields {
            for term in self.terms(field, values) {
                self.postings
                    .entry((field.clone(), term))
                    .or_default()
                    .insert(doc.id.clone());
            }
        }
        self.docs.insert(doc.id.clone(), doc);
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        let Some(doc) = self.docs.remove(id) else {
            return false;
        };
        for (field, values) in &doc.fields {
            for term in self.terms(field, values) {
                let key = (field.clone(), term);
                if let Some(ids) = self.postings.get_mut(&key) {
                    ids.remove(id);
                    if ids.is_empty() {
                        self.postings.remove(&key);
                    }
                }
            }
        }
        true
    }

    fn terms(&self, field: &str, values: &[FieldValue]) -> BTreeSet<String> {
        let Some(kind) = self.options.get(field).map(|f| f.kind) else {
            return BTreeSet::new();
        };
        let mut terms = BTreeSet::new();
        for value in values {
            match (kind, value) {
                (FieldKind::Text, FieldValue::Text(text)) => {
                    terms.extend(self.tokenizer.tokenize(text));
                }
                (FieldKind::Keyword | FieldKind::Bool, value) => {
                    terms.insert(value.to_string().to_lowercase());
                }
                _ => {}
            }
        }
        terms
    }

    /// Evaluates `predicate`; results sorted by score, then id.
    pub(crate) fn search(&self, ctx: &RequestContext, predicate: &Predicate) -> CoreResult<Vec<SearchResult>> {
        let hits = self.eval(ctx, predicate)?;
        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .map(|(id, hit)| SearchResult {
                id,
                score: hit.score,
                matches: hit.matches,
            })
            .collect();
        results.sort_by(by_score);
        Ok(results)
    }

    fn eval(&self, ctx: &RequestContext, predicate: &Predicate) -> CoreResult<Hits> {
        ctx.check_cancelled()?;
        match predicate {
            Predicate::MatchAll => Ok(self
                .docs
                .keys()
                .map(|id| {
                    (
                        id.clone(),
                        Hit {
                            score: 0.0,
                            matches: BTreeMap::new(),
                        },
                    )
                })
                .collect()),
            Predicate::MatchNone => Ok(Hits::new()),
            Predicate::Field { label, value } => self.eval_field(label, value),
            Predicate::And(clauses) => {
                let mut iter = clauses.iter();
                let Some(first) = iter.next() else {
                    return self.eval(ctx, &Predicate::MatchAll);
                };
                let mut acc = self.eval(ctx, first)?;
                for clause in iter {
                    if acc.is_empty() {
                        break;
                    }
                    let next = self.eval(ctx, clause)?;
                    acc = intersect(acc, next);
                }
                Ok(acc)
            }
            Predicate::Or(clauses) => {
                let mut acc = Hits::new();
                for clause in clauses {
                    acc = union(acc, self.eval(ctx, clause)?);
                }
                Ok(acc)
            }
        }
    }

    fn eval_field(&self, label: &str, raw: &str) -> CoreResult<Hits> {
        let field = self.options.get(label).ok_or_else(|| {
            CoreError::invalid_query(format!(
                "unknown field {label:?} for category {}",
                self.options.category()
            ))
        })?;
        let key = label.to_lowercase();
        let matcher = Matcher::parse(field.kind, &field.label, raw, &self.tokenizer)?;

        let candidates: BTreeSet<&String> = match (&matcher, field.kind) {
            (Matcher::Exact(term), FieldKind::Keyword) => self.posting(&key, term).collect(),
            (Matcher::Bool(b), FieldKind::Bool) => self.posting(&key, &b.to_string()).collect(),
            (Matcher::Prefix(prefix), FieldKind::Keyword) => self
                .postings
                .range((
                    Bound::Included((key.clone(), prefix.clone())),
                    Bound::Unbounded,
                ))
                .take_while(|((field, term), _)| *field == key && term.starts_with(prefix.as_str()))
                .flat_map(|(_, ids)| ids.iter())
                .collect(),
            (Matcher::Tokens(tokens), _) => {
                let mut sets = tokens.iter().map(|token| self.posting(&key, token).collect::<BTreeSet<_>>());
                let first = sets.next().unwrap_or_default();
                sets.fold(first, |acc, set| acc.intersection(&set).copied().collect())
            }
            _ => self
                .docs
                .iter()
                .filter(|(_, doc)| doc.fields.contains_key(&key))
                .map(|(id, _)| id)
                .collect(),
        };

        let score = match &matcher {
            Matcher::Tokens(tokens) => self.token_score(&key, tokens),
            _ => 1.0,
        };

        let mut hits = Hits::new();
        for id in candidates {
            let Some(doc) = self.docs.get(id) else {
                continue;
            };
            let matched: Vec<String> = doc
                .get(&key)
                .iter()
                .filter(|value| matcher.matches(value, &self.tokenizer))
                .map(ToString::to_string)
                .collect();
            if matched.is_empty() {
                continue;
            }
            let mut matches = BTreeMap::new();
            matches.insert(field.label.clone(), matched);
            hits.insert(id.clone(), Hit { score, matches });
        }
        Ok(hits)
    }

    fn posting<'a>(&'a self, field: &str, term: &str) -> impl Iterator<Item = &'a String> {
        self.postings
            .get(&(field.to_string(), term.to_string()))
            .into_iter()
            .flat_map(|ids| ids.iter())
    }

    /// Mean inverse document frequency of the query tokens.
    fn token_score(&self, field: &str, tokens: &[String]) -> f64 {
        if tokens.is_empty() || self.docs.is_empty() {
            return 0.0;
        }
        let total = self.docs.len() as f64;
        let sum: f64 = tokens
            .iter()
            .map(|token| {
                let df = self.posting(field, token).count().max(1) as f64;
                1.0 + (total / df).ln()
            })
            .sum();
        sum / tokens.len() as f64
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

fn intersect(acc: Hits, mut next: Hits) -> Hits {
    acc.into_iter()
        .filter_map(|(id, mut hit)| {
            let other = next.remove(&id)?;
            hit.score += other.score;
            merge_matches(&mut hit.matches, other.matches);
            Some((id, hit))
        })
        .collect()
}

fn union(mut acc: Hits, next: Hits) -> Hits {
    for (id, hit) in next {
        match acc.get_mut(&id) {
            Some(existing) => {
                existing.score = existing.score.max(hit.score);
                merge_matches(&mut existing.matches, hit.matches);
            }
            None => {
                acc.insert(id, hit);
            }
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Schema;
    use crate::search::ids;
    use crate::types::Category;

    struct Cve {
        id: &'static str,
        cvss: f64,
        summary: &'static str,
        fixable: bool,
    }

    fn index() -> CategoryIndex {
        let schema = Schema::new(Category::new("cve"))
            .field("CVE", FieldKind::Keyword, |c: &Cve| vec![c.id.into()])
            .field("CVSS", FieldKind::Numeric, |c: &Cve| vec![c.cvss.into()])
            .field("CVE Summary", FieldKind::Text, |c: &Cve| vec![c.summary.into()])
            .field("Fixable", FieldKind::Bool, |c: &Cve| vec![c.fixable.into()]);
        let mut index = CategoryIndex::new(schema.validate().unwrap());
        for cve in [
            Cve { id: "CVE-2021-0001", cvss: 9.8, summary: "Heap overflow in libxml2", fixable: true },
            Cve { id: "CVE-2021-0002", cvss: 5.0, summary: "Stack overflow in parser", fixable: false },
            Cve { id: "CVE-2022-0003", cvss: 7.5, summary: "Heap use after free", fixable: true },
        ] {
            index.upsert(schema.project(cve.id, &cve));
        }
        index
    }

    fn search(index: &CategoryIndex, predicate: Predicate) -> CoreResult<Vec<SearchResult>> {
        index.search(&RequestContext::unrestricted(), &predicate)
    }

    #[test]
    fn keyword_exact_prefix_and_wildcard() {
        let index = index();
        let exact = search(&index, Predicate::field("cve", "\"cve-2021-0002\"")).unwrap();
        assert_eq!(ids(&exact), vec!["CVE-2021-0002"]);
        assert_eq!(exact[0].matches["CVE"], vec!["CVE-2021-0002"]);

        let prefix = search(&index, Predicate::field("CVE", "CVE-2021")).unwrap();
        assert_eq!(ids(&prefix), vec!["CVE-2021-0001", "CVE-2021-0002"]);

        assert_eq!(search(&index, Predicate::field("CVE", "*")).unwrap().len(), 3);
    }

    #[test]
    fn numeric_and_bool() {
        let index = index();
        let high = search(&index, Predicate::field("CVSS", ">=7")).unwrap();
        assert_eq!(ids(&high), vec!["CVE-2021-0001", "CVE-2022-0003"]);
        let range = search(&index, Predicate::field("CVSS", "5-7.5")).unwrap();
        assert_eq!(ids(&range), vec!["CVE-2021-0002", "CVE-2022-0003"]);
        let unfixable = search(&index, Predicate::field("Fixable", "false")).unwrap();
        assert_eq!(ids(&unfixable), vec!["CVE-2021-0002"]);
    }

    #[test]
    fn text_scores_rarer_tokens_higher() {
        let index = index();
        let heap = search(&index, Predicate::field("CVE Summary", "heap")).unwrap();
        assert_eq!(ids(&heap), vec!["CVE-2021-0001", "CVE-2022-0003"]);

        let both = search(
            &index,
            Predicate::Or(vec![
                Predicate::field("CVE Summary", "heap"),
                Predicate::field("CVE Summary", "libxml2"),
            ]),
        )
        .unwrap();
        assert_eq!(both[0].id, "CVE-2021-0001");
        assert!(both[0].score > both[1].score);
    }

    #[test]
    fn conjunction_sums_scores() {
        let index = index();
        let results = search(
            &index,
            Predicate::And(vec![
                Predicate::field("Fixable", "true"),
                Predicate::field("CVSS", ">9"),
            ]),
        )
        .unwrap();
        assert_eq!(ids(&results), vec!["CVE-2021-0001"]);
        assert!((results[0].score - 2.0).abs() < 1e-9);
        assert_eq!(results[0].matches.len(), 2);
    }

    #[test]
    fn remove_updates_postings() {
        let mut index = index();
        assert!(index.remove("CVE-2021-0001"));
        assert!(!index.remove("CVE-2021-0001"));
        let results = search(&index, Predicate::field("CVE Summary", "libxml2")).unwrap();
        assert!(results.is_empty());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn unknown_field_is_invalid() {
        let index = index();
        assert!(matches!(
            search(&index, Predicate::field("Namespace", "x")),
            Err(CoreError::InvalidQuery { .. })
        ));
    }
}
