//! Compound search pipelines.
//!
//! Spec order decides which category answers a field present in several of
//! them; vulnerability fields are always answered by the CVE category first.

use crate::error::{CoreError, CoreResult};
use crate::graph::GraphStore;
use crate::index::Indexer;
use crate::schema::categories::{buckets, categories};
use crate::search::{CategorySearcher, CompoundSearcher, GraphTransformation, SearchSpec};
use crate::types::Category;
use std::sync::Arc;

fn from(bucket: scopegraph_codec::BucketHandler) -> GraphTransformation {
    GraphTransformation::starting_at(bucket)
}

fn default_spec(indexer: &Arc<Indexer>, category: Category) -> CoreResult<SearchSpec> {
    Ok(SearchSpec::default_spec(
        Arc::new(CategorySearcher::new(Arc::clone(indexer), category)),
        indexer.options(category)?,
    ))
}

fn related(indexer: &Arc<Indexer>, category: Category, path: GraphTransformation) -> CoreResult<SearchSpec> {
    Ok(SearchSpec::related(
        Arc::new(CategorySearcher::new(Arc::clone(indexer), category)),
        indexer.options(category)?,
        path,
    ))
}

/// Categories with a compound pipeline.
pub const COMPOUND_CATEGORIES: [Category; 5] = [
    categories::IMAGE,
    categories::COMPONENT,
    categories::CVE,
    categories::DEPLOYMENT,
    categories::COMPONENT_CVE_EDGE,
];

/// Builds the compound searcher of `target`.
///
/// # Errors
///
/// Returns [`CoreError::UnknownCategory`] when a participating category is
/// not registered, or [`CoreError::InvalidConfiguration`] for a target
/// without a pipeline.
pub fn compound_searcher(
    graph: Arc<GraphStore>,
    indexer: &Arc<Indexer>,
    target: Category,
) -> CoreResult<CompoundSearcher> {
    use categories::{COMPONENT, COMPONENT_CVE_EDGE, CVE, DEPLOYMENT, IMAGE, NODE};

    let specs = match target {
        IMAGE => vec![
            related(indexer, CVE, from(buckets::CVE).backward(buckets::COMPONENT).backward(buckets::IMAGE))?,
            related(indexer, COMPONENT, from(buckets::COMPONENT).backward(buckets::IMAGE))?,
            default_spec(indexer, IMAGE)?,
            related(indexer, DEPLOYMENT, from(buckets::DEPLOYMENT).forward(buckets::IMAGE))?,
        ],
        COMPONENT => vec![
            related(indexer, CVE, from(buckets::CVE).backward(buckets::COMPONENT))?,
            default_spec(indexer, COMPONENT)?,
            related(indexer, IMAGE, from(buckets::IMAGE).forward(buckets::COMPONENT))?,
            related(
                indexer,
                DEPLOYMENT,
                from(buckets::DEPLOYMENT)
                    .forward(buckets::IMAGE)
                    .forward(buckets::COMPONENT),
            )?,
            related(indexer, NODE, from(buckets::NODE).forward(buckets::COMPONENT))?,
        ],
        CVE => vec![
            default_spec(indexer, CVE)?,
            related(indexer, COMPONENT, from(buckets::COMPONENT).forward(buckets::CVE))?,
            related(
                indexer,
                IMAGE,
                from(buckets::IMAGE).forward(buckets::COMPONENT).forward(buckets::CVE),
            )?,
            related(
                indexer,
                DEPLOYMENT,
                from(buckets::DEPLOYMENT)
                    .forward(buckets::IMAGE)
                    .forward(buckets::COMPONENT)
                    .forward(buckets::CVE),
            )?,
            related(
                indexer,
                NODE,
                from(buckets::NODE).forward(buckets::COMPONENT).forward(buckets::CVE),
            )?,
        ],
        DEPLOYMENT => vec![
            related(
                indexer,
                CVE,
                from(buckets::CVE)
                    .backward(buckets::COMPONENT)
                    .backward(buckets::IMAGE)
                    .backward(buckets::DEPLOYMENT),
            )?,
            related(
                indexer,
                COMPONENT,
                from(buckets::COMPONENT)
                    .backward(buckets::IMAGE)
                    .backward(buckets::DEPLOYMENT),
            )?,
            related(indexer, IMAGE, from(buckets::IMAGE).backward(buckets::DEPLOYMENT))?,
            default_spec(indexer, DEPLOYMENT)?,
        ],
        COMPONENT_CVE_EDGE => vec![
            related(
                indexer,
                CVE,
                from(buckets::CVE).edges_to_child(buckets::COMPONENT, buckets::COMPONENT_CVE_EDGE),
            )?,
            related(
                indexer,
                COMPONENT,
                from(buckets::COMPONENT).edges_from_parent(buckets::CVE, buckets::COMPONENT_CVE_EDGE),
            )?,
            default_spec(indexer, COMPONENT_CVE_EDGE)?,
            related(
                indexer,
                IMAGE,
                from(buckets::IMAGE)
                    .forward(buckets::COMPONENT)
                    .edges_from_parent(buckets::CVE, buckets::COMPONENT_CVE_EDGE),
            )?,
        ],
        other => {
            return Err(CoreError::invalid_configuration(format!(
                "no compound pipeline for {other}"
            )))
        }
    };
    CompoundSearcher::new(graph, specs)
}
