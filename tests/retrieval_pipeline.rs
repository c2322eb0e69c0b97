//! End-to-end retrieval pipeline tests with mock collaborators.

mod common;

use std::sync::Arc;

use assistflow::agent::RetrievalConfig;
use assistflow::retrieval::pipeline::{LOW_CONFIDENCE_MESSAGE, NO_RESULTS_MESSAGE};
use assistflow::retrieval::{KeywordReranker, RetrievalOutcome, RetrievalPipeline};
use assistflow::{AgentError, RequestContext};

use common::{CannedStore, ConstantEmbedder, FixedLlm, hit};

fn config(collections: &[&str]) -> RetrievalConfig {
    RetrievalConfig {
        collections: collections.iter().map(ToString::to_string).collect(),
        ..RetrievalConfig::default()
    }
}

fn two_collection_store() -> CannedStore {
    CannedStore::default()
        .with(
            "faq",
            vec![
                hit("a", "refunds are issued within seven business days", 0.9),
                hit("b", "shipping takes three days to most regions", 0.6),
            ],
        )
        .with(
            "policy",
            vec![hit("c", "returns accepted for thirty days with receipt", 0.95)],
        )
}

fn pipeline(store: CannedStore, collections: &[&str]) -> RetrievalPipeline {
    RetrievalPipeline::new(config(collections), "test-model")
        .with_embedder(Arc::new(ConstantEmbedder(vec![1.0, 0.0])))
        .with_store(Arc::new(store))
}

#[tokio::test]
async fn test_merges_sorts_and_filters_across_collections() {
    let pipeline = pipeline(two_collection_store(), &["faq", "policy"]);
    let report = pipeline
        .retrieve("how do refunds work", &RequestContext::default())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.raw_count, 3);
    assert!(!report.reranked);
    let ids: Vec<&str> = report.hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "a"]);
    assert_eq!(report.hits[0].collection, "policy");
    assert!((report.hits[0].score - 0.95).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_failed_collection_is_skipped() {
    let pipeline = pipeline(two_collection_store(), &["faq", "missing"]);
    let report = pipeline
        .retrieve("refunds", &RequestContext::default())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(report.raw_count, 2);
    assert_eq!(report.hits.len(), 1);
    assert_eq!(report.hits[0].id, "a");
}

#[tokio::test]
async fn test_no_results_and_low_confidence_are_distinct() {
    let empty = pipeline(CannedStore::default().with("faq", Vec::new()), &["faq"]);
    let outcome = empty
        .run("anything", &RequestContext::default())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(matches!(outcome, RetrievalOutcome::NoResults));
    assert_eq!(outcome.message(), NO_RESULTS_MESSAGE);

    let weak = pipeline(
        CannedStore::default().with("faq", vec![hit("w", "barely related passage text", 0.2)]),
        &["faq"],
    );
    let outcome = weak
        .run("anything", &RequestContext::default())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(matches!(outcome, RetrievalOutcome::LowConfidence { candidates: 1 }));
    assert_eq!(outcome.message(), LOW_CONFIDENCE_MESSAGE);
    assert_ne!(NO_RESULTS_MESSAGE, LOW_CONFIDENCE_MESSAGE);
}

#[tokio::test]
async fn test_missing_embedder_fails_fast() {
    let pipeline = RetrievalPipeline::new(config(&["faq"]), "test-model")
        .with_store(Arc::new(two_collection_store()));
    let result = pipeline.run("refunds", &RequestContext::default()).await;
    assert!(matches!(result, Err(AgentError::Embedding { .. })));
}

#[tokio::test]
async fn test_answer_from_llm_or_template() {
    let templated = pipeline(two_collection_store(), &["faq", "policy"]);
    let outcome = templated
        .run("refunds", &RequestContext::default())
        .await
        .unwrap_or_else(|_| unreachable!());
    let RetrievalOutcome::Answered {
        answer, generated, ..
    } = outcome
    else {
        unreachable!()
    };
    assert!(!generated);
    assert!(answer.contains("returns accepted for thirty days"));
    assert!(answer.contains("来源: policy"));

    let llm = FixedLlm::new("Refunds take seven business days.");
    let generated_pipeline = pipeline(two_collection_store(), &["faq", "policy"]).with_llm(llm.clone());
    let outcome = generated_pipeline
        .run("refunds", &RequestContext::default())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(matches!(outcome, RetrievalOutcome::Answered { generated: true, .. }));
    assert_eq!(outcome.message(), "Refunds take seven business days.");

    let requests = llm.requests.lock();
    assert_eq!(requests.len(), 1);
    let prompt = &requests[0].messages[1].content;
    assert!(prompt.contains("知识片段1"));
    assert!(prompt.contains("refunds"));
}

#[tokio::test]
async fn test_user_scope_reaches_store() {
    let store = Arc::new(two_collection_store());
    let pipeline = RetrievalPipeline::new(config(&["faq"]), "test-model")
        .with_embedder(Arc::new(ConstantEmbedder(vec![1.0])))
        .with_store(store.clone());
    let ctx = RequestContext {
        user_id: Some("u-42".to_string()),
        ..RequestContext::default()
    };
    let _ = pipeline.retrieve("refunds", &ctx).await;

    let filters = store.filters.lock();
    assert_eq!(filters.len(), 1);
    let filter = filters[0].clone().unwrap_or_default();
    assert_eq!(filter.user_id.as_deref(), Some("u-42"));
}

#[tokio::test]
async fn test_rerank_truncates_to_rerank_top_k() {
    let hits = (0..8)
        .map(|i| {
            hit(
                &format!("d{i}"),
                &format!("refund passage number {i} with unique token{i}"),
                0.99 - 0.01 * f32::from(u8::try_from(i).unwrap_or_default()),
            )
        })
        .collect();
    let mut retrieval = config(&["faq"]);
    retrieval.rerank_top_k = 3;
    retrieval.similarity_threshold = 0.5;
    let pipeline = RetrievalPipeline::new(retrieval, "test-model")
        .with_embedder(Arc::new(ConstantEmbedder(vec![1.0])))
        .with_store(Arc::new(CannedStore::default().with("faq", hits)))
        .with_reranker(Arc::new(KeywordReranker));

    let report = pipeline
        .retrieve("refund passage", &RequestContext::default())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(report.reranked);
    assert_eq!(report.hits.len(), 3);
    assert!(report.hits.iter().all(|h| h.combined_score.is_some()));
}
