//! Research store and reading-level tests

mod common;

use common::ScriptedModel;
use delve_core::{DelveError, ReadingLevel, ResearchStore, RetryConfig, SourceInfo};
use delve_research::{EngineError, FileResearchStore, MemoryResearchStore, ReadingLevelAdjuster};
use std::sync::Arc;

fn sources() -> Vec<SourceInfo> {
    vec![SourceInfo::new("https://www.bls.gov/remote").with_title("BLS")]
}

async fn exercise_store(store: &dyn ResearchStore) {
    assert!(store.find("remote work").await.unwrap().is_none());

    let first = store
        .store("remote work", "# Research Summary\nv1", &sources(), None)
        .await
        .unwrap();
    let topics = vec!["Hybrid schedules".to_string()];
    let second = store
        .store("remote work", "# Research Summary\nv2", &sources(), Some(topics.as_slice()))
        .await
        .unwrap();
    store
        .store("four day week", "# Research Summary\nother", &[], None)
        .await
        .unwrap();
    assert_ne!(first, second);

    let found = store.find("remote work").await.unwrap().unwrap();
    assert_eq!(found.id, second);
    assert_eq!(found.content, "# Research Summary\nv2");
    assert_eq!(found.sources, sources());
    assert_eq!(found.suggested_topics, Some(topics));

    let listed = store.list(None).await.unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].query, "four day week");
    assert_eq!(listed[2].id, first);
    assert_eq!(store.list(Some(1)).await.unwrap().len(), 1);

    store
        .store_variant(&first, ReadingLevel::Beginner, "simple words")
        .await
        .unwrap();
    assert_eq!(
        store
            .find_variant(&first, ReadingLevel::Beginner)
            .await
            .unwrap()
            .as_deref(),
        Some("simple words")
    );
    assert!(store
        .find_variant(&first, ReadingLevel::Advanced)
        .await
        .unwrap()
        .is_none());

    let missing = store
        .store_variant("00000000-0000-0000-0000-000000000000", ReadingLevel::Advanced, "x")
        .await;
    assert!(matches!(missing, Err(DelveError::NotFound { .. })));
}

#[tokio::test]
async fn test_memory_store() {
    let store = MemoryResearchStore::new();
    exercise_store(&store).await;
}

#[tokio::test]
async fn test_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileResearchStore::new(dir.path().join("data")).unwrap();
    exercise_store(&store).await;

    // Records survive reopening
    let reopened = FileResearchStore::new(dir.path().join("data")).unwrap();
    let found = reopened.find("four day week").await.unwrap().unwrap();
    assert_eq!(found.content, "# Research Summary\nother");
    assert_eq!(reopened.list(None).await.unwrap().len(), 3);

    // Ids that are not generated by the store never touch the filesystem
    assert!(reopened
        .find_variant("../escape", ReadingLevel::Beginner)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_reading_level_variant_is_cached() {
    let llm = ScriptedModel::research_script();
    let store = Arc::new(MemoryResearchStore::new());
    let id = store
        .store("remote work", "# Research Summary\n- point", &[], None)
        .await
        .unwrap();
    let adjuster =
        ReadingLevelAdjuster::new(llm.clone(), RetryConfig::immediate(1)).with_store(store.clone());

    let first = adjuster
        .adjust(Some(&id), "# Research Summary\n- point", ReadingLevel::Beginner)
        .await
        .unwrap();
    assert!(first.starts_with("Adjusted:"));
    assert!(llm.prompts("adjust_reading_level")[0].contains("beginner audience"));

    let second = adjuster
        .adjust(Some(&id), "# Research Summary\n- point", ReadingLevel::Beginner)
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(llm.call_count("adjust_reading_level"), 1);
    assert_eq!(
        store
            .find_variant(&id, ReadingLevel::Beginner)
            .await
            .unwrap(),
        Some(first)
    );
}

#[tokio::test]
async fn test_reading_level_rejects_empty_content_and_empty_answers() {
    let llm = ScriptedModel::new(|_, _| Ok("   ".to_string()));
    let adjuster = ReadingLevelAdjuster::new(llm.clone(), RetryConfig::immediate(1));

    let empty_input = adjuster.adjust(None, "  ", ReadingLevel::Advanced).await;
    assert!(matches!(empty_input, Err(EngineError::Validation { .. })));
    assert_eq!(llm.total_calls(), 0);

    let empty_output = adjuster
        .adjust(None, "# Research Summary", ReadingLevel::Advanced)
        .await;
    assert!(matches!(
        empty_output,
        Err(EngineError::Core(DelveError::Llm { .. }))
    ));
}
