//! Option growth under repeated and concurrent calls.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use rapport_core::memory::InMemoryStore;
use rapport_core::{
    CreateFieldRequest, CreateTypeRequest, CustomFields, EntityKind, Error, FieldData,
    FieldDefinition, FieldKind, SchemaLimits, Validator,
};
use rapport_core::FieldKindRegistry;
use uuid::Uuid;

async fn setup(validator: Validator, kind: FieldKind) -> (CustomFields, FieldDefinition) {
    let engine = CustomFields::with_store(Arc::new(InMemoryStore::new()), validator);
    let ty = engine
        .create_type(CreateTypeRequest {
            team_id: Uuid::new_v4(),
            entity_kind: EntityKind::Contact,
            name: "Investor".to_string(),
            description: None,
            icon: "tag".to_string(),
            color: "#000000".to_string(),
        })
        .await
        .expect("Failed to create type");
    let def = engine
        .create_field(CreateFieldRequest::new(ty.id, "Tier", kind))
        .await
        .expect("Failed to create field");
    (engine, def)
}

#[tokio::test]
async fn test_ensure_option_twice_keeps_one_entry() {
    let (engine, def) = setup(Validator::default(), FieldKind::Dropdown).await;
    engine.ensure_option(def.id, "Gold").await.unwrap();
    let after = engine.ensure_option(def.id, "Gold").await.unwrap();
    assert_eq!(after.options, vec!["Gold".to_string()]);
}

#[tokio::test]
async fn test_ensure_option_is_case_sensitive_and_trimmed() {
    let (engine, def) = setup(Validator::default(), FieldKind::MultiSelect).await;
    engine.ensure_option(def.id, "Gold").await.unwrap();
    engine.ensure_option(def.id, "  Gold ").await.unwrap();
    let after = engine.ensure_option(def.id, "gold").await.unwrap();
    assert_eq!(after.options, vec!["Gold".to_string(), "gold".to_string()]);
}

#[tokio::test]
async fn test_ensure_option_rejects_blank_and_non_choice() {
    let (engine, def) = setup(Validator::default(), FieldKind::Dropdown).await;
    let err = engine.ensure_option(def.id, "   ").await.unwrap_err();
    assert!(err.validation_errors().unwrap().get("option").is_some());

    let (engine, text) = setup(Validator::default(), FieldKind::Text).await;
    let err = engine.ensure_option(text.id, "Gold").await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = engine.ensure_option(Uuid::new_v4(), "Gold").await.unwrap_err();
    assert!(matches!(err, Error::FieldNotFound(_)));
}

#[tokio::test]
async fn test_ensure_option_respects_option_limit() {
    let validator = Validator::new(
        FieldKindRegistry::standard(),
        SchemaLimits::default().max_options(1),
    );
    let (engine, def) = setup(validator, FieldKind::Dropdown).await;
    engine.ensure_option(def.id, "Gold").await.unwrap();
    // Already present is still fine at the limit.
    engine.ensure_option(def.id, "Gold").await.unwrap();
    assert!(engine.ensure_option(def.id, "Silver").await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_growth_of_same_option_adds_once() {
    let (engine, def) = setup(Validator::default(), FieldKind::Dropdown).await;
    let calls = (0..32).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.ensure_option(def.id, "Platinum").await })
    });
    for result in join_all(calls).await {
        result.expect("task panicked").expect("ensure_option failed");
    }
    let after = engine.get_field(def.id).await.unwrap();
    assert_eq!(after.options, vec!["Platinum".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_growth_of_distinct_options_keeps_all() {
    let (engine, def) = setup(Validator::default(), FieldKind::MultiSelect).await;
    let candidates: Vec<String> = (0..16).map(|i| format!("Option {}", i)).collect();
    let calls = candidates.iter().cloned().map(|candidate| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.ensure_option(def.id, &candidate).await })
    });
    for result in join_all(calls).await {
        result.expect("task panicked").expect("ensure_option failed");
    }

    let mut after = engine.get_field(def.id).await.unwrap().options;
    after.sort();
    let mut expected = candidates;
    expected.sort();
    assert_eq!(after, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_introducing_same_option() {
    let (engine, def) = setup(Validator::default(), FieldKind::Dropdown).await;
    let type_id = def.type_id;
    let saves = (0..8).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move {
            let contact = Uuid::new_v4();
            engine
                .assign_types(contact, EntityKind::Contact, &[type_id])
                .await?;
            let mut values = HashMap::new();
            values.insert(def.id, FieldData::choice("Diamond"));
            engine
                .save_entity_values(contact, EntityKind::Contact, values)
                .await
        })
    });
    let added: usize = join_all(saves)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked").expect("save failed").options_added)
        .sum();
    assert_eq!(added, 1);
    assert_eq!(
        engine.get_field(def.id).await.unwrap().options,
        vec!["Diamond".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_growth_never_exceeds_option_limit() {
    let validator = Validator::new(
        FieldKindRegistry::standard(),
        SchemaLimits::default().max_options(3),
    );
    let (engine, def) = setup(validator, FieldKind::MultiSelect).await;
    engine.ensure_option(def.id, "Seed A").await.unwrap();
    engine.ensure_option(def.id, "Seed B").await.unwrap();

    let calls = (0..16).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.ensure_option(def.id, &format!("Late {}", i)).await })
    });
    let accepted = join_all(calls)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .filter(|r| match r {
            Ok(_) => true,
            Err(e) => {
                assert!(e.validation_errors().unwrap().get("option").is_some(), "got {:?}", e);
                false
            }
        })
        .count();

    assert_eq!(accepted, 1);
    assert_eq!(engine.get_field(def.id).await.unwrap().options.len(), 3);
}
