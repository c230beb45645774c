//! End-to-end runs of the opportunity creation pipeline against fakes.

use dealflow_core::{
    CreateOpportunityInput, EntityKind, LocalId, Outcome, PriceListRequest, RemoteError,
    StepError,
};
use dealflow_test_utils::{credential, offering, price_list, CrmOp, StoreOp, TestWorld};
use pretty_assertions::assert_eq;
use serde_json::json;

fn input(offerings: &[(&str, f64)]) -> CreateOpportunityInput {
    CreateOpportunityInput {
        opportunity_id: None,
        account: "acc-1".into(),
        name: "Acme renewal".to_string(),
        stage: "Prospecting".to_string(),
        sales_cycle_type: "Renewal".to_string(),
        close_date: None,
        price_list: Some(PriceListRequest::New(price_list("Q3 list"))),
        offerings: offerings
            .iter()
            .map(|(product, amount)| offering(product, *amount))
            .collect(),
    }
}

async fn world() -> TestWorld {
    let world = TestWorld::new();
    world.seed_account().await;
    world.seed_offerings(&["Widget", "Gadget"]).await;
    world
}

#[tokio::test]
async fn test_line_items_share_the_opportunity_price_list() {
    let world = world().await;
    let orchestrator = world.orchestrator();

    let result = orchestrator
        .create_opportunity_with_pricing(&credential(), input(&[("po-1", 10.0), ("po-2", 20.0)]))
        .await;

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.items.len(), 2);
    let report = result.report.as_creation().unwrap();
    let opportunity = report.opportunity.clone().unwrap();
    let list = report.price_list.clone().unwrap();
    assert!(!report.price_list_reused);

    let opportunity_record = world
        .local(EntityKind::Opportunity, &opportunity.local_id)
        .await
        .unwrap();
    assert_eq!(
        opportunity_record.reference("price_list"),
        Some(list.local_id.clone())
    );

    let line_items = world
        .local_where(
            EntityKind::OpportunityLineItem,
            json!({"opportunity": opportunity.local_id}),
        )
        .await;
    assert_eq!(line_items.len(), 2);
    for line_item in &line_items {
        assert_eq!(line_item.reference("price_list"), Some(list.local_id.clone()));
        assert!(line_item.external_id.is_some());
    }

    let remote_list = list.external_id.unwrap();
    for (_, fields) in world.crm.records("opportunity_line_items") {
        assert_eq!(fields["price_list"], json!(remote_list));
    }
    for (_, fields) in world.crm.records("product_offering_prices") {
        assert_eq!(fields["price_list"], json!(remote_list));
    }
}

#[tokio::test]
async fn test_remote_payload_carries_the_local_id() {
    let world = world().await;
    let orchestrator = world.orchestrator();

    let result = orchestrator
        .create_opportunity_with_pricing(&credential(), input(&[("po-1", 10.0)]))
        .await;
    assert!(result.is_success());

    let list = result.report.as_creation().unwrap().price_list.clone().unwrap();
    let remote = world
        .crm
        .record("price_lists", list.external_id.as_ref().unwrap())
        .unwrap();
    assert_eq!(remote["external_id"], json!(list.local_id));
    assert_eq!(remote["account"], json!("ACC-1"));

    for call in world.crm.calls() {
        assert_eq!(call.token, "test-token");
    }
}

#[tokio::test]
async fn test_rejected_offering_does_not_stop_the_others() {
    let world = world().await;
    world
        .crm
        .reject_create_where("product_offering_prices", "amount", json!(20.0), 400);
    let orchestrator = world.orchestrator();

    let result = orchestrator
        .create_opportunity_with_pricing(&credential(), input(&[("po-1", 10.0), ("po-2", 20.0)]))
        .await;

    assert_eq!(result.outcome, Outcome::PartialFailure);
    assert_eq!(result.items.len(), 2);
    assert!(result.items[0].success);
    assert_eq!(result.items[0].input["product_offering"], json!("po-1"));
    assert!(!result.items[1].success);
    assert_eq!(result.items[1].input["product_offering"], json!("po-2"));
    assert!(matches!(
        result.items[1].error,
        Some(StepError::RemoteRejected { status: 400, .. })
    ));
    assert_eq!(result.error, result.items[1].error);

    assert_eq!(world.crm.records("opportunity_line_items").len(), 1);
    assert_eq!(world.crm.records("opportunities").len(), 1);
}

#[tokio::test]
async fn test_unknown_offering_fails_only_its_item() {
    let world = world().await;
    let orchestrator = world.orchestrator();

    let result = orchestrator
        .create_opportunity_with_pricing(&credential(), input(&[("po-9", 5.0), ("po-1", 10.0)]))
        .await;

    assert_eq!(result.outcome, Outcome::PartialFailure);
    assert!(matches!(
        result.items[0].error,
        Some(StepError::NotFound {
            entity: EntityKind::ProductOffering,
            ..
        })
    ));
    assert!(result.items[1].success);
}

#[tokio::test]
async fn test_rerun_with_same_opportunity_id_creates_nothing_new() {
    let world = world().await;
    let orchestrator = world.orchestrator();
    let mut request = input(&[("po-1", 10.0), ("po-2", 20.0)]);
    request.opportunity_id = Some(LocalId::from("opp-fixed"));

    let first = orchestrator
        .create_opportunity_with_pricing(&credential(), request.clone())
        .await;
    assert!(first.is_success());
    let created = world.crm.created_count();

    let second = orchestrator
        .create_opportunity_with_pricing(&credential(), request)
        .await;

    assert!(second.is_success());
    assert_eq!(world.crm.created_count(), created);
    assert!(world.crm.calls_to(CrmOp::Update, "opportunities").is_empty());
    let report = second.report.as_creation().unwrap();
    assert!(report.price_list_reused);
    assert_eq!(
        report.opportunity.as_ref().map(|r| r.local_id.clone()),
        Some(LocalId::from("opp-fixed"))
    );
    assert_eq!(
        second.items.iter().map(|i| i.local_ref.clone()).collect::<Vec<_>>(),
        first.items.iter().map(|i| i.local_ref.clone()).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_rerun_after_partial_failure_fills_the_gap() {
    let world = world().await;
    world
        .crm
        .reject_create_where("product_offering_prices", "amount", json!(20.0), 400);
    let orchestrator = world.orchestrator();
    let mut request = input(&[("po-1", 10.0), ("po-2", 20.0)]);
    request.opportunity_id = Some(LocalId::from("opp-retry"));

    let first = orchestrator
        .create_opportunity_with_pricing(&credential(), request.clone())
        .await;
    assert_eq!(first.outcome, Outcome::PartialFailure);

    world.crm.clear_failures();
    let second = orchestrator
        .create_opportunity_with_pricing(&credential(), request)
        .await;

    assert!(second.is_success());
    assert_eq!(world.crm.records("price_lists").len(), 1);
    assert_eq!(world.crm.records("opportunities").len(), 1);
    assert_eq!(world.crm.records("opportunity_line_items").len(), 2);
}

#[tokio::test]
async fn test_local_failure_after_remote_write_reports_the_remote_id() {
    let world = world().await;
    world
        .store
        .fail(StoreOp::Insert, EntityKind::OpportunityLineItem);
    let orchestrator = world.orchestrator();

    let result = orchestrator
        .create_opportunity_with_pricing(&credential(), input(&[("po-1", 10.0)]))
        .await;

    assert_eq!(result.outcome, Outcome::PartialFailure);
    let item = &result.items[0];
    let remote_ref = item.remote_ref.clone().unwrap();
    assert!(matches!(
        &item.error,
        Some(StepError::LocalPersistenceFailed {
            entity: EntityKind::OpportunityLineItem,
            external_id,
            ..
        }) if *external_id == remote_ref
    ));
    assert!(world.crm.record("opportunity_line_items", &remote_ref).is_some());
    assert_eq!(item.related.len(), 1);
    assert_eq!(item.related[0].kind, EntityKind::ProductOfferingPrice);
}

#[tokio::test]
async fn test_existing_price_list_is_referenced_not_created() {
    let world = world().await;
    world
        .seed_synced(
            EntityKind::PriceList,
            "pl-std",
            "PL-STD",
            json!({"name": "Standard", "account": "acc-1"}),
        )
        .await;
    let orchestrator = world.orchestrator();
    let mut request = input(&[("po-1", 10.0)]);
    request.price_list = Some(PriceListRequest::Existing {
        id: "pl-std".into(),
    });

    let result = orchestrator
        .create_opportunity_with_pricing(&credential(), request)
        .await;

    assert!(result.is_success());
    assert!(world.crm.calls_to(CrmOp::Create, "price_lists").is_empty());
    let report = result.report.as_creation().unwrap();
    assert!(report.price_list_reused);
    assert_eq!(
        report.price_list.as_ref().map(|r| r.local_id.clone()),
        Some(LocalId::from("pl-std"))
    );
}

#[tokio::test]
async fn test_unsynced_account_is_a_hard_failure() {
    let world = TestWorld::new();
    world
        .seed_unsynced(EntityKind::Account, "acc-1", json!({"name": "Acme"}))
        .await;
    let orchestrator = world.orchestrator();

    let result = orchestrator
        .create_opportunity_with_pricing(&credential(), input(&[]))
        .await;

    assert_eq!(result.outcome, Outcome::HardFailure);
    assert!(matches!(
        result.error,
        Some(StepError::NotSynced {
            entity: EntityKind::Account,
            ..
        })
    ));
    assert!(result.items.is_empty());
    assert!(world.crm.calls().is_empty());
}

#[tokio::test]
async fn test_price_list_rejection_stops_before_the_opportunity() {
    let world = world().await;
    world.crm.fail(
        CrmOp::Create,
        "price_lists",
        RemoteError::from_status(422, "currency not enabled"),
    );
    let orchestrator = world.orchestrator();

    let result = orchestrator
        .create_opportunity_with_pricing(&credential(), input(&[("po-1", 10.0)]))
        .await;

    assert_eq!(result.outcome, Outcome::HardFailure);
    assert!(matches!(
        result.error,
        Some(StepError::RemoteRejected { status: 422, .. })
    ));
    assert!(world.crm.calls_to(CrmOp::Create, "opportunities").is_empty());
    assert_eq!(world.store.inner().count(EntityKind::PriceList).await, 0);
}

#[tokio::test]
async fn test_offerings_without_price_list_are_rejected_up_front() {
    let world = world().await;
    let orchestrator = world.orchestrator();
    let mut request = input(&[("po-1", 10.0)]);
    request.price_list = None;

    let result = orchestrator
        .create_opportunity_with_pricing(&credential(), request)
        .await;

    assert_eq!(result.outcome, Outcome::HardFailure);
    assert!(matches!(
        result.error,
        Some(StepError::ValidationFailed { .. })
    ));
    assert!(world.crm.calls().is_empty());
}

#[tokio::test]
async fn test_unavailable_crm_is_retryable() {
    let world = world().await;
    world.crm.fail(
        CrmOp::Create,
        "price_lists",
        RemoteError::unavailable("connection reset"),
    );
    let orchestrator = world.orchestrator();

    let result = orchestrator
        .create_opportunity_with_pricing(&credential(), input(&[]))
        .await;

    assert_eq!(result.outcome, Outcome::HardFailure);
    assert!(result.error.as_ref().unwrap().is_retryable());
    assert!(world.crm.calls_to(CrmOp::Create, "opportunities").is_empty());
    assert_eq!(world.store.inner().count(EntityKind::PriceList).await, 0);
    assert_eq!(world.store.inner().count(EntityKind::Opportunity).await, 0);
}

#[tokio::test]
async fn test_opportunity_failure_after_new_price_list_is_partial() {
    let world = world().await;
    world.crm.fail(
        CrmOp::Create,
        "opportunities",
        RemoteError::from_status(422, "stage not allowed"),
    );
    let orchestrator = world.orchestrator();

    let result = orchestrator
        .create_opportunity_with_pricing(&credential(), input(&[("po-1", 10.0)]))
        .await;

    assert_eq!(result.outcome, Outcome::PartialFailure);
    assert!(matches!(
        result.error,
        Some(StepError::RemoteRejected { status: 422, .. })
    ));
    assert!(result.items.is_empty());

    let report = result.report.as_creation().unwrap();
    assert!(report.opportunity.is_none());
    let list = report.price_list.clone().unwrap();
    let remote_list = list.external_id.clone().unwrap();
    assert!(world.crm.record("price_lists", &remote_list).is_some());
    assert!(world.local(EntityKind::PriceList, &list.local_id).await.is_some());
    assert_eq!(world.store.inner().count(EntityKind::Opportunity).await, 0);
}

#[tokio::test]
async fn test_opportunity_failure_with_existing_price_list_is_hard() {
    let world = world().await;
    world
        .seed_synced(
            EntityKind::PriceList,
            "pl-std",
            "PL-STD",
            json!({"name": "Standard", "account": "acc-1"}),
        )
        .await;
    world.crm.fail(
        CrmOp::Create,
        "opportunities",
        RemoteError::from_status(422, "stage not allowed"),
    );
    let orchestrator = world.orchestrator();
    let mut request = input(&[("po-1", 10.0)]);
    request.price_list = Some(PriceListRequest::Existing {
        id: "pl-std".into(),
    });

    let result = orchestrator
        .create_opportunity_with_pricing(&credential(), request)
        .await;

    assert_eq!(result.outcome, Outcome::HardFailure);
    assert!(world.crm.calls_to(CrmOp::Create, "price_lists").is_empty());
    assert_eq!(world.crm.created_count(), 0);
}

#[tokio::test]
async fn test_rerun_against_another_accounts_opportunity_is_rejected() {
    let world = world().await;
    world
        .seed_synced(EntityKind::Account, "acc-2", "ACC-2", json!({"name": "Globex"}))
        .await;
    world
        .seed_synced(
            EntityKind::Opportunity,
            "opp-globex",
            "OPP-GLOBEX",
            json!({"name": "Globex expansion", "account": "acc-2"}),
        )
        .await;
    let orchestrator = world.orchestrator();
    let mut request = input(&[("po-1", 10.0)]);
    request.opportunity_id = Some(LocalId::from("opp-globex"));

    let result = orchestrator
        .create_opportunity_with_pricing(&credential(), request)
        .await;

    assert_eq!(result.outcome, Outcome::HardFailure);
    assert!(matches!(
        result.error,
        Some(StepError::ValidationFailed { .. })
    ));
    assert!(world.crm.calls().is_empty());
    let opportunity = world
        .local(EntityKind::Opportunity, &LocalId::from("opp-globex"))
        .await
        .unwrap();
    assert_eq!(opportunity.reference("price_list"), None);
}
