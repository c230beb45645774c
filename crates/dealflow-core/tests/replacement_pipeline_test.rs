//! End-to-end runs of the pricing replacement pipeline against fakes.

use dealflow_core::{
    CreateOpportunityInput, EntityKind, LocalId, Orchestrator, Outcome, PriceListRequest,
    RemoteError, ReplacePricingInput, StepError,
};
use dealflow_test_utils::{credential, offering, price_list, CrmOp, StoreOp, TestWorld};
use pretty_assertions::assert_eq;
use serde_json::json;

/// Seed an account and offerings, then create `opp-1` priced on `PL-1`
async fn priced_opportunity() -> (TestWorld, Orchestrator, LocalId) {
    let world = TestWorld::new();
    world.seed_account().await;
    world.seed_offerings(&["Widget", "Gadget", "Gizmo"]).await;
    let orchestrator = world.orchestrator();

    let result = orchestrator
        .create_opportunity_with_pricing(
            &credential(),
            CreateOpportunityInput {
                opportunity_id: Some("opp-1".into()),
                account: "acc-1".into(),
                name: "Acme expansion".to_string(),
                stage: "Proposal".to_string(),
                sales_cycle_type: "New".to_string(),
                close_date: None,
                price_list: Some(PriceListRequest::New(price_list("PL-1"))),
                offerings: vec![offering("po-1", 10.0), offering("po-2", 20.0)],
            },
        )
        .await;
    assert!(result.is_success());

    (world, orchestrator, LocalId::from("opp-1"))
}

fn replacement(name: &str, offerings: &[(&str, f64)]) -> ReplacePricingInput {
    ReplacePricingInput {
        price_list: price_list(name),
        offerings: offerings
            .iter()
            .map(|(product, amount)| offering(product, *amount))
            .collect(),
    }
}

#[tokio::test]
async fn test_replacement_swaps_price_list_and_line_items() {
    let (world, orchestrator, opportunity) = priced_opportunity().await;
    let old_list = world
        .local(EntityKind::Opportunity, &opportunity)
        .await
        .unwrap()
        .reference("price_list")
        .unwrap();

    let result = orchestrator
        .replace_opportunity_pricing(
            &credential(),
            &opportunity,
            replacement("PL-2", &[("po-3", 30.0)]),
        )
        .await;

    assert_eq!(result.outcome, Outcome::Success);
    let report = result.report.as_replacement().unwrap();
    assert_eq!(report.previous_price_list, Some(old_list.clone()));
    assert_eq!(report.line_item_deletions.len(), 2);
    assert!(report.line_item_deletions.iter().all(|item| item.success));
    assert!(report.price_list_deletion.as_ref().unwrap().success);
    assert!(report.opportunity_update.as_ref().unwrap().success);

    let new_list = report.price_list.clone().unwrap();
    let record = world
        .local(EntityKind::Opportunity, &opportunity)
        .await
        .unwrap();
    assert_eq!(record.reference("price_list"), Some(new_list.local_id.clone()));
    assert!(world.local(EntityKind::PriceList, &old_list).await.is_none());

    let line_items = world
        .local_where(
            EntityKind::OpportunityLineItem,
            json!({"opportunity": opportunity}),
        )
        .await;
    assert_eq!(line_items.len(), 1);
    assert_eq!(
        line_items[0].reference("price_list"),
        Some(new_list.local_id.clone())
    );

    let remote_opportunity = world
        .crm
        .record("opportunities", &"opportunities-1".into())
        .unwrap();
    assert_eq!(
        remote_opportunity["price_list"],
        json!(new_list.external_id.unwrap())
    );
    assert_eq!(world.crm.records("price_lists").len(), 1);
}

#[tokio::test]
async fn test_failed_price_list_deletion_still_installs_new_pricing() {
    let (world, orchestrator, opportunity) = priced_opportunity().await;
    world.crm.fail(
        CrmOp::Delete,
        "price_lists",
        RemoteError::from_status(409, "price list still referenced"),
    );
    let old_list = world
        .local(EntityKind::Opportunity, &opportunity)
        .await
        .unwrap()
        .reference("price_list")
        .unwrap();

    let result = orchestrator
        .replace_opportunity_pricing(
            &credential(),
            &opportunity,
            replacement("PL-2", &[("po-3", 30.0)]),
        )
        .await;

    assert_eq!(result.outcome, Outcome::PartialFailure);
    assert!(matches!(
        result.error,
        Some(StepError::RemoteRejected { status: 409, .. })
    ));
    assert_eq!(result.items.len(), 1);
    assert!(result.items.iter().all(|item| item.success));

    let report = result.report.as_replacement().unwrap();
    let deletion = report.price_list_deletion.as_ref().unwrap();
    assert!(!deletion.success);
    assert!(report.line_item_deletions.iter().all(|item| item.success));
    assert!(report.opportunity_update.as_ref().unwrap().success);

    let new_list = report.price_list.clone().unwrap();
    let record = world
        .local(EntityKind::Opportunity, &opportunity)
        .await
        .unwrap();
    assert_eq!(record.reference("price_list"), Some(new_list.local_id.clone()));
    assert!(world.local(EntityKind::PriceList, &old_list).await.is_some());
    assert_eq!(world.crm.records("price_lists").len(), 2);
}

#[tokio::test]
async fn test_replacing_twice_points_at_the_latest_list() {
    let (world, orchestrator, opportunity) = priced_opportunity().await;

    let second = orchestrator
        .replace_opportunity_pricing(&credential(), &opportunity, replacement("PL-2", &[("po-1", 11.0)]))
        .await;
    assert!(second.is_success());
    let third = orchestrator
        .replace_opportunity_pricing(&credential(), &opportunity, replacement("PL-3", &[("po-1", 12.0)]))
        .await;
    assert!(third.is_success());

    let second_list = second.report.as_replacement().unwrap().price_list.clone().unwrap();
    let third_report = third.report.as_replacement().unwrap();
    let third_list = third_report.price_list.clone().unwrap();

    assert_eq!(
        third_report.previous_price_list,
        Some(second_list.local_id.clone())
    );
    let record = world
        .local(EntityKind::Opportunity, &opportunity)
        .await
        .unwrap();
    assert_eq!(record.reference("price_list"), Some(third_list.local_id.clone()));
    let remote_lists: Vec<_> = world
        .crm
        .records("price_lists")
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(remote_lists, vec![third_list.external_id.clone().unwrap()]);
    assert_eq!(world.store.inner().count(EntityKind::PriceList).await, 1);
    assert_eq!(
        world.store.inner().count(EntityKind::OpportunityLineItem).await,
        1
    );
}

#[tokio::test]
async fn test_failed_line_item_deletion_still_installs_new_pricing() {
    let (world, orchestrator, opportunity) = priced_opportunity().await;
    world.crm.fail(
        CrmOp::Delete,
        "opportunity_line_items",
        RemoteError::from_status(503, "maintenance"),
    );

    let result = orchestrator
        .replace_opportunity_pricing(&credential(), &opportunity, replacement("PL-2", &[("po-3", 30.0)]))
        .await;

    assert_eq!(result.outcome, Outcome::PartialFailure);
    assert!(matches!(
        result.error,
        Some(StepError::RemoteUnavailable { .. })
    ));
    assert!(result.items.iter().all(|item| item.success));

    let report = result.report.as_replacement().unwrap();
    assert_eq!(report.line_item_deletions.len(), 2);
    assert!(report.line_item_deletions.iter().all(|item| !item.success));
    let new_list = report.price_list.clone().unwrap();
    assert!(report.opportunity_update.as_ref().unwrap().success);

    let record = world
        .local(EntityKind::Opportunity, &opportunity)
        .await
        .unwrap();
    assert_eq!(record.reference("price_list"), Some(new_list.local_id));
    // Undeleted line items stay in both stores
    assert_eq!(world.crm.records("opportunity_line_items").len(), 3);
    assert_eq!(
        world.store.inner().count(EntityKind::OpportunityLineItem).await,
        3
    );
}

#[tokio::test]
async fn test_price_list_creation_failure_leaves_old_pricing_intact() {
    let (world, orchestrator, opportunity) = priced_opportunity().await;
    world.crm.fail(
        CrmOp::Create,
        "price_lists",
        RemoteError::from_status(400, "duplicate name"),
    );

    let result = orchestrator
        .replace_opportunity_pricing(&credential(), &opportunity, replacement("PL-2", &[("po-3", 30.0)]))
        .await;

    assert_eq!(result.outcome, Outcome::HardFailure);
    assert!(world.crm.calls_to(CrmOp::Delete, "opportunity_line_items").is_empty());
    assert!(world.crm.calls_to(CrmOp::Delete, "price_lists").is_empty());
    assert_eq!(
        world.store.inner().count(EntityKind::OpportunityLineItem).await,
        2
    );
    let report = result.report.as_replacement().unwrap();
    assert!(report.opportunity.is_some());
    assert!(report.price_list.is_none());
}

#[tokio::test]
async fn test_failed_repoint_is_reported_as_partial() {
    let (world, orchestrator, opportunity) = priced_opportunity().await;
    world.store.fail(StoreOp::Update, EntityKind::Opportunity);

    let result = orchestrator
        .replace_opportunity_pricing(&credential(), &opportunity, replacement("PL-2", &[("po-3", 30.0)]))
        .await;

    assert_eq!(result.outcome, Outcome::PartialFailure);
    let update = result
        .report
        .as_replacement()
        .unwrap()
        .opportunity_update
        .clone()
        .unwrap();
    assert!(matches!(
        update.error,
        Some(StepError::LocalPersistenceFailed {
            entity: EntityKind::Opportunity,
            ..
        })
    ));
    assert_eq!(update.remote_ref.as_ref().map(|id| id.as_str()), Some("opportunities-1"));
    assert_eq!(result.error, update.error);
}

#[tokio::test]
async fn test_unsynced_opportunity_cannot_be_repriced() {
    let world = TestWorld::new();
    world.seed_account().await;
    world
        .seed_unsynced(
            EntityKind::Opportunity,
            "opp-draft",
            json!({"name": "Draft", "account": "acc-1", "stage": "New", "sales_cycle_type": "New"}),
        )
        .await;
    let orchestrator = world.orchestrator();

    let result = orchestrator
        .replace_opportunity_pricing(&credential(), &"opp-draft".into(), replacement("PL-2", &[]))
        .await;

    assert_eq!(result.outcome, Outcome::HardFailure);
    assert!(matches!(
        result.error,
        Some(StepError::NotSynced {
            entity: EntityKind::Opportunity,
            ..
        })
    ));
    assert!(world.crm.calls().is_empty());
}

#[tokio::test]
async fn test_missing_opportunity_is_not_found() {
    let world = TestWorld::new();
    let orchestrator = world.orchestrator();

    let result = orchestrator
        .replace_opportunity_pricing(&credential(), &"opp-missing".into(), replacement("PL-2", &[]))
        .await;

    assert_eq!(result.outcome, Outcome::HardFailure);
    assert!(matches!(result.error, Some(StepError::NotFound { .. })));
}
