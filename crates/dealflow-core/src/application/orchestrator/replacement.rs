use serde_json::json;
use tracing::{info, instrument, warn};

use super::pricing::PricingContext;
use super::Orchestrator;
use crate::application::fan_out::FanOutMode;
use crate::application::step_executor::StepSpec;
use crate::domain::entities::{OpportunityFields, ReplacePricingInput};
use crate::domain::result::{ItemResult, ReplacementReport, WorkflowResult};
use crate::error::{StepError, StoreError};
use crate::types::{Credential, EntityKind, Fields, LocalId, LocalRecord, Synced};

/// Everything the replacement needs to know before it writes anything
struct ReplacementPlan {
    opportunity: Synced,
    account: Synced,
    previous_price_list: Option<LocalId>,
    old_line_items: Vec<LocalRecord>,
}

impl Orchestrator {
    /// Replace the pricing of an opportunity
    ///
    /// A new price list is created before anything is removed, so a failure
    /// at that point leaves the old pricing intact. The old line items and
    /// the old price list are then deleted, the offerings are priced against
    /// the new list and the opportunity is pointed at it. Cleanup failures
    /// are reported but never stop the steps after them.
    #[instrument(skip(self, credential, input), fields(opportunity = %opportunity_id))]
    pub async fn replace_opportunity_pricing(
        &self,
        credential: &Credential,
        opportunity_id: &LocalId,
        input: ReplacePricingInput,
    ) -> WorkflowResult {
        let mut report = ReplacementReport::default();

        if let Err(err) = input.validate() {
            return WorkflowResult::hard_failure(report, err);
        }

        let plan = match self.plan_replacement(opportunity_id).await {
            Ok(plan) => plan,
            Err(err) => return WorkflowResult::hard_failure(report, err),
        };
        report.opportunity = Some(plan.opportunity.to_ref(EntityKind::Opportunity));
        report.previous_price_list = plan.previous_price_list.clone();

        let price_list = match self
            .create_price_list(credential, &plan.account, &input.price_list)
            .await
        {
            Ok(price_list) => price_list,
            Err(err) => return WorkflowResult::stopped(report, err, false),
        };
        report.price_list = Some(price_list.to_ref(EntityKind::PriceList));

        report.line_item_deletions = self
            .aggregator
            .run_all(plan.old_line_items, FanOutMode::Sequential, move |record: LocalRecord| {
                let spec = StepSpec::delete(
                    EntityKind::OpportunityLineItem,
                    json!(record.local_id),
                    record.local_id,
                    record.external_id,
                );
                self.executor.execute_item(credential, spec)
            })
            .await;

        if let Some(previous) = plan
            .previous_price_list
            .filter(|previous| *previous != price_list.local_id)
        {
            report.price_list_deletion =
                Some(self.delete_price_list(credential, &previous).await);
        }

        let ctx = PricingContext {
            opportunity: plan.opportunity,
            price_list,
        };
        let items = self
            .price_offerings(credential, &ctx, input.offerings)
            .await;

        let update = self.repoint_opportunity(credential, &ctx).await;
        if let Some(err) = &update.error {
            warn!(error = %err, "Opportunity still points at its previous price list");
        }
        report.opportunity_update = Some(update);

        let headline = items
            .iter()
            .chain(report.opportunity_update.iter())
            .chain(report.line_item_deletions.iter())
            .chain(report.price_list_deletion.iter())
            .find_map(|item| item.error.clone());
        let result = WorkflowResult::completed(report, items, headline);
        info!(outcome = ?result.outcome, items = result.items.len(), "Replacement pipeline finished");
        result
    }

    async fn plan_replacement(&self, opportunity_id: &LocalId) -> Result<ReplacementPlan, StepError> {
        let (record, external_id) = self
            .resolver
            .load_synced(EntityKind::Opportunity, opportunity_id)
            .await?;
        let fields: OpportunityFields = record.decode().map_err(StoreError::from)?;
        let account = self
            .resolver
            .resolve(EntityKind::Account, &fields.account)
            .await?;

        let mut criteria = Fields::new();
        criteria.insert("opportunity".into(), json!(opportunity_id));
        let old_line_items = self
            .store
            .find_where(EntityKind::OpportunityLineItem, &criteria)
            .await?;

        Ok(ReplacementPlan {
            opportunity: Synced {
                local_id: opportunity_id.clone(),
                external_id,
            },
            account: Synced {
                local_id: fields.account,
                external_id: account,
            },
            previous_price_list: fields.price_list,
            old_line_items,
        })
    }

    async fn delete_price_list(&self, credential: &Credential, local_id: &LocalId) -> ItemResult {
        let input = json!(local_id);
        match self.store.find_by_id(EntityKind::PriceList, local_id).await {
            Ok(Some(record)) => {
                let spec = StepSpec::delete(
                    EntityKind::PriceList,
                    input,
                    record.local_id,
                    record.external_id,
                );
                self.executor.execute_item(credential, spec).await
            }
            Ok(None) => ItemResult::failed(input, StepError::not_found(EntityKind::PriceList, local_id)),
            Err(err) => ItemResult::failed(input, err.into()),
        }
    }

    async fn repoint_opportunity(&self, credential: &Credential, ctx: &PricingContext) -> ItemResult {
        let mut payload = Fields::new();
        payload.insert("price_list".into(), json!(ctx.price_list.external_id));
        let mut local_fields = Fields::new();
        local_fields.insert("price_list".into(), json!(ctx.price_list.local_id));

        self.executor
            .execute_item(
                credential,
                StepSpec::update(
                    EntityKind::Opportunity,
                    json!({"price_list": ctx.price_list.local_id}),
                    ctx.opportunity.local_id.clone(),
                    ctx.opportunity.external_id.clone(),
                    payload,
                    local_fields,
                ),
            )
            .await
    }
}
