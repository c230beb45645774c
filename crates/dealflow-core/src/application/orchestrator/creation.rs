use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use super::pricing::PricingContext;
use super::Orchestrator;
use crate::application::step_executor::StepSpec;
use crate::domain::entities::{
    CreateOpportunityInput, NewPriceList, OpportunityFields, PriceListRequest,
};
use crate::domain::result::{CreationReport, WorkflowResult};
use crate::error::StepError;
use crate::types::{Credential, EntityKind, LocalRecord, Synced};

impl Orchestrator {
    /// Create an opportunity with its price list, prices and line items
    ///
    /// The account must already be synced. The price list is either an
    /// existing synced list or created here; the opportunity is created
    /// pointing at it, then every offering is priced concurrently.
    ///
    /// When `opportunity_id` names an opportunity a previous run already
    /// synced, that opportunity and its price list are reused and only the
    /// missing prices and line items are created.
    #[instrument(skip(self, credential, input), fields(account = %input.account))]
    pub async fn create_opportunity_with_pricing(
        &self,
        credential: &Credential,
        input: CreateOpportunityInput,
    ) -> WorkflowResult {
        let mut report = CreationReport::default();

        if let Err(err) = input.validate() {
            return WorkflowResult::hard_failure(report, err);
        }

        let account = match self
            .resolver
            .resolve(EntityKind::Account, &input.account)
            .await
        {
            Ok(external_id) => Synced {
                local_id: input.account.clone(),
                external_id,
            },
            Err(err) => return WorkflowResult::hard_failure(report, err),
        };

        let existing = match self.load_existing_opportunity(&input).await {
            Ok(existing) => existing,
            Err(err) => return WorkflowResult::hard_failure(report, err),
        };

        let mut wrote_remote = false;
        let price_list = match &input.price_list {
            None => None,
            Some(PriceListRequest::Existing { id }) => {
                match self.resolver.resolve(EntityKind::PriceList, id).await {
                    Ok(external_id) => {
                        report.price_list_reused = true;
                        Some(Synced {
                            local_id: id.clone(),
                            external_id,
                        })
                    }
                    Err(err) => return WorkflowResult::hard_failure(report, err),
                }
            }
            Some(PriceListRequest::New(list)) => {
                match self.previous_price_list(existing.as_ref(), list).await {
                    Ok(Some(reused)) => {
                        report.price_list_reused = true;
                        Some(reused)
                    }
                    Ok(None) => match self.create_price_list(credential, &account, list).await {
                        Ok(created) => {
                            wrote_remote = true;
                            Some(created)
                        }
                        Err(err) => return WorkflowResult::stopped(report, err, false),
                    },
                    Err(err) => return WorkflowResult::hard_failure(report, err),
                }
            }
        };
        report.price_list = price_list.as_ref().map(|list| list.to_ref(EntityKind::PriceList));

        let opportunity = match existing {
            Some(record) => {
                self.reuse_opportunity(credential, record, price_list.as_ref())
                    .await
            }
            None => {
                self.create_opportunity(credential, &input, &account, price_list.as_ref())
                    .await
            }
        };
        let opportunity = match opportunity {
            Ok(opportunity) => opportunity,
            Err(err) => {
                if wrote_remote {
                    if let Some(orphan) = &report.price_list {
                        warn!(price_list = %orphan.local_id, "Opportunity step failed after the price list was written");
                    }
                }
                return WorkflowResult::stopped(report, err, wrote_remote);
            }
        };
        report.opportunity = Some(opportunity.to_ref(EntityKind::Opportunity));

        let items = match price_list {
            Some(price_list) => {
                let ctx = PricingContext {
                    opportunity,
                    price_list,
                };
                self.price_offerings(credential, &ctx, input.offerings).await
            }
            None => Vec::new(),
        };

        let headline = items.iter().find_map(|item| item.error.clone());
        let result = WorkflowResult::completed(report, items, headline);
        info!(outcome = ?result.outcome, items = result.items.len(), "Creation pipeline finished");
        result
    }

    async fn load_existing_opportunity(
        &self,
        input: &CreateOpportunityInput,
    ) -> Result<Option<LocalRecord>, StepError> {
        let Some(id) = &input.opportunity_id else {
            return Ok(None);
        };
        let Some(record) = self.store.find_by_id(EntityKind::Opportunity, id).await? else {
            return Ok(None);
        };
        if record.external_id.is_none() {
            return Err(StepError::NotSynced {
                entity: EntityKind::Opportunity,
                local_id: id.clone(),
            });
        }
        if record.reference("account").as_ref() != Some(&input.account) {
            return Err(StepError::validation(format!(
                "Opportunity {} does not belong to account {}",
                id, input.account
            )));
        }
        Ok(Some(record))
    }

    /// The list a previous run attached to the opportunity, if it is the one requested again
    async fn previous_price_list(
        &self,
        existing: Option<&LocalRecord>,
        list: &NewPriceList,
    ) -> Result<Option<Synced>, StepError> {
        let Some(current) = existing.and_then(|record| record.reference("price_list")) else {
            return Ok(None);
        };
        let Some(record) = self.store.find_by_id(EntityKind::PriceList, &current).await? else {
            return Ok(None);
        };
        if record.fields.get("name") != Some(&Value::String(list.name.clone())) {
            return Ok(None);
        }
        Ok(record.synced())
    }

    async fn reuse_opportunity(
        &self,
        credential: &Credential,
        record: LocalRecord,
        price_list: Option<&Synced>,
    ) -> Result<Synced, StepError> {
        let synced = record.synced().ok_or_else(|| StepError::NotSynced {
            entity: EntityKind::Opportunity,
            local_id: record.local_id.clone(),
        })?;

        let Some(price_list) = price_list else {
            return Ok(synced);
        };
        if record.reference("price_list").as_ref() == Some(&price_list.local_id) {
            return Ok(synced);
        }

        let mut payload = serde_json::Map::new();
        payload.insert("price_list".into(), json!(price_list.external_id));
        let mut local_fields = serde_json::Map::new();
        local_fields.insert("price_list".into(), json!(price_list.local_id));

        self.executor
            .execute(
                credential,
                StepSpec::update(
                    EntityKind::Opportunity,
                    json!({"price_list": price_list.local_id}),
                    synced.local_id.clone(),
                    synced.external_id.clone(),
                    payload,
                    local_fields,
                ),
            )
            .await?;
        Ok(synced)
    }

    async fn create_opportunity(
        &self,
        credential: &Credential,
        input: &CreateOpportunityInput,
        account: &Synced,
        price_list: Option<&Synced>,
    ) -> Result<Synced, StepError> {
        let pinned = match &input.opportunity_id {
            Some(id) => self.pinner.pin_with(EntityKind::Opportunity, id.clone()),
            None => self.pinner.pin(EntityKind::Opportunity),
        };
        let local_fields = OpportunityFields {
            name: input.name.clone(),
            account: account.local_id.clone(),
            price_list: price_list.map(|list| list.local_id.clone()),
            stage: input.stage.clone(),
            sales_cycle_type: input.sales_cycle_type.clone(),
            close_date: input.close_date,
        }
        .to_fields();
        let payload = self.remote_payload(
            &pinned,
            json!({
                "name": input.name,
                "stage": input.stage,
                "sales_cycle_type": input.sales_cycle_type,
                "close_date": input.close_date,
                "account": account.external_id,
                "price_list": price_list.map(|list| &list.external_id),
            }),
        );
        let step_input = json!({
            "name": input.name,
            "account": input.account,
        });

        self.create_synced(
            credential,
            StepSpec::create(EntityKind::Opportunity, step_input, pinned, payload, local_fields),
        )
        .await
    }
}
