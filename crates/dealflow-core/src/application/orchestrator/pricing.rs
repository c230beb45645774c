use serde_json::{json, Value};

use super::Orchestrator;
use crate::application::fan_out::FanOutMode;
use crate::application::step_executor::StepSpec;
use crate::domain::entities::{
    OfferingRequest, OpportunityLineItemFields, ProductOfferingPriceFields,
};
use crate::domain::result::ItemResult;
use crate::error::StepError;
use crate::types::{Credential, EntityKind, ExternalId, Fields, Synced};

/// The opportunity and price list every offering of a fan-out is priced against
pub(super) struct PricingContext {
    pub opportunity: Synced,
    pub price_list: Synced,
}

impl Orchestrator {
    /// Price every offering concurrently; one result per offering, in order
    pub(super) async fn price_offerings(
        &self,
        credential: &Credential,
        ctx: &PricingContext,
        offerings: Vec<OfferingRequest>,
    ) -> Vec<ItemResult> {
        self.aggregator
            .run_all(offerings, FanOutMode::Concurrent, move |offering| {
                self.price_offering(credential, ctx, offering)
            })
            .await
    }

    /// Price one offering and add it to the opportunity
    ///
    /// The item's refs are those of the line item; the price record is
    /// reported as related. A failed price skips the line item.
    async fn price_offering(
        &self,
        credential: &Credential,
        ctx: &PricingContext,
        offering: OfferingRequest,
    ) -> ItemResult {
        let input = serde_json::to_value(&offering).unwrap_or(Value::Null);

        let product = match self
            .resolver
            .resolve(EntityKind::ProductOffering, &offering.product_offering)
            .await
        {
            Ok(product) => product,
            Err(err) => return ItemResult::failed(input, err),
        };

        let price = match self
            .ensure_price(credential, ctx, &offering, &product, input.clone())
            .await
        {
            Ok(price) => price,
            Err(err) => return ItemResult::failed(input, err),
        };
        let related = vec![price.to_ref(EntityKind::ProductOfferingPrice)];

        match self
            .ensure_line_item(credential, ctx, &offering, &product, &price, input.clone())
            .await
        {
            Ok(line_item) => ItemResult::succeeded(
                input,
                Some(line_item.external_id),
                Some(line_item.local_id),
            )
            .with_related(related),
            Err(err) => ItemResult::failed(input, err).with_related(related),
        }
    }

    /// Reuse the synced price of this offering in this list, or create it
    async fn ensure_price(
        &self,
        credential: &Credential,
        ctx: &PricingContext,
        offering: &OfferingRequest,
        product: &ExternalId,
        input: Value,
    ) -> Result<Synced, StepError> {
        let local = ProductOfferingPriceFields {
            product_offering: offering.product_offering.clone(),
            price_list: ctx.price_list.local_id.clone(),
            amount: offering.amount,
            status: self.config.price_status.clone(),
        };

        let mut criteria = Fields::new();
        criteria.insert("product_offering".into(), json!(local.product_offering));
        criteria.insert("price_list".into(), json!(local.price_list));
        criteria.insert("amount".into(), json!(local.amount));
        if let Some(existing) = self
            .store
            .find_where(EntityKind::ProductOfferingPrice, &criteria)
            .await?
            .iter()
            .find_map(|record| record.synced())
        {
            return Ok(existing);
        }

        let pinned = self.pinner.pin(EntityKind::ProductOfferingPrice);
        let payload = self.remote_payload(
            &pinned,
            json!({
                "product_offering": product,
                "price_list": ctx.price_list.external_id,
                "amount": offering.amount,
                "status": local.status,
            }),
        );

        self.create_synced(
            credential,
            StepSpec::create(
                EntityKind::ProductOfferingPrice,
                input,
                pinned,
                payload,
                local.to_fields(),
            ),
        )
        .await
    }

    /// Reuse the synced line item of this offering on this opportunity and list, or create it
    async fn ensure_line_item(
        &self,
        credential: &Credential,
        ctx: &PricingContext,
        offering: &OfferingRequest,
        product: &ExternalId,
        price: &Synced,
        input: Value,
    ) -> Result<Synced, StepError> {
        let mut criteria = Fields::new();
        criteria.insert("opportunity".into(), json!(ctx.opportunity.local_id));
        criteria.insert("price_list".into(), json!(ctx.price_list.local_id));
        criteria.insert("product_offering".into(), json!(offering.product_offering));
        if let Some(existing) = self
            .store
            .find_where(EntityKind::OpportunityLineItem, &criteria)
            .await?
            .iter()
            .find_map(|record| record.synced())
        {
            return Ok(existing);
        }

        let local = OpportunityLineItemFields {
            opportunity: ctx.opportunity.local_id.clone(),
            price_list: ctx.price_list.local_id.clone(),
            product_offering: offering.product_offering.clone(),
            product_offering_price: Some(price.local_id.clone()),
            unit_of_measure: offering.unit_of_measure.clone(),
            quantity: offering.quantity,
            term_months: offering.term_months,
        };
        let pinned = self.pinner.pin(EntityKind::OpportunityLineItem);
        let payload = self.remote_payload(
            &pinned,
            json!({
                "opportunity": ctx.opportunity.external_id,
                "price_list": ctx.price_list.external_id,
                "product_offering": product,
                "product_offering_price": price.external_id,
                "unit_of_measure": offering.unit_of_measure,
                "quantity": offering.quantity,
                "term_months": offering.term_months,
            }),
        );

        self.create_synced(
            credential,
            StepSpec::create(
                EntityKind::OpportunityLineItem,
                input,
                pinned,
                payload,
                local.to_fields(),
            ),
        )
        .await
    }
}
