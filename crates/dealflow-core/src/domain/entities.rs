//! Entity field views and pipeline inputs
//!
//! Local records keep their domain fields as a JSON map in which every
//! reference holds a local id. The structs below are the typed views the
//! pipelines write and read; the remote payloads carry the same fields with
//! references translated to external ids.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::StepError;
use crate::types::{to_fields, ExternalId, Fields, LocalId};

/// Local fields of an opportunity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityFields {
    /// Display name
    pub name: String,
    /// Owning account
    pub account: LocalId,
    /// Current price list, if priced
    #[serde(default)]
    pub price_list: Option<LocalId>,
    /// Sales stage
    pub stage: String,
    /// Sales cycle type
    pub sales_cycle_type: String,
    /// Expected close date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_date: Option<NaiveDate>,
}

/// Local fields of a price list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceListFields {
    /// Display name
    pub name: String,
    /// Account the list is tied to
    pub account: LocalId,
    /// ISO currency code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Local fields of a product offering price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductOfferingPriceFields {
    /// Priced offering
    pub product_offering: LocalId,
    /// Containing price list
    pub price_list: LocalId,
    /// Price amount
    pub amount: f64,
    /// Lifecycle status
    pub status: String,
}

/// Local fields of an opportunity line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityLineItemFields {
    /// Owning opportunity
    pub opportunity: LocalId,
    /// Price list the line is priced from
    pub price_list: LocalId,
    /// Offering sold on this line
    pub product_offering: LocalId,
    /// Price record backing the line
    #[serde(default)]
    pub product_offering_price: Option<LocalId>,
    /// Unit of measure
    pub unit_of_measure: String,
    /// Quantity
    pub quantity: u32,
    /// Term length in months
    pub term_months: u32,
}

/// Local fields of a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteFields {
    /// Quoted opportunity
    pub opportunity: LocalId,
    /// Quoted account
    pub account: LocalId,
    /// Price list used for the quote
    #[serde(default)]
    pub price_list: Option<LocalId>,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Remote status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Local fields of a quote line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteLineFields {
    /// Owning quote
    pub quote: LocalId,
    /// Quoted offering
    pub product_offering: LocalId,
    /// Price list of the line
    pub price_list: LocalId,
    /// Quantity
    pub quantity: f64,
    /// Line action (add, remove, ...)
    pub action: String,
    /// Position among the created lines of the quote, starting at 1
    pub line_number: u32,
}

macro_rules! impl_to_fields {
    ($($ty:ty),*) => {
        $(
            impl $ty {
                /// Encode as a local field map
                pub fn to_fields(&self) -> Fields {
                    to_fields(self)
                }
            }
        )*
    };
}

impl_to_fields!(
    OpportunityFields,
    PriceListFields,
    ProductOfferingPriceFields,
    OpportunityLineItemFields,
    QuoteFields,
    QuoteLineFields
);

/// Price list to use for a new opportunity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceListRequest {
    /// Reference an already-synced price list
    Existing {
        /// Local id of the price list
        id: LocalId,
    },
    /// Create a new price list for the opportunity's account
    New(NewPriceList),
}

/// Definition of a price list to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPriceList {
    /// Display name
    pub name: String,
    /// ISO currency code
    #[serde(default)]
    pub currency: Option<String>,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
}

/// One offering to price and add to an opportunity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferingRequest {
    /// Local id of the product offering
    pub product_offering: LocalId,
    /// Price amount
    pub amount: f64,
    /// Quantity
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Unit of measure
    #[serde(default = "default_unit_of_measure")]
    pub unit_of_measure: String,
    /// Term length in months
    #[serde(default)]
    pub term_months: u32,
}

fn default_quantity() -> u32 {
    1
}

fn default_unit_of_measure() -> String {
    "each".to_string()
}

/// Input of the opportunity creation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOpportunityInput {
    /// Caller-chosen local id; re-running with the same id reuses what was already synced
    #[serde(default)]
    pub opportunity_id: Option<LocalId>,
    /// Owning account
    pub account: LocalId,
    /// Display name
    pub name: String,
    /// Sales stage
    pub stage: String,
    /// Sales cycle type
    pub sales_cycle_type: String,
    /// Expected close date
    #[serde(default)]
    pub close_date: Option<NaiveDate>,
    /// Price list to create or reference
    #[serde(default)]
    pub price_list: Option<PriceListRequest>,
    /// Offerings to price
    #[serde(default)]
    pub offerings: Vec<OfferingRequest>,
}

impl CreateOpportunityInput {
    /// Check the input before anything is written
    pub fn validate(&self) -> Result<(), StepError> {
        if self.name.trim().is_empty() {
            return Err(StepError::validation("opportunity name must not be empty"));
        }
        if !self.offerings.is_empty() && self.price_list.is_none() {
            return Err(StepError::validation(
                "offerings cannot be priced without a price list",
            ));
        }
        if let Some(PriceListRequest::New(list)) = &self.price_list {
            list.validate()?;
        }
        validate_offerings(&self.offerings)
    }
}

/// Input of the pricing replacement pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacePricingInput {
    /// The price list that supersedes the current one
    pub price_list: NewPriceList,
    /// Offerings to price against the new list
    #[serde(default)]
    pub offerings: Vec<OfferingRequest>,
}

impl ReplacePricingInput {
    /// Check the input before anything is written
    pub fn validate(&self) -> Result<(), StepError> {
        self.price_list.validate()?;
        validate_offerings(&self.offerings)
    }
}

impl NewPriceList {
    fn validate(&self) -> Result<(), StepError> {
        if self.name.trim().is_empty() {
            return Err(StepError::validation("price list name must not be empty"));
        }
        Ok(())
    }
}

fn validate_offerings(offerings: &[OfferingRequest]) -> Result<(), StepError> {
    let mut seen = HashSet::new();
    for offering in offerings {
        if !seen.insert(&offering.product_offering) {
            return Err(StepError::validation(format!(
                "product offering {} is listed more than once",
                offering.product_offering
            )));
        }
        if !offering.amount.is_finite() || offering.amount < 0.0 {
            return Err(StepError::validation(format!(
                "amount for product offering {} must be a non-negative number",
                offering.product_offering
            )));
        }
        if offering.quantity == 0 {
            return Err(StepError::validation(format!(
                "quantity for product offering {} must be at least 1",
                offering.product_offering
            )));
        }
    }
    Ok(())
}

/// Response of the remote quote computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteComputation {
    /// The computed quote
    pub quote: RemoteQuote,
    /// Its lines
    #[serde(default)]
    pub lines: Vec<RemoteQuoteLine>,
}

/// Quote as returned by the external system; references are external ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteQuote {
    /// External id of the quote
    pub id: ExternalId,
    /// Quoted account
    pub account: ExternalId,
    /// Quoted opportunity
    pub opportunity: ExternalId,
    /// Price list, if the quote is priced
    #[serde(default)]
    pub price_list: Option<ExternalId>,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Remote status
    #[serde(default)]
    pub status: Option<String>,
}

/// Quote line as returned by the external system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteQuoteLine {
    /// External id of the line
    pub id: ExternalId,
    /// Quoted offering
    pub product_offering: ExternalId,
    /// Price list of the line; the quote's list when absent
    #[serde(default)]
    pub price_list: Option<ExternalId>,
    /// Quantity
    #[serde(default = "default_line_quantity")]
    pub quantity: f64,
    /// Line action
    #[serde(default = "default_line_action")]
    pub action: String,
}

fn default_line_quantity() -> f64 {
    1.0
}

fn default_line_action() -> String {
    "add".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn offering(id: &str, amount: f64) -> OfferingRequest {
        OfferingRequest {
            product_offering: id.into(),
            amount,
            quantity: 1,
            unit_of_measure: "each".to_string(),
            term_months: 12,
        }
    }

    fn input() -> CreateOpportunityInput {
        CreateOpportunityInput {
            opportunity_id: None,
            account: "acc-1".into(),
            name: "Renewal".to_string(),
            stage: "Prospecting".to_string(),
            sales_cycle_type: "New".to_string(),
            close_date: None,
            price_list: Some(PriceListRequest::New(NewPriceList {
                name: "Q3 Promo".to_string(),
                currency: None,
                description: None,
            })),
            offerings: vec![offering("po-a", 10.0), offering("po-b", 20.0)],
        }
    }

    #[test]
    fn test_price_list_request_shapes() {
        let existing: PriceListRequest = serde_json::from_value(json!({"id": "pl-1"})).unwrap();
        assert_eq!(existing, PriceListRequest::Existing { id: "pl-1".into() });

        let new: PriceListRequest =
            serde_json::from_value(json!({"name": "Q3 Promo", "currency": "EUR"})).unwrap();
        match new {
            PriceListRequest::New(list) => {
                assert_eq!(list.name, "Q3 Promo");
                assert_eq!(list.currency.as_deref(), Some("EUR"));
            }
            other => panic!("Expected a new price list, got {:?}", other),
        }
    }

    #[test]
    fn test_offering_defaults() {
        let parsed: OfferingRequest =
            serde_json::from_value(json!({"product_offering": "po-1", "amount": 5.5})).unwrap();
        assert_eq!(parsed.quantity, 1);
        assert_eq!(parsed.unit_of_measure, "each");
        assert_eq!(parsed.term_months, 0);
    }

    #[test]
    fn test_valid_input_passes() {
        assert!(input().validate().is_ok());
    }

    #[test]
    fn test_offerings_require_price_list() {
        let mut input = input();
        input.price_list = None;
        assert!(matches!(
            input.validate(),
            Err(StepError::ValidationFailed { .. })
        ));

        input.offerings.clear();
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_duplicate_and_invalid_offerings_rejected() {
        let mut duplicated = input();
        duplicated.offerings.push(offering("po-a", 11.0));
        assert!(duplicated.validate().is_err());

        let mut negative = input();
        negative.offerings[0].amount = -1.0;
        assert!(negative.validate().is_err());

        let mut zero = input();
        zero.offerings[1].quantity = 0;
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_line_item_fields_encode_references_as_local_ids() {
        let fields = OpportunityLineItemFields {
            opportunity: "opp-1".into(),
            price_list: "pl-1".into(),
            product_offering: "po-1".into(),
            product_offering_price: Some("pop-1".into()),
            unit_of_measure: "each".to_string(),
            quantity: 2,
            term_months: 12,
        }
        .to_fields();
        assert_eq!(fields["price_list"], json!("pl-1"));
        assert_eq!(fields["product_offering_price"], json!("pop-1"));
    }

    #[test]
    fn test_quote_computation_defaults() {
        let computation: QuoteComputation = serde_json::from_value(json!({
            "quote": {"id": "Q-1", "account": "ACC-1", "opportunity": "OPP-1"},
            "lines": [{"id": "QL-1", "product_offering": "PO-1"}]
        }))
        .unwrap();
        assert!(computation.quote.price_list.is_none());
        assert_eq!(computation.lines[0].action, "add");
        assert_eq!(computation.lines[0].quantity, 1.0);
    }
}
