use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use super::Orchestrator;
use crate::application::fan_out::FanOutMode;
use crate::application::step_executor::StepSpec;
use crate::domain::entities::{
    QuoteComputation, QuoteFields, QuoteLineFields, RemoteQuote, RemoteQuoteLine,
};
use crate::domain::external::RemoteRecord;
use crate::domain::result::{ItemResult, QuoteReport, WorkflowResult};
use crate::error::StepError;
use crate::types::{to_fields, Credential, EntityKind, Fields, LocalId, Synced};

/// A quote line whose references all resolved locally
struct ResolvedLine {
    line: RemoteQuoteLine,
    input: Value,
    product_offering: LocalId,
    price_list: LocalId,
}

/// Where a quote line ended up
enum LineOutcome {
    Created(ItemResult),
    Invalid(ItemResult),
    NotPersisted(ItemResult),
}

impl Orchestrator {
    /// Compute a quote remotely and mirror it with its lines
    ///
    /// Every line lands in exactly one of the report's buckets: created,
    /// validation errors (a reference did not resolve) or creation errors
    /// (the local write failed). The run succeeds only when every line was
    /// created.
    #[instrument(skip(self, credential), fields(opportunity = %opportunity_id))]
    pub async fn generate_quote(
        &self,
        credential: &Credential,
        opportunity_id: &LocalId,
    ) -> WorkflowResult {
        let mut report = QuoteReport::default();

        let opportunity = match self
            .resolver
            .resolve(EntityKind::Opportunity, opportunity_id)
            .await
        {
            Ok(external_id) => external_id,
            Err(err) => return WorkflowResult::hard_failure(report, err),
        };

        let mut payload = Fields::new();
        payload.insert("opportunity".into(), json!(opportunity));
        let response = match self
            .executor
            .invoke(credential, &self.config.quote_action, &payload)
            .await
        {
            Ok(response) => response,
            Err(err) => return WorkflowResult::hard_failure(report, err),
        };

        let computation: QuoteComputation = match serde_json::from_value(response) {
            Ok(computation) => computation,
            Err(err) => {
                return WorkflowResult::hard_failure(
                    report,
                    StepError::validation(format!("Unexpected quote response: {}", err)),
                )
            }
        };
        report.remote_quote = Some(computation.quote.id.clone());
        debug!(quote = %computation.quote.id, lines = computation.lines.len(), "Quote computed");

        // The remote quote exists from here on; failures are partial
        let quote_fields = match self.resolve_quote(&computation.quote).await {
            Ok(fields) => fields,
            Err(err) => return WorkflowResult::aborted(report, err),
        };
        let quote_price_list = quote_fields.price_list.clone();
        let quote_price_list = quote_price_list.as_ref();

        let quote = match self
            .persist_quote(credential, &computation.quote, quote_fields)
            .await
        {
            Ok(quote) => quote,
            Err(err) => return WorkflowResult::aborted(report, err),
        };
        report.quote = Some(quote.to_ref(EntityKind::Quote));

        let resolved = self
            .aggregator
            .run_all(computation.lines, FanOutMode::Concurrent, move |line| {
                self.resolve_quote_line(line, quote_price_list)
            })
            .await;

        let quote_ref = &quote;
        let (outcomes, _) = self
            .aggregator
            .fold_sequential(resolved, 1u32, move |line_number, line| {
                self.persist_quote_line(credential, quote_ref, line, line_number)
            })
            .await;

        let mut items = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                LineOutcome::Created(item) => {
                    items.push(item.clone());
                    report.created.push(item);
                }
                LineOutcome::Invalid(item) => {
                    items.push(item.clone());
                    report.validation_errors.push(item);
                }
                LineOutcome::NotPersisted(item) => {
                    items.push(item.clone());
                    report.creation_errors.push(item);
                }
            }
        }

        let headline = items.iter().find_map(|item| item.error.clone());
        let result = WorkflowResult::completed(report, items, headline);
        info!(outcome = ?result.outcome, items = result.items.len(), "Quote pipeline finished");
        result
    }

    /// Map the quote's external references to local ids
    async fn resolve_quote(&self, quote: &RemoteQuote) -> Result<QuoteFields, StepError> {
        let account = self
            .resolver
            .resolve_local(EntityKind::Account, &quote.account)
            .await?;
        let opportunity = self
            .resolver
            .resolve_local(EntityKind::Opportunity, &quote.opportunity)
            .await?;
        let price_list = match &quote.price_list {
            Some(external_id) => Some(
                self.resolver
                    .resolve_local(EntityKind::PriceList, external_id)
                    .await?,
            ),
            None => None,
        };

        Ok(QuoteFields {
            opportunity,
            account,
            price_list,
            name: quote.name.clone(),
            status: quote.status.clone(),
        })
    }

    async fn persist_quote(
        &self,
        credential: &Credential,
        quote: &RemoteQuote,
        fields: QuoteFields,
    ) -> Result<Synced, StepError> {
        if let Some(existing) = self
            .store
            .find_by_external_id(EntityKind::Quote, &quote.id)
            .await?
            .and_then(|record| record.synced())
        {
            debug!(quote = %quote.id, local_id = %existing.local_id, "Quote already mirrored");
            return Ok(existing);
        }

        let pinned = self.pinner.pin(EntityKind::Quote);
        let remote = RemoteRecord {
            external_id: quote.id.clone(),
            fields: to_fields(quote),
        };
        self.create_synced(
            credential,
            StepSpec::adopt(
                EntityKind::Quote,
                json!({"quote": quote.id}),
                pinned,
                remote,
                fields.to_fields(),
            ),
        )
        .await
    }

    async fn resolve_quote_line(
        &self,
        line: RemoteQuoteLine,
        quote_price_list: Option<&LocalId>,
    ) -> Result<ResolvedLine, ItemResult> {
        let input = serde_json::to_value(&line).unwrap_or(Value::Null);
        let invalid = |message: String| ItemResult::failed(input.clone(), StepError::validation(message));

        let product_offering = match self
            .resolver
            .resolve_local(EntityKind::ProductOffering, &line.product_offering)
            .await
        {
            Ok(local_id) => local_id,
            Err(err) => return Err(invalid(format!("Quote line {}: {}", line.id, err))),
        };

        let price_list = match &line.price_list {
            Some(external_id) => match self
                .resolver
                .resolve_local(EntityKind::PriceList, external_id)
                .await
            {
                Ok(local_id) => local_id,
                Err(err) => return Err(invalid(format!("Quote line {}: {}", line.id, err))),
            },
            None => match quote_price_list {
                Some(local_id) => local_id.clone(),
                None => {
                    return Err(invalid(format!(
                        "Quote line {} has no price list and neither has its quote",
                        line.id
                    )))
                }
            },
        };

        Ok(ResolvedLine {
            line,
            input,
            product_offering,
            price_list,
        })
    }

    /// Mirror one validated line; the line number only advances on creation
    async fn persist_quote_line(
        &self,
        credential: &Credential,
        quote: &Synced,
        line: Result<ResolvedLine, ItemResult>,
        line_number: u32,
    ) -> (LineOutcome, u32) {
        let resolved = match line {
            Ok(resolved) => resolved,
            Err(invalid) => return (LineOutcome::Invalid(invalid), line_number),
        };

        match self
            .store
            .find_by_external_id(EntityKind::QuoteLine, &resolved.line.id)
            .await
        {
            Ok(Some(existing)) => {
                let item = ItemResult::succeeded(
                    resolved.input,
                    existing.external_id,
                    Some(existing.local_id),
                );
                return (LineOutcome::Created(item), line_number + 1);
            }
            Ok(None) => {}
            Err(err) => {
                return (
                    LineOutcome::NotPersisted(ItemResult::failed(resolved.input, err.into())),
                    line_number,
                )
            }
        }

        let fields = QuoteLineFields {
            quote: quote.local_id.clone(),
            product_offering: resolved.product_offering,
            price_list: resolved.price_list,
            quantity: resolved.line.quantity,
            action: resolved.line.action.clone(),
            line_number,
        };
        let remote = RemoteRecord {
            external_id: resolved.line.id.clone(),
            fields: to_fields(&resolved.line),
        };
        let pinned = self.pinner.pin(EntityKind::QuoteLine);
        let item = self
            .executor
            .execute_item(
                credential,
                StepSpec::adopt(
                    EntityKind::QuoteLine,
                    resolved.input,
                    pinned,
                    remote,
                    fields.to_fields(),
                ),
            )
            .await;

        if item.success {
            (LineOutcome::Created(item), line_number + 1)
        } else {
            (LineOutcome::NotPersisted(item), line_number)
        }
    }
}
