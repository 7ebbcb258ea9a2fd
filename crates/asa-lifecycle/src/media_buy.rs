// SPDX-License-Identifier: MIT OR Apache-2.0
//! Media-buy create and update.
//!
//! Create runs the full §"validate, resolve, dispatch, persist" path:
//! envelope validation, product and pricing resolution, creative checks,
//! adapter invocation under timeout, then one atomic persistence of the
//! buy, its packages, its assignments, and the workflow record. An adapter
//! failure leaves no local row. Responses are the tagged success/error
//! unions; every error raised along the way becomes the error shape.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use asa_adapter_core::{
    AdapterCreateRequest, AdapterPackageRequest, DEFAULT_ADAPTER_TIMEOUT_SECS, LineItemType,
    NonGuaranteedAutomation, RetryPolicy, with_timeout,
};
use asa_catalog::validate_stored_product;
use asa_context::RequestContext;
use asa_core::budget::extract_budget_amount;
use asa_core::creative::{Creative, lift_tracking_urls, validate_against_format};
use asa_core::media_buy::{
    CreateMediaBuyRequest, CreateMediaBuyResponse, CreateMediaBuySuccess, MediaBuyStatus,
    PackageRequest, PackageResponse, UpdateMediaBuyError, UpdateMediaBuyRequest,
    UpdateMediaBuyResponse, UpdateMediaBuySuccess,
};
use asa_core::pricing::{PricingSelector, ResolvedPricing, select_pricing_option};
use asa_core::tasks::TaskStatus;
use asa_error::{AdcpError, AdcpResult};
use asa_store::{
    ApprovalMode, AuditLogRow, ContextRow, CreativeAssignmentRow, MediaBuyRow, MediaPackageRow,
    NewMediaBuy, ObjectWorkflowMappingRow, WorkflowStepRow,
};

use crate::Lifecycle;

/// One fully validated package, ready for the adapter.
struct PreparedPackage {
    request: AdapterPackageRequest,
    source: PackageRequest,
}

impl Lifecycle {
    /// `create_media_buy`.
    ///
    /// Always returns one of the two response shapes; internal errors are
    /// folded into the error shape with their taxonomy code preserved.
    pub async fn create_media_buy(
        &self,
        ctx: &RequestContext,
        request: CreateMediaBuyRequest,
    ) -> CreateMediaBuyResponse {
        let buyer_ref = request.buyer_ref.clone();
        match self.try_create(ctx, request).await {
            Ok(success) => CreateMediaBuyResponse::Success(success),
            Err(err) => {
                warn!(tenant_id = ctx.tenant_id(), buyer_ref, %err, "create_media_buy failed");
                CreateMediaBuyResponse::from_error(Some(buyer_ref), &err)
            }
        }
    }

    async fn try_create(
        &self,
        ctx: &RequestContext,
        request: CreateMediaBuyRequest,
    ) -> AdcpResult<CreateMediaBuySuccess> {
        let now = ctx.request_timestamp;
        request.validate_envelope(now)?;

        let currency = request.currency.clone().unwrap_or_else(|| "USD".to_string());
        let adapter = self.adapters.for_tenant(&ctx.tenant)?;

        let mut prepared = Vec::with_capacity(request.packages.len());
        for package in &request.packages {
            prepared.push(self.prepare_package(ctx, package, &currency).await?);
        }

        let media_buy_id = derive_media_buy_id(request.po_number.as_deref());
        let start_utc = request.start_time.resolve(now);
        let end_utc = request.end_time.with_timezone(&Utc);

        let adapter_request = AdapterCreateRequest {
            media_buy_id: media_buy_id.clone(),
            buyer_ref: request.buyer_ref.clone(),
            po_number: request.po_number.clone(),
            currency: currency.clone(),
            total_budget: request.get_total_budget(),
            start_time: start_utc,
            end_time: end_utc,
            packages: prepared.iter().map(|p| p.request.clone()).collect(),
        };

        let timeout = Duration::from_secs(DEFAULT_ADAPTER_TIMEOUT_SECS);
        let outcome = with_timeout("create_media_buy", timeout, async {
            RetryPolicy::default()
                .run("create_media_buy", || {
                    adapter.create_media_buy(ctx, adapter_request.clone())
                })
                .await
        })
        .await?;

        // Human gate: either the adapter demanded confirmation or the
        // tenant reviews everything.
        let manual = outcome.manual_approval_required
            || ctx.tenant.approval_mode == ApprovalMode::RequireHuman;
        let status = if manual {
            MediaBuyStatus::PendingActivation
        } else if start_utc <= now {
            MediaBuyStatus::Active
        } else {
            MediaBuyStatus::Scheduled
        };

        let raw_request = serde_json::to_value(&request).unwrap_or_default();
        let media_buy = MediaBuyRow {
            media_buy_id: outcome.media_buy_id.clone(),
            tenant_id: ctx.tenant_id().to_string(),
            principal_id: ctx.principal_id.clone(),
            buyer_ref: request.buyer_ref.clone(),
            status,
            start_time: Some(start_utc),
            end_time: Some(end_utc),
            start_date: None,
            end_date: None,
            currency: currency.clone(),
            po_number: request.po_number.clone(),
            raw_request: raw_request.clone(),
            created_at: now,
        };

        let mut package_rows = Vec::with_capacity(outcome.packages.len());
        let mut assignment_rows = Vec::new();
        let mut response_packages = Vec::with_capacity(outcome.packages.len());
        for (index, created) in outcome.packages.iter().enumerate() {
            let source = prepared
                .iter()
                .find(|p| p.source.buyer_ref == created.buyer_ref)
                .or_else(|| prepared.get(index))
                .ok_or_else(|| {
                    AdcpError::adapter(format!(
                        "adapter returned unknown package '{}'",
                        created.package_id
                    ))
                })?;

            let (amount, _) = extract_budget_amount(source.source.budget.as_ref(), &currency);
            package_rows.push(MediaPackageRow {
                tenant_id: ctx.tenant_id().to_string(),
                media_buy_id: outcome.media_buy_id.clone(),
                package_id: created.package_id.clone(),
                product_id: source.source.product_id.clone(),
                buyer_ref: created.buyer_ref.clone(),
                budget: Some(amount),
                bid_price: source.request.pricing.bid_price,
                pacing: None,
                paused: created.paused,
                // Legacy JSON projection, kept in lockstep from day one.
                package_config: serde_json::json!({
                    "budget": amount,
                    "pricing_option_id": source.request.pricing.pricing_option_id,
                    "pricing_model": source.request.pricing.pricing_model,
                }),
            });

            for creative_id in &created.creative_ids {
                assignment_rows.push(CreativeAssignmentRow {
                    assignment_id: format!("assign_{}", Uuid::new_v4().simple()),
                    tenant_id: ctx.tenant_id().to_string(),
                    media_buy_id: outcome.media_buy_id.clone(),
                    package_id: created.package_id.clone(),
                    creative_id: creative_id.clone(),
                    weight: 100,
                    rotation_type: None,
                    override_click_url: None,
                    override_start_time: None,
                    override_end_time: None,
                });
            }

            response_packages.push(PackageResponse {
                package_id: created.package_id.clone(),
                buyer_ref: Some(created.buyer_ref.clone()),
                paused: created.paused,
                creative_assignments: created.creative_ids.clone(),
            });
        }

        self.store
            .insert_media_buy(NewMediaBuy {
                media_buy,
                packages: package_rows,
                assignments: assignment_rows,
            })
            .await?;

        // The create is tracked as a workflow step either way; manual
        // approval parks it open.
        self.store
            .insert_context(ContextRow {
                context_id: ctx.context_id.clone(),
                tenant_id: ctx.tenant_id().to_string(),
                created_at: now,
            })
            .await;
        let step_id = format!("step_{}", Uuid::new_v4().simple());
        self.store
            .insert_workflow_step(
                WorkflowStepRow {
                    step_id: step_id.clone(),
                    context_id: ctx.context_id.clone(),
                    tool_name: "create_media_buy".to_string(),
                    step_type: if manual { "approval" } else { "creation" }.to_string(),
                    status: if manual {
                        TaskStatus::RequiresApproval
                    } else {
                        TaskStatus::Completed
                    },
                    owner: Some(if manual { "publisher" } else { "system" }.to_string()),
                    request_data: Some(raw_request),
                    response_data: None,
                    error_message: None,
                    created_at: now,
                    completed_at: (!manual).then_some(now),
                },
                vec![ObjectWorkflowMappingRow {
                    step_id,
                    object_type: "media_buy".to_string(),
                    object_id: outcome.media_buy_id.clone(),
                    action: "create".to_string(),
                    created_at: now,
                }],
            )
            .await;

        self.store
            .append_audit(AuditLogRow {
                tenant_id: ctx.tenant_id().to_string(),
                operation: "create_media_buy".to_string(),
                principal_id: ctx.principal_id.clone(),
                success: true,
                details: serde_json::json!({
                    "media_buy_id": outcome.media_buy_id,
                    "status": status,
                    "packages": response_packages.len(),
                }),
                created_at: now,
            })
            .await;

        info!(
            tenant_id = ctx.tenant_id(),
            media_buy_id = %outcome.media_buy_id,
            %status,
            "media buy created"
        );

        Ok(CreateMediaBuySuccess {
            media_buy_id: outcome.media_buy_id,
            buyer_ref: request.buyer_ref,
            packages: response_packages,
            creative_deadline: outcome.creative_deadline,
        })
    }

    /// Validate one package and render it for the adapter.
    async fn prepare_package(
        &self,
        ctx: &RequestContext,
        package: &PackageRequest,
        currency: &str,
    ) -> AdcpResult<PreparedPackage> {
        let product = self
            .store
            .get_product(ctx.tenant_id(), &package.product_id)
            .await?;
        validate_stored_product(&product)?;

        let (amount, package_currency) =
            extract_budget_amount(package.budget.as_ref(), currency);
        let selector = PricingSelector {
            pricing_option_id: package.pricing_option_id.as_deref(),
            pricing_model: package.pricing_model,
            bid_price: package.bid_price,
            budget: amount,
        };
        let pricing: ResolvedPricing = select_pricing_option(
            &product.product_id,
            &product.pricing_options,
            &selector,
            &package_currency,
        )?;

        let creatives = self.render_creatives(ctx, package, &product).await?;

        let implementation = product.implementation_config.as_ref();
        let line_item_type = LineItemType::from_config(
            implementation
                .and_then(|c| c.get("line_item_type"))
                .and_then(|v| v.as_str()),
        );
        let automation = NonGuaranteedAutomation::from_config(
            implementation
                .and_then(|c| c.get("non_guaranteed_automation"))
                .and_then(|v| v.as_str()),
        );

        Ok(PreparedPackage {
            request: AdapterPackageRequest {
                package_id: format!("pkg_{}", Uuid::new_v4().simple()),
                buyer_ref: package.buyer_ref.clone(),
                product_id: package.product_id.clone(),
                pricing,
                budget: amount,
                creatives,
                targeting_overlay: package.targeting_overlay.clone(),
                line_item_type,
                automation,
            },
            source: package.clone(),
        })
    }

    /// Resolve, validate, and render the creatives a package references.
    async fn render_creatives(
        &self,
        ctx: &RequestContext,
        package: &PackageRequest,
        product: &asa_core::Product,
    ) -> AdcpResult<Vec<Creative>> {
        let mut rendered = Vec::with_capacity(package.creative_ids.len());
        for creative_id in &package.creative_ids {
            let row = self
                .store
                .get_creative(ctx.tenant_id(), creative_id)
                .await
                .ok_or_else(|| {
                    AdcpError::not_found(format!("creative '{creative_id}' not found"))
                        .with_detail("creative_id", creative_id.clone())
                })?;

            let accepted = product
                .format_ids
                .iter()
                .any(|f| f.matches(&row.creative.format_id));
            if !accepted {
                return Err(AdcpError::validation(format!(
                    "creative '{creative_id}' format '{}' is not accepted by product '{}'",
                    row.creative.format_id, product.product_id
                )));
            }

            let spec = self
                .formats
                .resolve(ctx.tenant_id(), &row.creative.format_id)
                .await?;
            validate_against_format(&row.creative, &spec)?;

            let mut creative = row.creative.clone();
            lift_tracking_urls(&mut creative);
            rendered.push(creative);
        }
        Ok(rendered)
    }

    /// `update_media_buy`.
    ///
    /// The local record changes only after the adapter reports success; a
    /// partial adapter application is treated as an error and leaves the
    /// local record untouched, with the applied packages listed in detail.
    pub async fn update_media_buy(
        &self,
        ctx: &RequestContext,
        request: UpdateMediaBuyRequest,
    ) -> UpdateMediaBuyResponse {
        match self.try_update(ctx, request).await {
            Ok(success) => UpdateMediaBuyResponse::Success(success),
            Err(err) => {
                warn!(tenant_id = ctx.tenant_id(), %err, "update_media_buy failed");
                UpdateMediaBuyResponse::Error(UpdateMediaBuyError {
                    errors: vec![err.to_object()],
                })
            }
        }
    }

    async fn try_update(
        &self,
        ctx: &RequestContext,
        mut request: UpdateMediaBuyRequest,
    ) -> AdcpResult<UpdateMediaBuySuccess> {
        request.validate_selector()?;

        let buy = match (&request.media_buy_id, &request.buyer_ref) {
            (Some(id), _) => self.store.get_media_buy(ctx.tenant_id(), id).await?,
            (None, Some(buyer_ref)) => {
                self.store
                    .get_media_buy_by_buyer_ref(ctx.tenant_id(), buyer_ref)
                    .await?
            }
            (None, None) => unreachable!("selector validated above"),
        };
        // Normalize so adapters always see the platform id.
        request.media_buy_id = Some(buy.media_buy_id.clone());
        request.buyer_ref = None;

        let adapter = self.adapters.for_tenant(&ctx.tenant)?;
        let timeout = Duration::from_secs(DEFAULT_ADAPTER_TIMEOUT_SECS);
        let outcome = with_timeout("update_media_buy", timeout, async {
            RetryPolicy::default()
                .run("update_media_buy", || adapter.update_media_buy(ctx, &request))
                .await
        })
        .await?;

        // Partial application is an error: the local record must never get
        // ahead of the ad server.
        let requested: Vec<&str> = request.packages.iter().map(|p| p.package_id.as_str()).collect();
        let missing: Vec<&str> = requested
            .iter()
            .filter(|id| !outcome.affected_packages.iter().any(|a| a == *id))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(AdcpError::adapter(format!(
                "adapter applied only part of the update; unapplied packages: {}",
                missing.join(", ")
            ))
            .with_detail("applied_packages", outcome.affected_packages.clone())
            .with_detail("unapplied_packages", missing));
        }

        // Adapter accepted everything; now mirror locally.
        let mut status = buy.status;
        if let Some(paused) = request.paused {
            let next = if paused {
                MediaBuyStatus::Paused
            } else if buy.status == MediaBuyStatus::Paused {
                let now = ctx.request_timestamp;
                match buy.start_time {
                    Some(start) if start > now => MediaBuyStatus::Scheduled,
                    _ => MediaBuyStatus::Active,
                }
            } else {
                buy.status
            };
            if next != buy.status {
                self.store
                    .transition_media_buy_status(ctx.tenant_id(), &buy.media_buy_id, next)
                    .await?;
                status = next;
            }
        }

        let start_utc: Option<DateTime<Utc>> = request
            .start_time
            .as_ref()
            .map(|s| s.resolve(ctx.request_timestamp));
        let end_utc = request.end_time.map(|t| t.with_timezone(&Utc));
        if start_utc.is_some() || end_utc.is_some() {
            self.store
                .update_media_buy_flight(ctx.tenant_id(), &buy.media_buy_id, start_utc, end_utc)
                .await?;
        }

        for package_update in &request.packages {
            if let Some(paused) = package_update.paused {
                self.store
                    .set_package_paused(
                        ctx.tenant_id(),
                        &buy.media_buy_id,
                        &package_update.package_id,
                        paused,
                    )
                    .await?;
            }
            if package_update.budget.is_some() || package_update.bid_price.is_some() {
                self.store
                    .update_media_package_fields(
                        ctx.tenant_id(),
                        &buy.media_buy_id,
                        &package_update.package_id,
                        package_update.budget.as_ref(),
                        package_update.bid_price,
                        None,
                    )
                    .await?;
            }
        }

        info!(
            tenant_id = ctx.tenant_id(),
            media_buy_id = %buy.media_buy_id,
            "media buy updated"
        );

        Ok(UpdateMediaBuySuccess {
            media_buy_id: buy.media_buy_id,
            status,
            affected_packages: outcome.affected_packages,
        })
    }
}

/// Derive a media-buy id from the naming template.
///
/// The template incorporates the PO number when one is supplied, so the
/// observable id is not necessarily derived from the buyer's reference.
pub fn derive_media_buy_id(po_number: Option<&str>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    match po_number {
        Some(po) if !po.trim().is_empty() => {
            let slug: String = po
                .trim()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
                .collect();
            format!("mb_{slug}_{}", &suffix[..8])
        }
        _ => format!("mb_{}", &suffix[..12]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_template_incorporates_po_number() {
        let id = derive_media_buy_id(Some("PO-2026/001"));
        assert!(id.starts_with("mb_po_2026_001_"));
    }

    #[test]
    fn naming_template_without_po_is_opaque() {
        let id = derive_media_buy_id(None);
        assert!(id.starts_with("mb_"));
        assert_eq!(id.len(), 3 + 12);
    }

    #[test]
    fn blank_po_is_ignored() {
        let id = derive_media_buy_id(Some("   "));
        assert_eq!(id.len(), 3 + 12);
    }
}
