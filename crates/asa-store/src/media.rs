// SPDX-License-Identifier: MIT OR Apache-2.0
//! Media buys, packages, and creative assignments.

use chrono::Utc;
use serde_json::json;

use asa_core::budget::{Budget, BudgetInput};
use asa_core::media_buy::MediaBuyStatus;
use asa_error::{AdcpError, AdcpResult};

use crate::rows::{CreativeAssignmentRow, MediaBuyRow, MediaPackageRow};
use crate::Store;

/// The rows a successful create persists in one transaction.
#[derive(Debug, Clone)]
pub struct NewMediaBuy {
    /// The buy itself.
    pub media_buy: MediaBuyRow,
    /// Its packages.
    pub packages: Vec<MediaPackageRow>,
    /// Creative assignments carried in the create.
    pub assignments: Vec<CreativeAssignmentRow>,
}

impl Store {
    /// Persist a media buy, its packages, and its assignments atomically.
    ///
    /// # Errors
    ///
    /// `data_integrity_error` if the media-buy id already exists in the
    /// tenant; nothing is written in that case.
    pub async fn insert_media_buy(&self, new: NewMediaBuy) -> AdcpResult<()> {
        let mut guard = self.inner.write().await;
        let key = (
            new.media_buy.tenant_id.clone(),
            new.media_buy.media_buy_id.clone(),
        );
        if guard.media_buys.contains_key(&key) {
            return Err(AdcpError::data_integrity(format!(
                "media buy '{}' already exists",
                new.media_buy.media_buy_id
            )));
        }
        for package in &new.packages {
            guard.packages.insert(
                (
                    package.tenant_id.clone(),
                    package.media_buy_id.clone(),
                    package.package_id.clone(),
                ),
                package.clone(),
            );
        }
        guard.assignments.extend(new.assignments);
        guard.media_buys.insert(key, new.media_buy);
        Ok(())
    }

    /// Fetch a media buy by id.
    ///
    /// # Errors
    ///
    /// `not_found` when the buy does not exist in this tenant.
    pub async fn get_media_buy(&self, tenant_id: &str, media_buy_id: &str) -> AdcpResult<MediaBuyRow> {
        let guard = self.inner.read().await;
        guard
            .media_buys
            .get(&(tenant_id.to_string(), media_buy_id.to_string()))
            .cloned()
            .ok_or_else(|| {
                AdcpError::not_found(format!("media buy '{media_buy_id}' not found"))
                    .with_detail("media_buy_id", media_buy_id)
            })
    }

    /// Fetch a media buy by the buyer's reference.
    ///
    /// # Errors
    ///
    /// `not_found` when no buy in this tenant carries the reference.
    pub async fn get_media_buy_by_buyer_ref(
        &self,
        tenant_id: &str,
        buyer_ref: &str,
    ) -> AdcpResult<MediaBuyRow> {
        let guard = self.inner.read().await;
        guard
            .media_buys
            .iter()
            .filter(|((t, _), _)| t == tenant_id)
            .map(|(_, row)| row)
            .find(|row| row.buyer_ref == buyer_ref)
            .cloned()
            .ok_or_else(|| {
                AdcpError::not_found(format!("media buy with buyer_ref '{buyer_ref}' not found"))
            })
    }

    /// All media buys in the given statuses, across every tenant.
    ///
    /// Scheduler entry point; each returned row still carries its tenant for
    /// the per-buy session the caller opens.
    pub async fn list_media_buys_by_status(
        &self,
        statuses: &[MediaBuyStatus],
    ) -> Vec<MediaBuyRow> {
        let guard = self.inner.read().await;
        guard
            .media_buys
            .values()
            .filter(|row| statuses.contains(&row.status))
            .cloned()
            .collect()
    }

    /// All media buys for a tenant.
    pub async fn list_media_buys(&self, tenant_id: &str) -> Vec<MediaBuyRow> {
        let guard = self.inner.read().await;
        guard
            .media_buys
            .iter()
            .filter(|((t, _), _)| t == tenant_id)
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Transition a media buy's status, enforcing the forward-only machine.
    ///
    /// # Errors
    ///
    /// `not_found` for an unknown buy; `validation_error` for an illegal
    /// transition (backward moves are never persisted).
    pub async fn transition_media_buy_status(
        &self,
        tenant_id: &str,
        media_buy_id: &str,
        next: MediaBuyStatus,
    ) -> AdcpResult<()> {
        let mut guard = self.inner.write().await;
        let row = guard
            .media_buys
            .get_mut(&(tenant_id.to_string(), media_buy_id.to_string()))
            .ok_or_else(|| AdcpError::not_found(format!("media buy '{media_buy_id}' not found")))?;
        if !row.status.can_transition_to(next) {
            return Err(AdcpError::validation(format!(
                "illegal media buy status transition {} -> {next}",
                row.status
            ))
            .with_detail("media_buy_id", media_buy_id));
        }
        tracing::info!(media_buy_id, from = %row.status, to = %next, "media buy status transition");
        row.status = next;
        Ok(())
    }

    /// Apply several status transitions in one commit. Illegal transitions
    /// fail the whole batch.
    ///
    /// # Errors
    ///
    /// As [`Self::transition_media_buy_status`], atomically.
    pub async fn transition_media_buys(
        &self,
        transitions: &[(String, String, MediaBuyStatus)],
    ) -> AdcpResult<usize> {
        let mut guard = self.inner.write().await;
        // Validate first so a bad entry leaves the batch unapplied.
        for (tenant_id, media_buy_id, next) in transitions {
            let row = guard
                .media_buys
                .get(&(tenant_id.clone(), media_buy_id.clone()))
                .ok_or_else(|| {
                    AdcpError::not_found(format!("media buy '{media_buy_id}' not found"))
                })?;
            if !row.status.can_transition_to(*next) {
                return Err(AdcpError::validation(format!(
                    "illegal media buy status transition {} -> {next}",
                    row.status
                )));
            }
        }
        for (tenant_id, media_buy_id, next) in transitions {
            if let Some(row) = guard
                .media_buys
                .get_mut(&(tenant_id.clone(), media_buy_id.clone()))
            {
                tracing::info!(media_buy_id, from = %row.status, to = %next, "media buy status transition");
                row.status = *next;
            }
        }
        Ok(transitions.len())
    }

    /// Overwrite mutable flight fields after a successful adapter update.
    ///
    /// # Errors
    ///
    /// `not_found` when the buy does not exist in this tenant.
    pub async fn update_media_buy_flight(
        &self,
        tenant_id: &str,
        media_buy_id: &str,
        start_time: Option<chrono::DateTime<Utc>>,
        end_time: Option<chrono::DateTime<Utc>>,
    ) -> AdcpResult<()> {
        let mut guard = self.inner.write().await;
        let row = guard
            .media_buys
            .get_mut(&(tenant_id.to_string(), media_buy_id.to_string()))
            .ok_or_else(|| AdcpError::not_found(format!("media buy '{media_buy_id}' not found")))?;
        if let Some(start) = start_time {
            row.start_time = Some(start);
        }
        if let Some(end) = end_time {
            row.end_time = Some(end);
        }
        Ok(())
    }

    // -- packages ----------------------------------------------------------

    /// Packages of a media buy.
    pub async fn list_packages(&self, tenant_id: &str, media_buy_id: &str) -> Vec<MediaPackageRow> {
        let guard = self.inner.read().await;
        guard
            .packages
            .iter()
            .filter(|((t, m, _), _)| t == tenant_id && m == media_buy_id)
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Find a package anywhere in the tenant by its id.
    pub async fn find_package_by_id(
        &self,
        tenant_id: &str,
        package_id: &str,
    ) -> Option<MediaPackageRow> {
        let guard = self.inner.read().await;
        guard
            .packages
            .iter()
            .find(|((t, _, p), _)| t == tenant_id && p == package_id)
            .map(|(_, row)| row.clone())
    }

    /// Update a package's pricing fields with the dual-write pattern.
    ///
    /// Writes the typed `budget`/`bid_price`/`pacing` columns and the legacy
    /// `package_config` JSON projection together, so the two can never
    /// drift. All dual-write logic lives here.
    ///
    /// # Errors
    ///
    /// `not_found` when the package does not exist.
    pub async fn update_media_package_fields(
        &self,
        tenant_id: &str,
        media_buy_id: &str,
        package_id: &str,
        budget: Option<&BudgetInput>,
        bid_price: Option<f64>,
        pacing: Option<&str>,
    ) -> AdcpResult<()> {
        let mut guard = self.inner.write().await;
        let row = guard
            .packages
            .get_mut(&(
                tenant_id.to_string(),
                media_buy_id.to_string(),
                package_id.to_string(),
            ))
            .ok_or_else(|| {
                AdcpError::not_found(format!(
                    "package '{package_id}' not found on media buy '{media_buy_id}'"
                ))
            })?;

        apply_package_pricing(row, budget, bid_price, pacing);
        Ok(())
    }

    /// Set a package's paused flag.
    ///
    /// # Errors
    ///
    /// `not_found` when the package does not exist.
    pub async fn set_package_paused(
        &self,
        tenant_id: &str,
        media_buy_id: &str,
        package_id: &str,
        paused: bool,
    ) -> AdcpResult<()> {
        let mut guard = self.inner.write().await;
        let row = guard
            .packages
            .get_mut(&(
                tenant_id.to_string(),
                media_buy_id.to_string(),
                package_id.to_string(),
            ))
            .ok_or_else(|| {
                AdcpError::not_found(format!(
                    "package '{package_id}' not found on media buy '{media_buy_id}'"
                ))
            })?;
        row.paused = paused;
        Ok(())
    }

    // -- assignments --------------------------------------------------------

    /// Record a creative assignment.
    pub async fn insert_assignment(&self, assignment: CreativeAssignmentRow) {
        let mut guard = self.inner.write().await;
        guard.assignments.push(assignment);
    }

    /// Assignments targeting a media buy.
    pub async fn list_assignments_for_media_buy(
        &self,
        tenant_id: &str,
        media_buy_id: &str,
    ) -> Vec<CreativeAssignmentRow> {
        let guard = self.inner.read().await;
        guard
            .assignments
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.media_buy_id == media_buy_id)
            .cloned()
            .collect()
    }

    /// Assignments involving a creative.
    pub async fn list_assignments_for_creative(
        &self,
        tenant_id: &str,
        creative_id: &str,
    ) -> Vec<CreativeAssignmentRow> {
        let guard = self.inner.read().await;
        guard
            .assignments
            .iter()
            .filter(|a| a.tenant_id == tenant_id && a.creative_id == creative_id)
            .cloned()
            .collect()
    }
}

/// Dual-write one package's pricing fields.
fn apply_package_pricing(
    row: &mut MediaPackageRow,
    budget: Option<&BudgetInput>,
    bid_price: Option<f64>,
    pacing: Option<&str>,
) {
    let (budget_value, budget_currency, budget_pacing) = match budget {
        Some(BudgetInput::Amount(n)) => (Some(*n), None, None),
        Some(BudgetInput::Object(Budget {
            total,
            currency,
            pacing,
        })) => (Some(*total), Some(currency.clone()), *pacing),
        None => (None, None, None),
    };

    // 1. Typed columns.
    row.budget = budget_value;
    row.bid_price = bid_price;
    let pacing_value = pacing
        .map(str::to_string)
        .or_else(|| budget_pacing.map(|p| p.as_str().to_string()));
    row.pacing = pacing_value.clone();

    // 2. Legacy JSON projection.
    if !row.package_config.is_object() {
        row.package_config = json!({});
    }
    let config = row
        .package_config
        .as_object_mut()
        .expect("package_config is an object");
    match budget {
        Some(BudgetInput::Amount(n)) => {
            config.insert("budget".into(), json!(n));
        }
        Some(BudgetInput::Object(b)) => {
            config.insert(
                "budget".into(),
                json!({
                    "total": b.total,
                    "currency": budget_currency,
                    "pacing": budget_pacing,
                }),
            );
        }
        None => {}
    }
    if let Some(bid) = bid_price {
        let pricing_info = config
            .entry("pricing_info")
            .or_insert_with(|| json!({}));
        if let Some(obj) = pricing_info.as_object_mut() {
            obj.insert("bid_price".into(), json!(bid));
        }
    }
    if let Some(p) = pacing_value {
        config.insert("pacing".into(), json!(p));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn buy(tenant: &str, id: &str, status: MediaBuyStatus) -> MediaBuyRow {
        MediaBuyRow {
            media_buy_id: id.into(),
            tenant_id: tenant.into(),
            principal_id: "buyer_1".into(),
            buyer_ref: format!("ref_{id}"),
            status,
            start_time: Some(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()),
            end_time: Some(Utc.with_ymd_and_hms(2099, 1, 31, 23, 59, 59).unwrap()),
            start_date: None,
            end_date: None,
            currency: "USD".into(),
            po_number: None,
            raw_request: json!({}),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn package(tenant: &str, media_buy_id: &str, package_id: &str) -> MediaPackageRow {
        MediaPackageRow {
            tenant_id: tenant.into(),
            media_buy_id: media_buy_id.into(),
            package_id: package_id.into(),
            product_id: "prod_1".into(),
            buyer_ref: "p1".into(),
            budget: None,
            bid_price: None,
            pacing: None,
            paused: false,
            package_config: json!({}),
        }
    }

    #[tokio::test]
    async fn insert_is_atomic_and_rejects_duplicates() {
        let store = Store::new();
        let new = NewMediaBuy {
            media_buy: buy("pub_a", "mb_1", MediaBuyStatus::Scheduled),
            packages: vec![package("pub_a", "mb_1", "pkg_1")],
            assignments: vec![],
        };
        store.insert_media_buy(new.clone()).await.unwrap();

        let err = store.insert_media_buy(new).await.unwrap_err();
        assert_eq!(err.code, asa_error::ErrorCode::DataIntegrityError);

        let packages = store.list_packages("pub_a", "mb_1").await;
        assert_eq!(packages.len(), 1);
    }

    #[tokio::test]
    async fn backward_transition_is_never_persisted() {
        let store = Store::new();
        store
            .insert_media_buy(NewMediaBuy {
                media_buy: buy("pub_a", "mb_1", MediaBuyStatus::Active),
                packages: vec![],
                assignments: vec![],
            })
            .await
            .unwrap();

        let err = store
            .transition_media_buy_status("pub_a", "mb_1", MediaBuyStatus::Scheduled)
            .await
            .unwrap_err();
        assert_eq!(err.code, asa_error::ErrorCode::ValidationError);

        let row = store.get_media_buy("pub_a", "mb_1").await.unwrap();
        assert_eq!(row.status, MediaBuyStatus::Active);
    }

    #[tokio::test]
    async fn pause_is_allowed_from_active() {
        let store = Store::new();
        store
            .insert_media_buy(NewMediaBuy {
                media_buy: buy("pub_a", "mb_1", MediaBuyStatus::Active),
                packages: vec![],
                assignments: vec![],
            })
            .await
            .unwrap();
        store
            .transition_media_buy_status("pub_a", "mb_1", MediaBuyStatus::Paused)
            .await
            .unwrap();
        let row = store.get_media_buy("pub_a", "mb_1").await.unwrap();
        assert_eq!(row.status, MediaBuyStatus::Paused);
    }

    #[tokio::test]
    async fn batch_transitions_fail_atomically() {
        let store = Store::new();
        for (id, status) in [
            ("mb_1", MediaBuyStatus::Scheduled),
            ("mb_2", MediaBuyStatus::Completed),
        ] {
            store
                .insert_media_buy(NewMediaBuy {
                    media_buy: buy("pub_a", id, status),
                    packages: vec![],
                    assignments: vec![],
                })
                .await
                .unwrap();
        }

        // Second entry is illegal (completed -> active); nothing applies.
        let err = store
            .transition_media_buys(&[
                ("pub_a".into(), "mb_1".into(), MediaBuyStatus::Active),
                ("pub_a".into(), "mb_2".into(), MediaBuyStatus::Active),
            ])
            .await
            .unwrap_err();
        assert_eq!(err.code, asa_error::ErrorCode::ValidationError);
        let row = store.get_media_buy("pub_a", "mb_1").await.unwrap();
        assert_eq!(row.status, MediaBuyStatus::Scheduled);
    }

    #[tokio::test]
    async fn buyer_ref_lookup_is_tenant_scoped() {
        let store = Store::new();
        store
            .insert_media_buy(NewMediaBuy {
                media_buy: buy("pub_a", "mb_1", MediaBuyStatus::Active),
                packages: vec![],
                assignments: vec![],
            })
            .await
            .unwrap();

        assert!(store.get_media_buy_by_buyer_ref("pub_a", "ref_mb_1").await.is_ok());
        assert!(store.get_media_buy_by_buyer_ref("pub_b", "ref_mb_1").await.is_err());
    }

    #[tokio::test]
    async fn dual_write_keeps_json_projection_in_lockstep() {
        let store = Store::new();
        store
            .insert_media_buy(NewMediaBuy {
                media_buy: buy("pub_a", "mb_1", MediaBuyStatus::Scheduled),
                packages: vec![package("pub_a", "mb_1", "pkg_1")],
                assignments: vec![],
            })
            .await
            .unwrap();

        store
            .update_media_package_fields(
                "pub_a",
                "mb_1",
                "pkg_1",
                Some(&BudgetInput::Amount(1000.0)),
                Some(5.5),
                Some("even"),
            )
            .await
            .unwrap();

        let row = &store.list_packages("pub_a", "mb_1").await[0];
        assert_eq!(row.budget, Some(1000.0));
        assert_eq!(row.bid_price, Some(5.5));
        assert_eq!(row.pacing.as_deref(), Some("even"));
        assert_eq!(row.package_config["budget"], 1000.0);
        assert_eq!(row.package_config["pricing_info"]["bid_price"], 5.5);
        assert_eq!(row.package_config["pacing"], "even");
    }

    #[tokio::test]
    async fn dual_write_stores_object_budgets_structurally() {
        let store = Store::new();
        store
            .insert_media_buy(NewMediaBuy {
                media_buy: buy("pub_a", "mb_1", MediaBuyStatus::Scheduled),
                packages: vec![package("pub_a", "mb_1", "pkg_1")],
                assignments: vec![],
            })
            .await
            .unwrap();

        let budget = BudgetInput::Object(Budget {
            total: 2500.0,
            currency: "EUR".into(),
            pacing: Some(asa_core::budget::Pacing::Even),
        });
        store
            .update_media_package_fields("pub_a", "mb_1", "pkg_1", Some(&budget), None, None)
            .await
            .unwrap();

        let row = &store.list_packages("pub_a", "mb_1").await[0];
        assert_eq!(row.budget, Some(2500.0));
        assert_eq!(row.package_config["budget"]["total"], 2500.0);
        assert_eq!(row.package_config["budget"]["currency"], "EUR");
    }
}
