//! Activation orchestrator.
//!
//! [`PromoService::activate`] evaluates, in order:
//!
//! 1. the code exists
//! 2. it has not expired
//! 3. the caller holds one of its permissions (if any are required)
//! 4. the caller has not redeemed it yet
//! 5. its quota is not used up
//!
//! and then records the activation, creates a temporary grant for
//! temporary codes and runs the grant commands. The record is the durable
//! truth: a failing grant command is logged and never rolls it back.
//!
//! The service also answers the read-side queries of the command surface
//! and performs catalog maintenance (reload, expired-code removal, orphan
//! pruning).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use promo_db::{ActivationLedger, RecordResult, TemporaryGrantLedger};
use promo_types::{
    code_key, ActivationOutcome, ActivationReceipt, Clock, PlayerId, PlayerSession,
    PromoCodeConfig, TemporaryGrantRecord,
};

use crate::catalog::DefinitionStore;
use crate::commands::{display_name, run_commands, CommandExecutor, PlayerDirectory};
use crate::reports::{
    format_remaining, CodeCount, CodeInfo, CodeStats, CodeStatus, CodeSummary, RecentActivation,
    ReloadSummary, ServiceStats, TemporaryItem, TemporaryItemGroup, GROUP_PREVIEW,
    RECENT_ACTIVATIONS, TOP_CODES,
};

/// The promo service: catalog, both ledgers and the host collaborators.
pub struct PromoService {
    definitions: Arc<DefinitionStore>,
    activations: Arc<ActivationLedger>,
    grants: Arc<TemporaryGrantLedger>,
    executor: Arc<dyn CommandExecutor>,
    players: Arc<dyn PlayerDirectory>,
    clock: Arc<dyn Clock>,
}

impl PromoService {
    pub fn new(
        definitions: Arc<DefinitionStore>,
        activations: Arc<ActivationLedger>,
        grants: Arc<TemporaryGrantLedger>,
        executor: Arc<dyn CommandExecutor>,
        players: Arc<dyn PlayerDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            definitions,
            activations,
            grants,
            executor,
            players,
            clock,
        }
    }

    pub fn definitions(&self) -> &Arc<DefinitionStore> {
        &self.definitions
    }

    pub fn activations(&self) -> &Arc<ActivationLedger> {
        &self.activations
    }

    pub fn grants(&self) -> &Arc<TemporaryGrantLedger> {
        &self.grants
    }

    pub fn executor(&self) -> &Arc<dyn CommandExecutor> {
        &self.executor
    }

    pub fn players(&self) -> &Arc<dyn PlayerDirectory> {
        &self.players
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ---- Activation ----

    /// Redeem `code` for `session`.
    pub fn activate(&self, session: &PlayerSession, code: &str) -> ActivationOutcome {
        let code = code.trim();
        if code.is_empty() {
            return ActivationOutcome::Failed {
                reason: "code name is empty".to_string(),
            };
        }
        let player_id = session.player_id;

        let Some(definition) = self.definitions.get(code) else {
            debug!(player_id, code, "activation rejected: unknown code");
            return ActivationOutcome::NotFound {
                code: code.to_string(),
            };
        };
        let name = definition.name.clone();

        let now = self.clock.now();
        if definition.is_expired_at(now) {
            debug!(player_id, code = %name, "activation rejected: expired");
            return ActivationOutcome::Expired {
                code: name,
                expired_at: definition.expires_at,
            };
        }
        if !definition.permits(session) {
            debug!(player_id, code = %name, "activation rejected: missing permission");
            return ActivationOutcome::NoPermission { code: name };
        }
        // Already-activated and quota are decided under the ledger lock, in
        // that order, so concurrent callers cannot both pass either check.
        let max_activations = definition.max_activations;
        match self
            .activations
            .record_activation_within(player_id, &name, now, Some(max_activations))
        {
            RecordResult::Recorded => {}
            RecordResult::AlreadyActivated => {
                debug!(player_id, code = %name, "activation rejected: already activated");
                return ActivationOutcome::AlreadyActivated { code: name };
            }
            RecordResult::QuotaReached => {
                debug!(player_id, code = %name, max_activations, "activation rejected: quota reached");
                return ActivationOutcome::QuotaReached {
                    code: name,
                    max_activations,
                };
            }
            RecordResult::Invalid => {
                return ActivationOutcome::Failed {
                    reason: format!("code `{name}` could not be recorded"),
                };
            }
        }

        let grant = if definition.grants_temporary() {
            self.grants
                .create_grant(player_id, &name, definition.temporary_duration)
        } else {
            None
        };

        let batch = run_commands(
            self.executor.as_ref(),
            &definition.grant_commands,
            player_id,
            &session.display_name,
        );
        if !batch.succeeded() {
            warn!(player_id, code = %name, failed = batch.failed, total = batch.total, "grant commands incomplete, activation kept");
        }

        info!(player_id, code = %name, temporary = grant.is_some(), "promo code activated");
        ActivationOutcome::Success(ActivationReceipt {
            code: name,
            player_id,
            activated_at: now,
            grant,
        })
    }

    // ---- Queries ----

    /// Codes `session` could redeem right now.
    pub fn eligible_codes(&self, session: &PlayerSession) -> Vec<CodeSummary> {
        let now = self.clock.now();
        self.definitions
            .all()
            .into_iter()
            .filter(|d| !d.is_expired_at(now) && d.permits(session))
            .filter(|d| !self.activations.has_activated(session.player_id, &d.name))
            .filter_map(|d| {
                let activations = self.activations.activation_count(&d.name);
                (activations < d.max_activations as usize).then(|| CodeSummary {
                    temporary_hours: d.grants_temporary().then(|| d.temporary_hours()),
                    name: d.name,
                    activations,
                    max_activations: d.max_activations,
                    expires_at: d.expires_at,
                })
            })
            .collect()
    }

    pub fn code_info(&self, code: &str) -> Option<CodeInfo> {
        let definition = self.definitions.get(code)?;
        let activations = self.activations.activation_count(&definition.name);
        Some(CodeInfo {
            status: CodeStatus::of(&definition, activations, self.clock.now()),
            is_temporary: definition.grants_temporary(),
            temporary_hours: definition
                .grants_temporary()
                .then(|| definition.temporary_hours()),
            activations,
            max_activations: definition.max_activations,
            expires_at: definition.expires_at,
            required_permissions: definition.required_permissions,
            name: definition.name,
        })
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> ServiceStats {
        let now = self.clock.now();
        let definitions = self.definitions.all();
        let expired_codes = definitions.iter().filter(|d| d.is_expired_at(now)).count();

        let grants = self.grants.all_grants();
        let active_grants = grants.iter().filter(|g| g.is_active_at(now)).count();
        let expired_grants = grants.iter().filter(|g| g.expires_at <= now).count();

        let mut counts: HashMap<String, CodeCount> = HashMap::new();
        for record in self.activations.list_activations(None) {
            counts
                .entry(code_key(&record.code_name))
                .or_insert_with(|| CodeCount {
                    name: self
                        .definitions
                        .get(&record.code_name)
                        .map_or(record.code_name.clone(), |d| d.name),
                    activations: 0,
                })
                .activations += 1;
        }
        let mut top_codes: Vec<CodeCount> = counts.into_values().collect();
        top_codes.sort_by(|a, b| {
            b.activations
                .cmp(&a.activations)
                .then_with(|| a.name.cmp(&b.name))
        });
        top_codes.truncate(TOP_CODES);

        ServiceStats {
            total_activations: self.activations.len(),
            unique_players: self.activations.unique_players(None),
            total_codes: definitions.len(),
            active_codes: definitions.len() - expired_codes,
            expired_codes,
            temporary_codes: definitions.iter().filter(|d| d.grants_temporary()).count(),
            active_grants,
            expired_grants,
            top_codes,
        }
    }

    /// Statistics of one defined code.
    pub fn code_stats(&self, code: &str) -> Option<CodeStats> {
        let definition = self.definitions.get(code)?;
        let now = self.clock.now();

        let mut records = self.activations.list_activations(Some(&definition.name));
        records.sort_by(|a, b| b.activated_at.cmp(&a.activated_at));
        let recent = records
            .iter()
            .take(RECENT_ACTIVATIONS)
            .map(|r| RecentActivation {
                player_id: r.player_id,
                display_name: display_name(self.players.as_ref(), r.player_id),
                activated_at: r.activated_at,
            })
            .collect();

        let grants = self.grants.grants_for_code(&definition.name);
        Some(CodeStats {
            status: CodeStatus::of(&definition, records.len(), now),
            activations: records.len(),
            max_activations: definition.max_activations,
            unique_players: self.activations.unique_players(Some(&definition.name)),
            active_grants: grants.iter().filter(|g| g.is_active_at(now)).count(),
            expired_grants: grants.iter().filter(|g| g.expires_at <= now).count(),
            recent,
            name: definition.name,
        })
    }

    /// Active grants of `player`, soonest expiry first.
    pub fn temporary_items(&self, player: PlayerId) -> Vec<TemporaryItem> {
        let mut grants = self.grants.active_grants(player);
        grants.sort_by_key(|g| g.expires_at);
        grants.iter().map(|g| self.temporary_item(g)).collect()
    }

    /// Active grants of every player, grouped by code.
    pub fn all_temporary_items(&self) -> Vec<TemporaryItemGroup> {
        let mut groups: BTreeMap<String, Vec<TemporaryGrantRecord>> = BTreeMap::new();
        for grant in self.grants.all_active() {
            groups
                .entry(code_key(&grant.code_name))
                .or_default()
                .push(grant);
        }

        groups
            .into_values()
            .map(|mut grants| {
                grants.sort_by_key(|g| g.expires_at);
                let code = self
                    .definitions
                    .get(&grants[0].code_name)
                    .map_or_else(|| grants[0].code_name.clone(), |d| d.name);
                let count = grants.len();
                TemporaryItemGroup {
                    code,
                    count,
                    items: grants
                        .iter()
                        .take(GROUP_PREVIEW)
                        .map(|g| self.temporary_item(g))
                        .collect(),
                    more: count.saturating_sub(GROUP_PREVIEW),
                }
            })
            .collect()
    }

    fn temporary_item(&self, grant: &TemporaryGrantRecord) -> TemporaryItem {
        let remaining_secs = grant.remaining_at(self.clock.now()).num_seconds();
        TemporaryItem {
            grant_id: grant.id.clone(),
            player_id: grant.player_id,
            display_name: display_name(self.players.as_ref(), grant.player_id),
            code: grant.code_name.clone(),
            expires_at: grant.expires_at,
            remaining_secs,
            remaining: format_remaining(remaining_secs),
        }
    }

    // ---- Maintenance ----

    /// Replace the catalog with `configs`, then reload both ledgers.
    ///
    /// A ledger whose pending changes cannot be flushed is not re-read and
    /// keeps serving its in-memory records.
    pub fn reload(&self, configs: &[PromoCodeConfig]) -> ReloadSummary {
        let codes = self.definitions.load(configs);
        if let Err(e) = self.activations.reload() {
            error!(error = %e, "activations not reloaded, keeping unsaved records in memory");
        }
        if let Err(e) = self.grants.reload() {
            error!(error = %e, "temporary grants not reloaded, keeping unsaved records in memory");
        }
        let summary = ReloadSummary {
            codes,
            activations: self.activations.len(),
            grants: self.grants.len(),
        };
        info!(
            codes = summary.codes,
            activations = summary.activations,
            grants = summary.grants,
            "promo service reloaded"
        );
        summary
    }

    /// Remove every expired code from the catalog and purge its records
    /// from both ledgers. Returns the removed code names.
    pub fn remove_expired_codes(&self) -> Vec<String> {
        let expired = self.definitions.expired(self.clock.now());
        let mut removed = Vec::with_capacity(expired.len());
        for definition in expired {
            self.definitions.remove(&definition.name);
            let activations = self.activations.purge_code(&definition.name);
            let grants = self.grants.purge_code(&definition.name);
            info!(code = %definition.name, expired_at = %definition.expires_at, activations, grants, "expired promo code removed");
            removed.push(definition.name);
        }
        if !removed.is_empty() {
            self.flush();
        }
        removed
    }

    /// Purge records whose code is no longer defined. Returns the number of
    /// records removed from both ledgers.
    pub fn prune_orphans(&self) -> usize {
        let defined: HashSet<String> = self
            .definitions
            .all()
            .iter()
            .map(|d| d.key())
            .collect();

        let mut removed = 0;
        for code in self.activations.code_keys() {
            if !defined.contains(&code) {
                removed += self.activations.purge_code(&code);
            }
        }
        let grant_codes: HashSet<String> = self
            .grants
            .all_grants()
            .iter()
            .map(|g| code_key(&g.code_name))
            .collect();
        for code in grant_codes {
            if !defined.contains(&code) {
                removed += self.grants.purge_code(&code);
            }
        }
        if removed > 0 {
            info!(removed, "orphaned records pruned");
        }
        removed
    }

    pub fn purge_old_revoked(&self, retention_days: u32) -> usize {
        self.grants.purge_old_revoked(retention_days)
    }

    /// Persist both ledgers if dirty. Returns whether both are clean.
    pub fn flush(&self) -> bool {
        let mut clean = true;
        if let Err(e) = self.activations.persist_if_dirty() {
            error!(error = %e, "failed to flush activations");
            clean = false;
        }
        if let Err(e) = self.grants.persist_if_dirty() {
            error!(error = %e, "failed to flush temporary grants");
            clean = false;
        }
        clean
    }
}
