//! Periodic maintenance jobs.
//!
//! Three independent loops run on their own timers:
//!
//! - the expiry sweep flags entitlements whose window has passed,
//! - the warning pass notifies identities whose access is about to lapse,
//! - the session cleanup clears sessions idle past the cleanup threshold.
//!
//! Each job first collects its targets across all repository pages and
//! then processes them one identity at a time under that identity's lock.
//! A failure on one identity is logged and counted; the pass continues.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use coursegate_core::clock::Clock;
use coursegate_core::error::GateResult;
use coursegate_core::models::identity::{Identity, IdentityStatus};
use coursegate_core::models::notice::{ExpiryNotice, Urgency};
use coursegate_core::repository::{IdentityRepository, ScanKey};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::{AuthConfig, SchedulerConfig};
use crate::entitlements::EntitlementService;
use crate::locks::IdentityLocks;
use crate::notify::ExpiryNotifier;
use crate::session::SessionManager;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub identities_scanned: usize,
    pub identities_touched: usize,
    pub entitlements_expired: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarningReport {
    pub urgent: usize,
    pub upcoming: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub sessions_cleared: usize,
    pub locks_pruned: usize,
    pub failures: usize,
}

#[derive(Clone, Copy)]
enum Scan {
    Entitled,
    Online,
}

pub struct ExpiryScheduler<R, N> {
    repo: Arc<R>,
    locks: Arc<IdentityLocks>,
    clock: Arc<dyn Clock>,
    sessions: SessionManager<R>,
    entitlements: EntitlementService<R>,
    notifier: N,
    idle_cleanup_threshold: Duration,
    config: SchedulerConfig,
}

impl<R: IdentityRepository, N: ExpiryNotifier> ExpiryScheduler<R, N> {
    pub fn new(
        repo: Arc<R>,
        locks: Arc<IdentityLocks>,
        clock: Arc<dyn Clock>,
        auth: Arc<AuthConfig>,
        notifier: N,
        config: SchedulerConfig,
    ) -> Self {
        let sessions = SessionManager::new(
            Arc::clone(&repo),
            Arc::clone(&locks),
            Arc::clone(&clock),
            Arc::clone(&auth),
        );
        let entitlements = EntitlementService::new(
            Arc::clone(&repo),
            Arc::clone(&locks),
            Arc::clone(&clock),
            Arc::clone(&auth),
        );
        Self {
            repo,
            locks,
            clock,
            sessions,
            entitlements,
            notifier,
            idle_cleanup_threshold: auth.idle_cleanup_threshold(),
            config,
        }
    }

    /// Flag lapsed entitlements on every identity that holds any.
    pub async fn run_sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let identities = match self.scan(Scan::Entitled).await {
            Ok(identities) => identities,
            Err(e) => {
                warn!(error = %e, "expiry sweep could not list identities");
                report.failures += 1;
                return report;
            }
        };

        for identity in identities {
            report.identities_scanned += 1;
            match self.entitlements.sweep_expired(identity.id).await {
                Ok(sweep) if sweep.changed() => {
                    report.identities_touched += 1;
                    report.entitlements_expired += sweep.newly_expired;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(identity_id = %identity.id, error = %e, "expiry sweep failed");
                    report.failures += 1;
                }
            }
        }

        info!(
            scanned = report.identities_scanned,
            touched = report.identities_touched,
            expired = report.entitlements_expired,
            failures = report.failures,
            "expiry sweep finished"
        );
        report
    }

    /// Notify active identities about live entitlements ending soon.
    ///
    /// An entitlement ending within the urgent window gets an urgent
    /// notice; one ending later but within the upcoming window gets an
    /// upcoming notice. Each entitlement gets at most one notice per pass.
    pub async fn run_warnings(&self) -> WarningReport {
        let mut report = WarningReport::default();
        let identities = match self.scan(Scan::Entitled).await {
            Ok(identities) => identities,
            Err(e) => {
                warn!(error = %e, "expiry warnings could not list identities");
                report.failures += 1;
                return report;
            }
        };

        let now = self.clock.now();
        let urgent_until = now + Duration::days(self.config.urgent_window_days);
        let upcoming_until = now + Duration::days(self.config.upcoming_window_days);

        for identity in identities
            .into_iter()
            .filter(|i| i.status == IdentityStatus::Active)
        {
            for entitlement in identity.active_entitlements(now) {
                let urgency = if entitlement.expires_at <= urgent_until {
                    Urgency::Urgent
                } else if entitlement.expires_at <= upcoming_until {
                    Urgency::Upcoming
                } else {
                    continue;
                };

                let notice = ExpiryNotice {
                    identity_id: identity.id,
                    contact: identity.email.clone(),
                    course_ref: entitlement.course_ref.clone(),
                    days_remaining: entitlement.days_remaining(now),
                    urgency,
                };
                match self.notifier.notify(notice).await {
                    Ok(()) => match urgency {
                        Urgency::Urgent => report.urgent += 1,
                        Urgency::Upcoming => report.upcoming += 1,
                    },
                    Err(e) => {
                        warn!(
                            identity_id = %identity.id,
                            course_ref = %entitlement.course_ref,
                            error = %e,
                            "expiry notice not delivered"
                        );
                        report.failures += 1;
                    }
                }
            }
        }

        info!(
            urgent = report.urgent,
            upcoming = report.upcoming,
            failures = report.failures,
            "expiry warnings finished"
        );
        report
    }

    /// Clear sessions idle past the cleanup threshold, then prune unused
    /// identity locks.
    pub async fn run_session_cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        match self.scan(Scan::Online).await {
            Ok(identities) => {
                for identity in identities {
                    match self
                        .sessions
                        .clear_if_idle(identity.id, self.idle_cleanup_threshold)
                        .await
                    {
                        Ok(true) => report.sessions_cleared += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!(identity_id = %identity.id, error = %e, "session cleanup failed");
                            report.failures += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "session cleanup could not list identities");
                report.failures += 1;
            }
        }

        report.locks_pruned = self.locks.prune();
        info!(
            cleared = report.sessions_cleared,
            locks_pruned = report.locks_pruned,
            failures = report.failures,
            "session cleanup finished"
        );
        report
    }

    async fn scan(&self, scan: Scan) -> GateResult<Vec<Identity>> {
        let limit = self.config.page_size;
        let mut after = None;
        let mut identities = Vec::new();
        loop {
            let page = match scan {
                Scan::Entitled => self.repo.scan_with_entitlements(after, limit).await?,
                Scan::Online => self.repo.scan_online(after, limit).await?,
            };
            after = ScanKey::after_page(&page, limit);
            identities.extend(page);
            if after.is_none() {
                return Ok(identities);
            }
        }
    }
}

impl<R, N> ExpiryScheduler<R, N>
where
    R: IdentityRepository + 'static,
    N: ExpiryNotifier + 'static,
{
    /// Spawn the three job loops. Each fires once immediately and then on
    /// its interval; a pass that overruns its interval skips missed ticks.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (stop, stopped) = watch::channel(false);

        let sweep = {
            let this = Arc::clone(&self);
            every(self.config.sweep_interval, stopped.clone(), move || {
                let this = Arc::clone(&this);
                async move {
                    this.run_sweep().await;
                }
            })
        };
        let warnings = {
            let this = Arc::clone(&self);
            every(self.config.warning_interval, stopped.clone(), move || {
                let this = Arc::clone(&this);
                async move {
                    this.run_warnings().await;
                }
            })
        };
        let cleanup = {
            let this = Arc::clone(&self);
            every(self.config.session_cleanup_interval, stopped, move || {
                let this = Arc::clone(&this);
                async move {
                    this.run_session_cleanup().await;
                }
            })
        };

        info!("expiry scheduler started");
        SchedulerHandle {
            stop,
            tasks: vec![sweep, warnings, cleanup],
        }
    }
}

fn every<F, Fut>(period: StdDuration, mut stopped: watch::Receiver<bool>, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => job().await,
                _ = stopped.changed() => break,
            }
        }
    })
}

/// Running scheduler loops. Dropping the handle also stops them.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal every loop to stop and wait for in-flight passes to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "scheduler task ended abnormally");
            }
        }
        info!("expiry scheduler stopped");
    }
}
