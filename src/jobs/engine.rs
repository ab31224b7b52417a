use chrono::NaiveDate;
use tracing::{error, info, instrument, warn};

use crate::config::SalaryPolicy;
use crate::jobs::plan::{self, PlannedAction, UserSnapshot};
use crate::jobs::store::{DeliveryOutcome, NotificationStore, RaiseOutcome};
use crate::model::notification::NewNotification;

/// Delivery attempts per admin before giving up on that admin.
pub const RETRIES: u32 = 3;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub users_checked: usize,
    pub notifications_created: usize,
    pub raises_applied: usize,
    pub purged: u64,
    pub failures: usize,
}

/// Delivers `notification` to every admin, skipping admins that already have
/// it. Returns how many rows were created.
pub async fn send_to_admins<S>(store: &S, admins: &[u64], notification: &NewNotification) -> usize
where
    S: NotificationStore + ?Sized,
{
    let mut created = 0;

    for &admin_id in admins {
        let mut attempt = 0;

        while attempt < RETRIES {
            match store.deliver_once(admin_id, notification).await {
                Ok(DeliveryOutcome::Created) => {
                    info!(admin_id, kind = %notification.kind, "Notification created");
                    created += 1;
                    break;
                }
                Ok(DeliveryOutcome::AlreadyExists) => {
                    info!(
                        admin_id,
                        related_user_id = notification.related_user_id,
                        kind = %notification.kind,
                        "Notification already exists"
                    );
                    break;
                }
                Err(e) => {
                    attempt += 1;
                    error!(
                        admin_id,
                        attempt,
                        retries = RETRIES,
                        error = %e,
                        "Failed to create notification"
                    );
                    if attempt == RETRIES {
                        error!(admin_id, "Giving up on notification after {RETRIES} attempts");
                    }
                }
            }
        }
    }

    created
}

/// Applies a due raise and tells the admins about it.
pub async fn raise_salary<S>(
    store: &S,
    admins: &[u64],
    user: &UserSnapshot,
    today: NaiveDate,
    policy: &SalaryPolicy,
) -> anyhow::Result<(Option<f64>, usize)>
where
    S: NotificationStore + ?Sized,
{
    match store.apply_raise(user.id, today, policy).await? {
        RaiseOutcome::Raised { new_salary } => {
            info!(user_id = user.id, new_salary, "Salary increased automatically");
            let mut created = 0;
            for notification in plan::raise_notifications(user, new_salary, today, policy) {
                created += send_to_admins(store, admins, &notification).await;
            }
            Ok((Some(new_salary), created))
        }
        RaiseOutcome::NotEligible => {
            info!(user_id = user.id, "Salary already at maximum or raise no longer due");
            Ok((None, 0))
        }
    }
}

pub async fn purge_read_notifications<S>(store: &S, today: NaiveDate) -> anyhow::Result<u64>
where
    S: NotificationStore + ?Sized,
{
    let cutoff = plan::sweep_cutoff(today);
    let deleted = store.purge_read_before(cutoff).await?;
    info!(deleted, %cutoff, "Old read notifications removed");
    Ok(deleted)
}

/// One pass of the daily check over every user, followed by the sweep.
#[instrument(skip(store, policy))]
pub async fn run_daily_check<S>(
    store: &S,
    policy: &SalaryPolicy,
    today: NaiveDate,
) -> anyhow::Result<RunSummary>
where
    S: NotificationStore + ?Sized,
{
    info!("Starting daily notification check");

    let admins = store.admin_ids().await?;
    info!(count = admins.len(), "Admins loaded");
    if admins.is_empty() {
        warn!("No admins to notify");
    }

    let users = store.users().await?;
    info!(count = users.len(), "Users loaded");

    let mut summary = RunSummary::default();

    for user in &users {
        summary.users_checked += 1;

        for action in plan::plan_for_user(user, today, policy) {
            match action {
                PlannedAction::Notify(notification) => {
                    summary.notifications_created +=
                        send_to_admins(store, &admins, &notification).await;
                }
                PlannedAction::RaiseSalary => {
                    match raise_salary(store, &admins, user, today, policy).await {
                        Ok((Some(_), created)) => {
                            summary.raises_applied += 1;
                            summary.notifications_created += created;
                        }
                        Ok((None, _)) => {}
                        Err(e) => {
                            summary.failures += 1;
                            error!(user_id = user.id, error = %e, "Failed to apply salary increase");
                        }
                    }
                }
            }
        }
    }

    match purge_read_notifications(store, today).await {
        Ok(deleted) => summary.purged = deleted,
        Err(e) => {
            summary.failures += 1;
            error!(error = %e, "Failed to remove old read notifications");
        }
    }

    info!(?summary, "Daily notification check finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::notification::NotificationType;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Stored {
        recipient: u64,
        related: u64,
        kind: NotificationType,
        event_date: NaiveDate,
        is_read: bool,
    }

    #[derive(Default)]
    struct State {
        admins: Vec<u64>,
        users: HashMap<u64, UserSnapshot>,
        notifications: Vec<Stored>,
        /// Delivery attempts that fail before succeeding, per admin.
        failing_deliveries: HashMap<u64, u32>,
        delivery_attempts: u32,
        fail_raises: bool,
        /// What `users()` reports instead of the stored rows, as if read
        /// before another run committed.
        stale_users: Option<Vec<UserSnapshot>>,
    }

    #[derive(Default)]
    struct MemoryStore {
        state: Mutex<State>,
    }

    impl MemoryStore {
        fn with(admins: Vec<u64>, users: Vec<UserSnapshot>) -> Self {
            let store = Self::default();
            {
                let mut state = store.state.lock().unwrap();
                state.admins = admins;
                state.users = users.into_iter().map(|u| (u.id, u)).collect();
            }
            store
        }

        fn kinds_for(&self, recipient: u64) -> Vec<NotificationType> {
            self.state
                .lock()
                .unwrap()
                .notifications
                .iter()
                .filter(|n| n.recipient == recipient)
                .map(|n| n.kind)
                .collect()
        }

        fn salary_of(&self, user_id: u64) -> f64 {
            self.state.lock().unwrap().users[&user_id].salary
        }
    }

    #[async_trait]
    impl NotificationStore for MemoryStore {
        async fn admin_ids(&self) -> anyhow::Result<Vec<u64>> {
            Ok(self.state.lock().unwrap().admins.clone())
        }

        async fn users(&self) -> anyhow::Result<Vec<UserSnapshot>> {
            let state = self.state.lock().unwrap();
            if let Some(stale) = &state.stale_users {
                return Ok(stale.clone());
            }
            let mut users: Vec<_> = state.users.values().cloned().collect();
            users.sort_by_key(|u| u.id);
            Ok(users)
        }

        async fn deliver_once(
            &self,
            admin_id: u64,
            n: &NewNotification,
        ) -> anyhow::Result<DeliveryOutcome> {
            let mut state = self.state.lock().unwrap();
            state.delivery_attempts += 1;

            if let Some(remaining) = state.failing_deliveries.get_mut(&admin_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    anyhow::bail!("deadlock found when trying to get lock");
                }
            }

            let exists = state.notifications.iter().any(|s| {
                s.recipient == admin_id
                    && s.related == n.related_user_id
                    && s.kind == n.kind
                    && s.event_date == n.event_date
            });
            if exists {
                return Ok(DeliveryOutcome::AlreadyExists);
            }

            state.notifications.push(Stored {
                recipient: admin_id,
                related: n.related_user_id,
                kind: n.kind,
                event_date: n.event_date,
                is_read: false,
            });
            Ok(DeliveryOutcome::Created)
        }

        async fn apply_raise(
            &self,
            user_id: u64,
            today: NaiveDate,
            policy: &SalaryPolicy,
        ) -> anyhow::Result<RaiseOutcome> {
            let mut state = self.state.lock().unwrap();
            if state.fail_raises {
                anyhow::bail!("lock wait timeout exceeded");
            }
            let Some(user) = state.users.get_mut(&user_id) else {
                return Ok(RaiseOutcome::NotEligible);
            };
            if !plan::raise_due(user, today, policy) {
                return Ok(RaiseOutcome::NotEligible);
            }
            let Some(new_salary) = plan::raised_salary(user.salary, policy) else {
                return Ok(RaiseOutcome::NotEligible);
            };
            user.salary = new_salary;
            user.last_salary_increase_date = Some(today);
            Ok(RaiseOutcome::Raised { new_salary })
        }

        async fn purge_read_before(&self, cutoff: NaiveDate) -> anyhow::Result<u64> {
            let mut state = self.state.lock().unwrap();
            let before = state.notifications.len();
            state
                .notifications
                .retain(|n| !(n.is_read && n.event_date <= cutoff));
            Ok((before - state.notifications.len()) as u64)
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn employee(id: u64, birth: NaiveDate, salary: f64, hire: NaiveDate) -> UserSnapshot {
        UserSnapshot {
            id,
            first_name: format!("Emp{id}"),
            last_name: "Tester".into(),
            birth_date: Some(birth),
            salary,
            last_salary_increase_date: None,
            hire_date: hire,
        }
    }

    fn birthday_reminder(related: u64) -> NewNotification {
        NewNotification {
            kind: NotificationType::BirthdayReminder,
            message: "reminder".into(),
            event_date: date(2026, 11, 18),
            related_user_id: related,
        }
    }

    #[actix_web::test]
    async fn every_admin_gets_one_copy() {
        let store = MemoryStore::with(vec![1, 2], vec![]);
        let n = birthday_reminder(10);

        assert_eq!(send_to_admins(&store, &[1, 2], &n).await, 2);
        assert_eq!(send_to_admins(&store, &[1, 2], &n).await, 0);

        assert_eq!(store.kinds_for(1), vec![NotificationType::BirthdayReminder]);
        assert_eq!(store.kinds_for(2), vec![NotificationType::BirthdayReminder]);
    }

    #[actix_web::test]
    async fn transient_failures_are_retried() {
        let store = MemoryStore::with(vec![1], vec![]);
        store.state.lock().unwrap().failing_deliveries.insert(1, 2);

        assert_eq!(send_to_admins(&store, &[1], &birthday_reminder(10)).await, 1);
        assert_eq!(store.state.lock().unwrap().delivery_attempts, 3);
    }

    #[actix_web::test]
    async fn gives_up_after_three_attempts_and_moves_on() {
        let store = MemoryStore::with(vec![1, 2], vec![]);
        store.state.lock().unwrap().failing_deliveries.insert(1, 10);

        assert_eq!(send_to_admins(&store, &[1, 2], &birthday_reminder(10)).await, 1);
        assert!(store.kinds_for(1).is_empty());
        assert_eq!(store.kinds_for(2), vec![NotificationType::BirthdayReminder]);
        // 3 failed attempts for admin 1, 1 success for admin 2
        assert_eq!(store.state.lock().unwrap().delivery_attempts, 4);
    }

    #[actix_web::test]
    async fn daily_run_sends_birthday_reminder_to_all_admins() {
        let today = date(2026, 10, 19);
        let store = MemoryStore::with(
            vec![1, 2],
            vec![employee(10, date(1992, 11, 18), 400.0, date(2026, 9, 1))],
        );

        let summary = run_daily_check(&store, &SalaryPolicy::default(), today)
            .await
            .unwrap();

        assert_eq!(summary.users_checked, 1);
        assert_eq!(summary.notifications_created, 2);
        assert_eq!(store.kinds_for(1), vec![NotificationType::BirthdayReminder]);
        assert_eq!(store.kinds_for(2), vec![NotificationType::BirthdayReminder]);
    }

    #[actix_web::test]
    async fn due_raise_is_applied_once_per_review_period() {
        let today = date(2026, 10, 19);
        let policy = SalaryPolicy::default();
        let store = MemoryStore::with(
            vec![1],
            vec![employee(10, date(1992, 1, 1), 400.0, date(2026, 4, 19))],
        );

        let first = run_daily_check(&store, &policy, today).await.unwrap();
        assert_eq!(first.raises_applied, 1);
        assert_eq!(store.salary_of(10), 600.0);
        assert_eq!(store.kinds_for(1), vec![NotificationType::SalaryIncreased]);

        // A second run the same day finds the review no longer due.
        let second = run_daily_check(&store, &policy, today).await.unwrap();
        assert_eq!(second.raises_applied, 0);
        assert_eq!(store.salary_of(10), 600.0);
    }

    #[actix_web::test]
    async fn stale_snapshot_does_not_raise_twice() {
        let today = date(2026, 10, 19);
        let policy = SalaryPolicy::default();
        let snapshot = employee(10, date(1992, 1, 1), 400.0, date(2026, 4, 19));
        let store = MemoryStore::with(vec![1], vec![snapshot.clone()]);

        run_daily_check(&store, &policy, today).await.unwrap();
        assert_eq!(store.salary_of(10), 600.0);

        // The locked row already carries today's raise; the snapshot does not.
        store.state.lock().unwrap().stale_users = Some(vec![snapshot]);
        let second = run_daily_check(&store, &policy, today).await.unwrap();

        assert_eq!(second.raises_applied, 0);
        assert_eq!(second.failures, 0);
        assert_eq!(store.salary_of(10), 600.0);
        assert_eq!(store.kinds_for(1), vec![NotificationType::SalaryIncreased]);
    }

    #[actix_web::test]
    async fn raise_reaching_threshold_emits_both_notifications() {
        let today = date(2026, 10, 19);
        let store = MemoryStore::with(
            vec![1],
            vec![employee(10, date(1992, 1, 1), 1300.0, date(2025, 1, 1))],
        );

        run_daily_check(&store, &SalaryPolicy::default(), today)
            .await
            .unwrap();

        assert_eq!(store.salary_of(10), 1500.0);
        assert_eq!(
            store.kinds_for(1),
            vec![
                NotificationType::SalaryIncreased,
                NotificationType::SalaryThresholdReached
            ]
        );
    }

    #[actix_web::test]
    async fn salary_at_ceiling_is_left_alone() {
        let today = date(2026, 10, 19);
        let store = MemoryStore::with(
            vec![1],
            vec![employee(10, date(1992, 1, 1), 1500.0, date(2020, 1, 1))],
        );

        let summary = run_daily_check(&store, &SalaryPolicy::default(), today)
            .await
            .unwrap();

        assert_eq!(summary.raises_applied, 0);
        assert_eq!(store.salary_of(10), 1500.0);
        assert!(store.kinds_for(1).is_empty());
    }

    #[actix_web::test]
    async fn failed_raise_does_not_stop_the_run() {
        let today = date(2026, 10, 19);
        let store = MemoryStore::with(
            vec![1],
            vec![
                employee(10, date(1992, 1, 1), 400.0, date(2020, 1, 1)),
                employee(11, date(1990, 10, 19), 1500.0, date(2026, 9, 1)),
            ],
        );
        store.state.lock().unwrap().fail_raises = true;

        let summary = run_daily_check(&store, &SalaryPolicy::default(), today)
            .await
            .unwrap();

        assert_eq!(summary.failures, 1);
        assert_eq!(summary.users_checked, 2);
        assert_eq!(store.kinds_for(1), vec![NotificationType::Birthday]);
    }

    #[actix_web::test]
    async fn sweep_removes_only_old_read_notifications() {
        let today = date(2026, 10, 19);
        let store = MemoryStore::with(vec![1], vec![]);
        {
            let mut state = store.state.lock().unwrap();
            for (event_date, is_read) in [
                (date(2026, 1, 1), true),
                (date(2026, 4, 19), true),
                (date(2026, 4, 20), true),
                (date(2026, 1, 1), false),
            ] {
                state.notifications.push(Stored {
                    recipient: 1,
                    related: 10,
                    kind: NotificationType::General,
                    event_date,
                    is_read,
                });
            }
        }

        let summary = run_daily_check(&store, &SalaryPolicy::default(), today)
            .await
            .unwrap();

        assert_eq!(summary.purged, 2);
        assert_eq!(store.state.lock().unwrap().notifications.len(), 2);
    }
}
