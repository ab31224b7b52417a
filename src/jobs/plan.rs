//! Date-driven trigger rules of the daily check. Pure functions only; the
//! effects live in `engine`.

use chrono::{Datelike, Months, NaiveDate};

use crate::config::SalaryPolicy;
use crate::model::notification::{NewNotification, NotificationType};

/// Days before an event at which admins get a reminder.
pub const REMINDER_LEAD_DAYS: i64 = 30;

/// The fields of a user the daily check looks at.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UserSnapshot {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub salary: f64,
    pub last_salary_increase_date: Option<NaiveDate>,
    pub hire_date: NaiveDate,
}

impl UserSnapshot {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    Notify(NewNotification),
    /// Salary review is due; the raise itself is re-checked under a row lock.
    RaiseSalary,
}

/// The birthday of someone born on `birth` as observed in `year`.
/// 29 February falls on 1 March in non-leap years.
pub fn birthday_in_year(birth: NaiveDate, year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, birth.month(), birth.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
        .unwrap_or(birth)
}

/// First birthday on or after `today`.
pub fn next_birthday(birth: NaiveDate, today: NaiveDate) -> NaiveDate {
    let this_year = birthday_in_year(birth, today.year());
    if this_year < today {
        birthday_in_year(birth, today.year() + 1)
    } else {
        this_year
    }
}

pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// 0 on the birthday itself, never negative.
pub fn days_until_birthday(birth: NaiveDate, today: NaiveDate) -> i64 {
    days_between(today, next_birthday(birth, today))
}

/// Date on which the next automatic raise becomes due.
/// A month-end base date clamps to the end of the target month.
pub fn next_salary_review(
    last_increase: Option<NaiveDate>,
    hire_date: NaiveDate,
    review_months: u32,
) -> NaiveDate {
    let base = last_increase.unwrap_or(hire_date);
    base.checked_add_months(Months::new(review_months))
        .unwrap_or(NaiveDate::MAX)
}

pub fn days_until_review(user: &UserSnapshot, today: NaiveDate, policy: &SalaryPolicy) -> i64 {
    let review = next_salary_review(
        user.last_salary_increase_date,
        user.hire_date,
        policy.review_months,
    );
    days_between(today, review)
}

/// Whether an automatic raise applies to `user` on `today`.
pub fn raise_due(user: &UserSnapshot, today: NaiveDate, policy: &SalaryPolicy) -> bool {
    days_until_review(user, today, policy) <= 0 && user.salary < policy.ceiling
}

/// Salary after one automatic raise, or `None` when already at the ceiling.
pub fn raised_salary(current: f64, policy: &SalaryPolicy) -> Option<f64> {
    (current < policy.ceiling).then(|| (current + policy.step).min(policy.ceiling))
}

pub fn birthday_actions(user: &UserSnapshot, today: NaiveDate) -> Vec<PlannedAction> {
    let Some(birth) = user.birth_date else {
        return Vec::new();
    };

    let next = next_birthday(birth, today);
    let days = days_until_birthday(birth, today);
    let name = user.full_name();

    let notification = match days {
        REMINDER_LEAD_DAYS => NewNotification {
            kind: NotificationType::BirthdayReminder,
            message: format!("{name} has a birthday in one month"),
            event_date: next,
            related_user_id: user.id,
        },
        0 => NewNotification {
            kind: NotificationType::Birthday,
            message: format!("Today is {name}'s birthday"),
            event_date: next,
            related_user_id: user.id,
        },
        _ => return Vec::new(),
    };

    vec![PlannedAction::Notify(notification)]
}

pub fn salary_actions(
    user: &UserSnapshot,
    today: NaiveDate,
    policy: &SalaryPolicy,
) -> Vec<PlannedAction> {
    let review = next_salary_review(
        user.last_salary_increase_date,
        user.hire_date,
        policy.review_months,
    );
    let days = days_between(today, review);
    let mut actions = Vec::new();

    if days == REMINDER_LEAD_DAYS {
        actions.push(PlannedAction::Notify(NewNotification {
            kind: NotificationType::SalaryIncreaseReminder,
            message: format!(
                "A salary increase for employee {} is scheduled in one month.",
                user.full_name()
            ),
            event_date: review,
            related_user_id: user.id,
        }));
    }

    if days <= 0 && user.salary < policy.ceiling {
        actions.push(PlannedAction::RaiseSalary);
    }

    actions
}

/// Everything the daily check should do for one user, birthday first.
pub fn plan_for_user(
    user: &UserSnapshot,
    today: NaiveDate,
    policy: &SalaryPolicy,
) -> Vec<PlannedAction> {
    let mut actions = birthday_actions(user, today);
    actions.extend(salary_actions(user, today, policy));
    actions
}

/// Notifications emitted after a raise to `new_salary` was committed.
pub fn raise_notifications(
    user: &UserSnapshot,
    new_salary: f64,
    today: NaiveDate,
    policy: &SalaryPolicy,
) -> Vec<NewNotification> {
    let name = user.full_name();
    let mut out = vec![NewNotification {
        kind: NotificationType::SalaryIncreased,
        message: format!(
            "Salary of employee {name} was automatically increased to {new_salary} dollars."
        ),
        event_date: today,
        related_user_id: user.id,
    }];

    if new_salary >= policy.threshold {
        out.push(NewNotification {
            kind: NotificationType::SalaryThresholdReached,
            message: format!("Employee {name} has reached the salary threshold."),
            event_date: today,
            related_user_id: user.id,
        });
    }

    out
}

/// Cut-off of the read-notification sweep: six months before `today`.
pub fn sweep_cutoff(today: NaiveDate) -> NaiveDate {
    today
        .checked_sub_months(Months::new(6))
        .unwrap_or(NaiveDate::MIN)
}
