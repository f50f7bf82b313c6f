use crate::model::{Notification, Role};

/// Notifications addressed to `role` or to everyone, in their original order.
pub fn relevant_to(role: Role, notifications: &[Notification]) -> Vec<Notification> {
    notifications
        .iter()
        .filter(|n| n.recipient_role.includes(role))
        .cloned()
        .collect()
}

/// [`relevant_to`], minus notices addressed to some other user.
pub fn visible_to(role: Role, user_id: u64, notifications: &[Notification]) -> Vec<Notification> {
    relevant_to(role, notifications)
        .into_iter()
        .filter(|n| n.recipient_user_id.map_or(true, |u| u == user_id))
        .collect()
}

pub fn mark_read(notifications: &[Notification], id: u64) -> Vec<Notification> {
    notifications
        .iter()
        .map(|n| {
            let mut n = n.clone();
            if n.id == id {
                n.read = true;
            }
            n
        })
        .collect()
}

pub fn mark_all_read(notifications: &[Notification]) -> Vec<Notification> {
    notifications
        .iter()
        .map(|n| Notification {
            read: true,
            ..n.clone()
        })
        .collect()
}

pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.read).count()
}
