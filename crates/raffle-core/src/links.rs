//! Id, link, and display helpers shared by the service and the gateway

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

pub const AVATARS: [&str; 6] = [
    "https://images.pexels.com/photos/7130555/pexels-photo-7130555.jpeg?auto=compress&cs=tinysrgb&w=200",
    "https://images.pexels.com/photos/7130545/pexels-photo-7130545.jpeg?auto=compress&cs=tinysrgb&w=200",
    "https://images.pexels.com/photos/7130547/pexels-photo-7130547.jpeg?auto=compress&cs=tinysrgb&w=200",
    "https://images.pexels.com/photos/7130549/pexels-photo-7130549.jpeg?auto=compress&cs=tinysrgb&w=200",
    "https://images.pexels.com/photos/7130551/pexels-photo-7130551.jpeg?auto=compress&cs=tinysrgb&w=200",
    "https://images.pexels.com/photos/7130553/pexels-photo-7130553.jpeg?auto=compress&cs=tinysrgb&w=200",
];

const ID_LEN: usize = 9;

/// Short random identifier: the first nine hex digits of a v4 UUID.
pub fn generate_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(ID_LEN);
    id
}

pub fn referral_link(base_url: &str, giveaway_id: &str, user_id: &str) -> String {
    format!(
        "{}/g/{}?ref={}",
        base_url.trim_end_matches('/'),
        giveaway_id,
        user_id
    )
}

/// Accepts absolute http(s) URLs only.
pub fn is_valid_url(candidate: &str) -> bool {
    match url::Url::parse(candidate.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}

pub fn random_avatar<R: Rng + ?Sized>(rng: &mut R) -> String {
    AVATARS
        .choose(rng)
        .copied()
        .unwrap_or(AVATARS[0])
        .to_string()
}

/// Countdown text such as `2d 3h 15m`, `4h 0m`, `12m`, or `Ended`.
pub fn format_time_left(end: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = end - now;
    if diff.num_milliseconds() <= 0 {
        return "Ended".to_string();
    }

    let days = diff.num_days();
    let hours = diff.num_hours() % 24;
    let minutes = diff.num_minutes() % 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
