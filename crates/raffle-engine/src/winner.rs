//! Weighted winner draw

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use raffle_core::Participant;

/// Pick one participant with probability proportional to `max(1, referral_count)`.
pub fn select_winner<'a, R: Rng + ?Sized>(
    participants: &'a [Participant],
    rng: &mut R,
) -> Option<&'a Participant> {
    if participants.is_empty() {
        return None;
    }
    let dist = WeightedIndex::new(participants.iter().map(Participant::weight)).ok()?;
    participants.get(dist.sample(rng))
}
