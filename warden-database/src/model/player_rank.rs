use anyhow::Context as _;
use uuid::Uuid;

use warden_core::rank::{PlayerRank, RankPosition, VerificationState};

/// Raw `player_ranks` row. Converted into the core type on load; rank
/// coordinates outside the lattice are clamped, never rejected.
#[derive(sqlx::FromRow)]
pub struct PlayerRankRow {
    pub player_uuid: Uuid,
    pub main_rank: i32,
    pub sub_rank: i32,
    pub join_date: i64,
    pub play_time_minutes: i64,
    pub achievements_completed: i64,
    pub last_promotion: i64,
    pub verified_at: Option<i64>,
    pub verification_state: String,
}

impl PlayerRankRow {
    pub fn into_rank(self) -> anyhow::Result<PlayerRank> {
        let join_date = u64::try_from(self.join_date).context("join_date out of u64 range")?;
        let last_promotion =
            u64::try_from(self.last_promotion).context("last_promotion out of u64 range")?;
        let verified_at = self
            .verified_at
            .map(|at| u64::try_from(at).context("verified_at out of u64 range"))
            .transpose()?;

        Ok(PlayerRank {
            player_uuid: self.player_uuid,
            position: RankPosition::clamped(i64::from(self.main_rank), i64::from(self.sub_rank)),
            join_date,
            play_time_minutes: self.play_time_minutes,
            achievements_completed: self.achievements_completed,
            last_promotion,
            verified_at,
            state: VerificationState::parse(&self.verification_state),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::PlayerRankRow;
    use uuid::Uuid;
    use warden_core::rank::{RankPosition, VerificationState};

    fn row(main_rank: i32, sub_rank: i32) -> PlayerRankRow {
        PlayerRankRow {
            player_uuid: Uuid::new_v4(),
            main_rank,
            sub_rank,
            join_date: 1_700_000_000,
            play_time_minutes: 120,
            achievements_completed: 4,
            last_promotion: 1_700_000_500,
            verified_at: Some(1_700_000_100),
            verification_state: "verified".to_owned(),
        }
    }

    #[test]
    fn out_of_range_sub_rank_is_clamped_not_rejected() {
        let rank = row(3, 9).into_rank().unwrap();
        assert_eq!(rank.position, RankPosition { main: 3, sub: 7 });
        assert_eq!(rank.state, VerificationState::Verified);
    }

    #[test]
    fn zero_coordinates_clamp_to_the_first_position() {
        let rank = row(0, 0).into_rank().unwrap();
        assert_eq!(rank.position, RankPosition::FIRST);
    }

    #[test]
    fn unknown_state_label_reads_as_purgatory() {
        let mut raw = row(1, 1);
        raw.verification_state = "half-verified".to_owned();
        assert_eq!(raw.into_rank().unwrap().state, VerificationState::Purgatory);
    }
}
