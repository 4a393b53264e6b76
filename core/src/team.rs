//! Rank and team identity (§3): `rank_n`/`rank_me`, the world team, and
//! the local team (§12 supplement: `Team::local()`).

/// A process index within some team's index space.
pub type Rank = usize;

/// A named, ordered subgroup of ranks with its own index space.
#[derive(Debug, Clone)]
pub struct Team {
    /// This team's member ranks, in team-index order, expressed as world
    /// ranks.
    members: Vec<Rank>,
}

impl Team {
    /// The team containing every rank in the job, `0..rank_n`.
    pub fn world(rank_n: usize) -> Team {
        Team { members: (0..rank_n).collect() }
    }

    /// The subset of ranks that share this host's memory segment with
    /// `rank_me` (§12: `original_source`'s `upcxx::local_team()`).
    ///
    /// The reference in-process transports ([`crate::comm::Thread`],
    /// [`crate::comm::Process`]) model every rank as sharing one host, so
    /// this is the world team; a real transport would discover host
    /// membership at init and narrow it.
    pub fn local(rank_n: usize) -> Team {
        Team::world(rank_n)
    }

    /// Builds a team from an explicit, caller-supplied member list.
    pub fn from_members(members: Vec<Rank>) -> Team {
        Team { members }
    }

    /// Number of ranks in this team.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if this team has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The world rank of this team's `index`-th member.
    pub fn world_rank(&self, index: usize) -> Rank {
        self.members[index]
    }

    /// This team's members, as world ranks, in team-index order.
    pub fn members(&self) -> &[Rank] {
        &self.members
    }

    /// This team's index for `world_rank`, if it's a member.
    pub fn team_index(&self, world_rank: Rank) -> Option<usize> {
        self.members.iter().position(|&r| r == world_rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_team_covers_every_rank_in_order() {
        let team = Team::world(4);
        assert_eq!(team.len(), 4);
        assert_eq!(team.members(), &[0, 1, 2, 3]);
    }

    #[test]
    fn local_team_matches_world_for_the_reference_transports() {
        assert_eq!(Team::local(3).members(), Team::world(3).members());
    }

    #[test]
    fn team_index_round_trips_through_world_rank() {
        let team = Team::from_members(vec![5, 1, 9]);
        assert_eq!(team.team_index(9), Some(2));
        assert_eq!(team.world_rank(2), 9);
        assert_eq!(team.team_index(7), None);
    }
}
