use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// MemberId names one process participating in consensus.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(member_id: impl Into<String>) -> Self {
        MemberId(member_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cohort is the fixed set of members participating in a single consensus
/// group, including this process. It never changes for the life of the
/// instance.
#[derive(Clone, Debug)]
pub struct Cohort {
    me: MemberId,
    members: BTreeSet<MemberId>,
}

impl Cohort {
    pub fn new(me: MemberId, members: Vec<MemberId>) -> Result<Self, InvalidCohort> {
        let mut unique = BTreeSet::new();
        for member in members {
            if !unique.insert(member.clone()) {
                return Err(InvalidCohort::DuplicateMember(member));
            }
        }
        if !unique.contains(&me) {
            return Err(InvalidCohort::MeNotInCohort(me));
        }

        Ok(Cohort { me, members: unique })
    }

    pub fn me(&self) -> &MemberId {
        &self.me
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, member: &MemberId) -> bool {
        self.members.contains(member)
    }

    pub fn peers(&self) -> impl Iterator<Item = &MemberId> + '_ {
        let me = &self.me;
        self.members.iter().filter(move |m| *m != me)
    }

    /// Smallest strict majority of the cohort.
    pub fn majority(&self) -> usize {
        self.members.len() / 2 + 1
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidCohort {
    #[error("duplicate member '{0}' in cohort")]
    DuplicateMember(MemberId),

    #[error("member '{0}' is not part of its own cohort")]
    MeNotInCohort(MemberId),
}
