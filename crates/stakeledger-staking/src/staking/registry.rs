//! Records stake positions and their lifecycle

use super::types::{PositionState, StakePosition};
use crate::{Result, StakingError};
use stakeledger_common::{Account, Amount, PositionId, Tier, Timestamp};
use std::collections::{BTreeMap, HashMap};

/// All positions ever opened, keyed by id, plus each owner's ids in the
/// order they were opened
#[derive(Debug)]
pub struct PositionRegistry {
    positions: BTreeMap<PositionId, StakePosition>,
    by_owner: HashMap<Account, Vec<PositionId>>,
    next_id: PositionId,
    last_start: Timestamp,
}

impl Default for PositionRegistry {
    fn default() -> Self {
        Self {
            positions: BTreeMap::new(),
            by_owner: HashMap::new(),
            next_id: 1,
            last_start: Timestamp::MIN,
        }
    }
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new position. Start times never run backwards, so a `now`
    /// earlier than the previous opening is raised to it.
    pub fn open(
        &mut self,
        owner: Account,
        amount: Amount,
        tier: Tier,
        now: Timestamp,
    ) -> Result<PositionId> {
        if amount == 0 {
            return Err(StakingError::InvalidAmount(
                "position amount must be greater than zero".into(),
            ));
        }

        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(StakingError::Overflow)?;
        self.last_start = self.last_start.max(now);

        self.by_owner.entry(owner.clone()).or_default().push(id);
        self.positions.insert(
            id,
            StakePosition {
                id,
                owner,
                amount,
                tier,
                start_time: self.last_start,
                state: PositionState::Open,
            },
        );

        Ok(id)
    }

    /// Adds `amount` to an open position, returning the new amount
    pub fn increase(&mut self, id: PositionId, amount: Amount) -> Result<Amount> {
        if amount == 0 {
            return Err(StakingError::InvalidAmount(
                "increase must be greater than zero".into(),
            ));
        }

        let position = self.open_mut(id)?;
        position.amount = position
            .amount
            .checked_add(amount)
            .ok_or(StakingError::Overflow)?;
        Ok(position.amount)
    }

    /// Withdraws an open position outright, returning the released amount
    pub fn close(&mut self, id: PositionId) -> Result<Amount> {
        let position = self.open_mut(id)?;
        let released = position.amount;
        position.amount = 0;
        position.state = PositionState::Withdrawn;
        Ok(released)
    }

    /// Takes `amount` out of an open position ahead of an outbound transfer.
    /// The position stays `Releasing` until [`settle_release`] or
    /// [`revert_release`] is called, and accepts no other change meanwhile.
    ///
    /// [`settle_release`]: Self::settle_release
    /// [`revert_release`]: Self::revert_release
    pub fn begin_release(&mut self, id: PositionId, amount: Amount) -> Result<Amount> {
        if amount == 0 {
            return Err(StakingError::InvalidAmount(
                "withdrawal must be greater than zero".into(),
            ));
        }

        let position = self.open_mut(id)?;
        let remaining = position
            .amount
            .checked_sub(amount)
            .ok_or(StakingError::InsufficientStake {
                position: id,
                requested: amount,
                available: position.amount,
            })?;

        position.amount = remaining;
        position.state = PositionState::Releasing;
        Ok(remaining)
    }

    /// Finishes a release: an emptied position becomes `Withdrawn`, anything
    /// left reopens
    pub fn settle_release(&mut self, id: PositionId) -> Result<PositionState> {
        let position = self.releasing_mut(id)?;
        position.state = if position.amount == 0 {
            PositionState::Withdrawn
        } else {
            PositionState::Open
        };
        Ok(position.state)
    }

    /// Undoes a release, putting `amount` back into the position
    pub fn revert_release(&mut self, id: PositionId, amount: Amount) -> Result<Amount> {
        let position = self.releasing_mut(id)?;
        position.amount = position
            .amount
            .checked_add(amount)
            .ok_or(StakingError::Overflow)?;
        position.state = PositionState::Open;
        Ok(position.amount)
    }

    pub fn get(&self, id: PositionId) -> Option<&StakePosition> {
        self.positions.get(&id)
    }

    /// Ids of every position `owner` ever opened, oldest first
    pub fn positions_of(&self, owner: &Account) -> Vec<PositionId> {
        self.by_owner.get(owner).cloned().unwrap_or_default()
    }

    pub fn open_positions_of(&self, owner: &Account) -> Vec<&StakePosition> {
        self.by_owner
            .get(owner)
            .into_iter()
            .flatten()
            .filter_map(|id| self.positions.get(id))
            .filter(|position| position.is_open())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StakePosition> {
        self.positions.values()
    }

    fn open_mut(&mut self, id: PositionId) -> Result<&mut StakePosition> {
        let position = self
            .positions
            .get_mut(&id)
            .ok_or(StakingError::PositionNotFound(id))?;
        if !position.is_open() {
            return Err(StakingError::PositionNotOpen(id));
        }
        Ok(position)
    }

    fn releasing_mut(&mut self, id: PositionId) -> Result<&mut StakePosition> {
        let position = self
            .positions
            .get_mut(&id)
            .ok_or(StakingError::PositionNotFound(id))?;
        if position.state != PositionState::Releasing {
            return Err(StakingError::PositionNotOpen(id));
        }
        Ok(position)
    }
}
