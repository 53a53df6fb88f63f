//! Call context supplied by the VM for one contract invocation

use crate::types::{Address, BlockNumber, Timestamp, U256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// Contract being executed
    pub contract: Address,
    /// Account performing the call
    pub caller: Address,
    /// Value attached to the call, already credited to `contract`
    pub value: U256,
    /// Block time
    pub now: Timestamp,
    pub height: BlockNumber,
}

impl CallContext {
    pub fn new(contract: Address, caller: Address, value: U256, now: Timestamp, height: BlockNumber) -> Self {
        Self {
            contract,
            caller,
            value,
            now,
            height,
        }
    }

    /// Context for a call `self.contract` makes into `target` with `value`
    pub fn internal(&self, target: Address, value: U256) -> Self {
        Self {
            contract: target,
            caller: self.contract,
            value,
            now: self.now,
            height: self.height,
        }
    }
}
